//! Cooperative cancellation for a pipeline run.
//!
//! A [`CancelToken`] is cloned into the run; the orchestrator races every
//! stage against [`CancelToken::cancelled`] and checks
//! [`CancelToken::is_cancelled`] between stages.  Cancelling is idempotent
//! and keeps the first reason.

use std::sync::{Arc, Mutex};

use tokio::sync::watch;

#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    reason: Arc<Mutex<Option<String>>>,
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .field("reason", &self.reason())
            .finish()
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            reason: Arc::new(Mutex::new(None)),
        }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn reason(&self) -> Option<String> {
        self.reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Request cancellation.  Only the first reason is stored.
    pub fn cancel(&self, reason: impl Into<String>) {
        let mut slot = self
            .reason
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_none() {
            *slot = Some(reason.into());
        }
        drop(slot);
        self.tx.send_replace(true);
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        let mut rx = self.tx.subscribe();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            // The sender lives as long as `self`, so this only errors if the
            // token is being torn down; treat that as "never cancelled".
            if rx.changed().await.is_err() {
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn first_reason_wins() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        token.cancel("user pressed Ctrl-C");
        token.cancel("second");
        assert!(token.is_cancelled());
        assert_eq!(token.reason().as_deref(), Some("user pressed Ctrl-C"));
    }

    #[test]
    fn clones_share_state() {
        let token = CancelToken::new();
        let other = token.clone();
        other.cancel("stop");
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_wakes_waiters() {
        let token = CancelToken::new();
        let waiter = {
            let token = token.clone();
            tokio::spawn(async move { token.cancelled().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel("stop");
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter woke")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_returns_immediately_when_already_cancelled() {
        let token = CancelToken::new();
        token.cancel("early");
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("no wait");
    }
}
