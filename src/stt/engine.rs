//! Core transcriber trait and error type.
//!
//! [`Transcriber`] is the seam the voice front door talks to.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn Transcriber>`.
//!
//! [`MockTranscriber`] (available under `#[cfg(test)]`) returns a
//! pre-configured response and counts calls.

use async_trait::async_trait;
use thiserror::Error;

use crate::audio::AudioClip;
use crate::pipeline::ErrorKind;

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// HTTP transport or connection error.
    #[error("transcription service unreachable: {0}")]
    Request(String),

    #[error("transcription request timed out")]
    Timeout,

    #[error("transcription service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse transcription response: {0}")]
    Parse(String),

    /// The clip could not be encoded for the backend.
    #[error("unsupported audio: {0}")]
    UnsupportedAudio(String),

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("whisper context initialisation failed: {0}")]
    ContextInit(String),

    #[error("transcription error: {0}")]
    Transcription(String),

    /// The configured backend was not compiled in.
    #[error("transcription backend {0:?} is not available in this build")]
    BackendDisabled(&'static str),
}

impl SttError {
    /// `true` when the transcription service itself could not be reached or
    /// refused the request.
    pub fn is_service_failure(&self) -> bool {
        matches!(
            self,
            SttError::Request(_) | SttError::Timeout | SttError::Status { .. }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SttError::UnsupportedAudio(_) => ErrorKind::InvalidRequest,
            _ => ErrorKind::CollaboratorUnavailable,
        }
    }
}

impl From<reqwest::Error> for SttError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SttError::Timeout
        } else if e.is_decode() {
            SttError::Parse(e.to_string())
        } else {
            SttError::Request(e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Turns a 16 kHz mono clip into plain text.
///
/// An empty string is a valid answer: it means nothing intelligible was
/// said, and callers must not treat it as an error.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, clip: &AudioClip) -> Result<String, SttError>;

    /// Reachability check used by `check`.  Defaults to "reachable".
    async fn health(&self) -> Result<(), SttError> {
        Ok(())
    }

    /// Backend name, for logs.
    fn name(&self) -> &str;
}

// Compile-time assertion: Box<dyn Transcriber> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// Returns a fixed response without touching any model or service.
#[cfg(test)]
pub struct MockTranscriber {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _clip: &AudioClip) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.response.clone()
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
