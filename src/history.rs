//! Record of successfully generated plugins, persisted as `history.json`.
//!
//! The orchestrator never touches history; front ends call
//! [`record_generation`] once a run has produced its archive.  History is
//! bookkeeping only, so a broken history file never fails a generation.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::AppPaths;
use crate::pipeline::RunReport;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("history file {} is not valid JSON: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("could not serialise history: {0}")]
    Serialize(#[source] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub plugin_name: String,
    pub version: String,
    pub description: String,
    pub archive: PathBuf,
}

impl HistoryEntry {
    pub fn from_report(report: &RunReport) -> Self {
        Self {
            timestamp: report.finished_at,
            plugin_name: report.request.plugin_name().to_string(),
            version: report.request.options().version.clone(),
            description: report.request.description().to_string(),
            archive: report.archive.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

impl History {
    /// Load from the default `history.json`.
    pub fn load() -> Result<Self, HistoryError> {
        Self::load_from(&AppPaths::new().history_file)
    }

    /// Load from `path`; a missing file is an empty history.
    pub fn load_from(path: &Path) -> Result<Self, HistoryError> {
        if !path.exists() {
            return Ok(Self {
                path: path.to_path_buf(),
                entries: Vec::new(),
            });
        }
        let raw = std::fs::read_to_string(path).map_err(|source| HistoryError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let entries: Vec<HistoryEntry> =
            serde_json::from_str(&raw).map_err(|source| HistoryError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!("history: loaded {} entries", entries.len());
        Ok(Self {
            path: path.to_path_buf(),
            entries,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Oldest first.
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn record(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn save(&self) -> Result<(), HistoryError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| HistoryError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(&self.entries).map_err(HistoryError::Serialize)?;
        std::fs::write(&self.path, json).map_err(|source| HistoryError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(())
    }
}

/// Append `entry` to the history at `path`.
///
/// Failures are logged and reported as `false`.  An unreadable file is left
/// as it is rather than replaced.
pub fn record_generation(path: &Path, entry: HistoryEntry) -> bool {
    let mut history = match History::load_from(path) {
        Ok(history) => history,
        Err(e) => {
            log::warn!("history: not recording {}: {e}", entry.plugin_name);
            return false;
        }
    };
    history.record(entry);
    match history.save() {
        Ok(()) => true,
        Err(e) => {
            log::warn!("history: could not save: {e}");
            false
        }
    }
}
