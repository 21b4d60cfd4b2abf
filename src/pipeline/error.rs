//! Typed failures of a pipeline run.
//!
//! Every failure names the [`Stage`] it happened in (where there is one)
//! and maps onto a coarse [`ErrorKind`] that front ends can switch on
//! without knowing the underlying cause.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::llm::LlmError;
use crate::package::{ArchiveError, ParseError, ValidationError};

use super::request::RequestError;
use super::stage::Stage;

/// Coarse failure category reported to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// LLM runtime or transcription service unreachable, timed out or refused.
    CollaboratorUnavailable,
    /// A stage answered with empty or unparseable output.
    GenerationMalformed,
    /// The final file set violates the plugin contract.
    ValidationFailed,
    /// The archive could not be written.
    PackagingIoFailure,
    /// The request was rejected before any stage ran.
    InvalidRequest,
    Cancelled,
    /// The run task itself died.
    Internal,
}

impl ErrorKind {
    pub fn label(&self) -> &'static str {
        match self {
            ErrorKind::CollaboratorUnavailable => "collaborator unavailable",
            ErrorKind::GenerationMalformed => "malformed generation",
            ErrorKind::ValidationFailed => "validation failed",
            ErrorKind::PackagingIoFailure => "packaging I/O failure",
            ErrorKind::InvalidRequest => "invalid request",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

// ---------------------------------------------------------------------------
// PipelineError
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{stage}: LLM runtime unavailable: {source}; verify that the LLM service is running")]
    Unavailable {
        stage: Stage,
        #[source]
        source: LlmError,
    },

    #[error("{stage}: malformed output: {reason}")]
    Malformed { stage: Stage, reason: String },

    #[error("generated plugin is invalid: {0}")]
    Validation(#[source] ValidationError),

    #[error("could not write the plugin archive: {0}")]
    Packaging(#[source] ArchiveError),

    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestError),

    #[error("cancelled during {stage}")]
    Cancelled { stage: Stage },

    #[error("internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Classify an LLM failure at `stage`.
    pub fn from_llm(stage: Stage, err: LlmError) -> Self {
        if err.is_unavailable() {
            PipelineError::Unavailable { stage, source: err }
        } else {
            PipelineError::Malformed {
                stage,
                reason: err.to_string(),
            }
        }
    }

    /// A stage produced text that does not follow the file-block grammar.
    pub fn from_parse(stage: Stage, err: ParseError) -> Self {
        PipelineError::Malformed {
            stage,
            reason: err.to_string(),
        }
    }

    pub fn from_archive(err: ArchiveError) -> Self {
        match err {
            ArchiveError::Validation(v) => PipelineError::Validation(v),
            other => PipelineError::Packaging(other),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Unavailable { .. } => ErrorKind::CollaboratorUnavailable,
            PipelineError::Malformed { .. } => ErrorKind::GenerationMalformed,
            PipelineError::Validation(_) => ErrorKind::ValidationFailed,
            PipelineError::Packaging(ArchiveError::InvalidName(_)) => ErrorKind::ValidationFailed,
            PipelineError::Packaging(_) => ErrorKind::PackagingIoFailure,
            PipelineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PipelineError::Cancelled { .. } => ErrorKind::Cancelled,
            PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Stage the failure belongs to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Unavailable { stage, .. }
            | PipelineError::Malformed { stage, .. }
            | PipelineError::Cancelled { stage } => Some(*stage),
            PipelineError::Validation(_) | PipelineError::Packaging(_) => Some(Stage::Packager),
            PipelineError::InvalidRequest(_) | PipelineError::Internal(_) => None,
        }
    }
}
