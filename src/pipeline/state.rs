//! Linear state machine of one pipeline run.
//!
//! ```text
//! Analyzing ──▶ Developing ──▶ Reviewing ──▶ Packaging ──▶ Done
//!     │             │              │             │
//!     └─────────────┴──────┬───────┴─────────────┘
//!                          ▼
//!                   Failed(stage)
//! ```
//!
//! There is no branching and no way back: every state has exactly one
//! successor on success and one failure state.

use serde::{Deserialize, Serialize};

use super::stage::Stage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PipelineState {
    Analyzing,
    Developing,
    Reviewing,
    Packaging,
    Done,
    Failed(Stage),
}

impl PipelineState {
    /// Initial state of every run.
    pub const START: PipelineState = PipelineState::Analyzing;

    /// Stage executed while in this state.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineState::Analyzing => Some(Stage::Analyst),
            PipelineState::Developing => Some(Stage::Developer),
            PipelineState::Reviewing => Some(Stage::Reviewer),
            PipelineState::Packaging => Some(Stage::Packager),
            PipelineState::Done | PipelineState::Failed(_) => None,
        }
    }

    /// Successor on success.  Terminal states are returned unchanged.
    pub fn advance(self) -> PipelineState {
        match self {
            PipelineState::Analyzing => PipelineState::Developing,
            PipelineState::Developing => PipelineState::Reviewing,
            PipelineState::Reviewing => PipelineState::Packaging,
            PipelineState::Packaging => PipelineState::Done,
            terminal => terminal,
        }
    }

    /// Failure state for the stage running in this state.
    pub fn fail(self) -> PipelineState {
        match self.stage() {
            Some(stage) => PipelineState::Failed(stage),
            None => self,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done | PipelineState::Failed(_))
    }

    /// Short status label for progress output.
    pub fn label(&self) -> String {
        match self {
            PipelineState::Analyzing => "Analyzing requirements".into(),
            PipelineState::Developing => "Writing plugin code".into(),
            PipelineState::Reviewing => "Reviewing code".into(),
            PipelineState::Packaging => "Packaging".into(),
            PipelineState::Done => "Done".into(),
            PipelineState::Failed(stage) => format!("Failed at {stage}"),
        }
    }
}

impl Default for PipelineState {
    fn default() -> Self {
        Self::START
    }
}
