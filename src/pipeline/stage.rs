//! Roles, stages and the outputs they hand down the chain.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The three LLM-backed roles, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Analyst,
    Developer,
    Reviewer,
}

impl Role {
    pub const CHAIN: [Role; 3] = [Role::Analyst, Role::Developer, Role::Reviewer];

    pub fn title(&self) -> &'static str {
        match self {
            Role::Analyst => "Requirements Analyst",
            Role::Developer => "QGIS Developer",
            Role::Reviewer => "Reviewer",
        }
    }

    /// `true` for roles whose output must follow the file-block grammar.
    pub fn emits_files(&self) -> bool {
        matches!(self, Role::Developer | Role::Reviewer)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// Any step that can fail: the three roles plus the local packaging step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stage {
    Analyst,
    Developer,
    Reviewer,
    Packager,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Analyst => "Analyst",
            Stage::Developer => "Developer",
            Stage::Reviewer => "Reviewer",
            Stage::Packager => "Packager",
        }
    }
}

impl From<Role> for Stage {
    fn from(role: Role) -> Self {
        match role {
            Role::Analyst => Stage::Analyst,
            Role::Developer => Stage::Developer,
            Role::Reviewer => Stage::Reviewer,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Text produced by one role; immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    pub role: Role,
    pub content: String,
    pub produced_at: DateTime<Utc>,
}

impl StageOutput {
    pub fn new(role: Role, content: String) -> Self {
        Self {
            role,
            content,
            produced_at: Utc::now(),
        }
    }
}
