// src/errors.rs

//! Crate-wide error aliases and helpers.

use thiserror::Error;

use crate::engine::StepName;

#[derive(Error, Debug)]
pub enum CalxError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Step not found: {0}")]
    StepNotFound(String),

    #[error("Cycle detected in DAG: {0}")]
    DagCycle(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("failed to launch runner for step '{step}': {reason}")]
    RunnerLaunch { step: StepName, reason: String },

    #[error("step '{step}' failed with exit code {code}")]
    RunnerFailure { step: StepName, code: i32 },

    #[error("deadlock: no step is eligible and nothing is running; stuck: {}", format_stuck(.stuck))]
    Deadlock { stuck: Vec<StuckStep> },

    #[error("run cancelled")]
    Cancelled,

    #[error("output for step '{0}' was already written")]
    DuplicateWrite(StepName),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CalxError {
    /// Errors raised before scheduling starts because the pipeline itself is
    /// malformed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CalxError::ConfigError(_)
                | CalxError::DagCycle(_)
                | CalxError::StepNotFound(_)
                | CalxError::TomlError(_)
        )
    }
}

/// A queued step that can never become eligible, with the dependencies it is
/// still waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StuckStep {
    pub name: StepName,
    pub waiting_on: Vec<StepName>,
}

fn format_stuck(stuck: &[StuckStep]) -> String {
    stuck
        .iter()
        .map(|s| format!("{} (waiting on {})", s.name, s.waiting_on.join(", ")))
        .collect::<Vec<_>>()
        .join("; ")
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, CalxError>;
