// src/dag/step_info.rs

//! Step metadata and per-run state.

use std::fmt;

use crate::config::model::{DagEntry, StepConfig};
use crate::engine::StepName;

/// Lifecycle of a step within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Waiting in the queue for dependencies.
    Queued,
    /// Dispatched to a runner that has not reported completion yet.
    Running,
    /// Runner completed with a success status.
    Succeeded,
    /// Runner completed with a non-success status, or could not be launched.
    Failed,
    /// An upstream step failed; this step will never be released.
    Blocked,
    /// Dropped from the queue because the run was aborted.
    Abandoned,
    /// Was running when the run was aborted and its runner got terminated.
    Terminated,
}

impl StepState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, StepState::Queued | StepState::Running)
    }
}

/// Why a step ended up `Failed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The runner finished with this exit code.
    Exit(i32),
    /// The runner factory could not produce a runner.
    Launch(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::Exit(code) => write!(f, "exited with code {code}"),
            FailureReason::Launch(reason) => write!(f, "launch failed: {reason}"),
        }
    }
}

/// Static step information derived from the pipeline, plus per-run state.
#[derive(Debug, Clone)]
pub struct StepInfo {
    pub name: StepName,
    /// Name of the referenced `[step.*]` configuration.
    pub step: String,
    pub config: StepConfig,
    /// Direct dependencies (the node's `dependencies = [...]`).
    pub deps: Vec<StepName>,
    pub state: StepState,
    pub failure: Option<FailureReason>,
}

impl StepInfo {
    pub fn from_entry(entry: &DagEntry, config: StepConfig) -> Self {
        Self {
            name: entry.name.clone(),
            step: entry.step.clone(),
            config,
            deps: entry.dependencies.clone(),
            state: StepState::Queued,
            failure: None,
        }
    }
}

/// Description of a step that the scheduler wants a runner for now.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledStep {
    pub name: StepName,
    /// Name of the referenced `[step.*]` configuration.
    pub step: String,
    pub config: StepConfig,
}

impl ScheduledStep {
    pub fn from_step_info(info: &StepInfo) -> Self {
        Self {
            name: info.name.clone(),
            step: info.step.clone(),
            config: info.config.clone(),
        }
    }
}
