// src/dag/scheduler_step.rs

//! Result type for a single completion handled by the scheduler.

use crate::engine::StepName;

/// Structured result of a single scheduler "step".
///
/// This is what the runtime inspects after every completion, and what tests
/// use to manually step the DAG and make assertions about what changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStep {
    /// Steps that became eligible as a result of this step.
    pub newly_eligible: Vec<StepName>,
    /// Steps newly marked as failed in this step.
    pub newly_failed: Vec<StepName>,
    /// Steps newly marked as permanently blocked (best-effort only).
    pub newly_blocked: Vec<StepName>,
    /// Steps dropped from the queue because the run is aborting (fail-fast only).
    pub abandoned: Vec<StepName>,
    /// Whether the run must stop now.
    pub abort: bool,
}
