// src/dag/mod.rs

//! DAG representation and scheduling.
//!
//! - [`graph`] holds the immutable adjacency of the pipeline DAG.
//! - [`queue`] is the per-run dependency queue (eligible / release).
//! - [`scheduler`] contains the per-run state machine that decides which
//!   steps are admitted, and applies the failure policy.
//! - [`step_info`] provides step metadata and scheduled step types.
//! - [`scheduler_step`] defines the result type for scheduler steps.

pub mod graph;
pub mod queue;
pub mod scheduler;
pub mod scheduler_step;
pub mod step_info;

pub use graph::DagGraph;
pub use queue::{QueuedStep, StepQueue};
pub use scheduler::{Phase, Scheduler};
pub use scheduler_step::SchedulerStep;
pub use step_info::{FailureReason, ScheduledStep, StepState};
