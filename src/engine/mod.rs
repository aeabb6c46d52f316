// src/engine/mod.rs

//! Orchestration engine for calx.
//!
//! This module ties together:
//! - the DAG scheduler (pure state machine in `dag::scheduler`)
//! - the runner factory and the active runners it produces
//! - the output store
//! - cooperative cancellation
//!
//! The async control loop lives in [`runtime`]; [`single`] runs one step
//! outside the DAG.

use std::path::PathBuf;
use std::time::Duration;

use crate::config::model::Pipeline;
use crate::types::{BackendKind, FailurePolicy};

/// Canonical step name type used throughout the engine.
pub type StepName = String;

/// Outcome of a finished runner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Success,
    Failed(i32),
}

impl StepOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, StepOutcome::Success)
    }
}

/// Run-wide configuration threaded through the entry points.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Directory steps run in; relative paths in the pipeline resolve here.
    pub workdir: PathBuf,
    /// Backend for steps that do not pin one.
    pub default_backend: BackendKind,
    /// Parent of the per-run scratch directory.
    pub scratch_root: PathBuf,
    pub policy: FailurePolicy,
    /// First sleep after a polling sweep that saw no completion.
    pub poll_interval: Duration,
    /// Ceiling for the poll backoff.
    pub max_poll_interval: Duration,
    /// Bound on waiting for each runner to acknowledge termination.
    pub terminate_timeout: Duration,
}

impl RunOptions {
    /// Options taken from the pipeline's `[config]` section.
    pub fn from_pipeline(pipeline: &Pipeline, workdir: impl Into<PathBuf>) -> Self {
        let cfg = &pipeline.config;
        Self {
            workdir: workdir.into(),
            default_backend: cfg.backend,
            scratch_root: std::env::temp_dir(),
            policy: cfg.policy,
            poll_interval: Duration::from_millis(cfg.poll_interval_ms),
            max_poll_interval: Duration::from_millis(cfg.max_poll_interval_ms),
            terminate_timeout: Duration::from_millis(cfg.terminate_timeout_ms),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.default_backend = backend;
        self
    }

    pub fn with_scratch_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.scratch_root = root.into();
        self
    }

    pub fn with_poll_interval(mut self, initial: Duration, max: Duration) -> Self {
        self.poll_interval = initial;
        self.max_poll_interval = max.max(initial);
        self
    }

    pub fn with_terminate_timeout(mut self, timeout: Duration) -> Self {
        self.terminate_timeout = timeout;
        self
    }
}

pub mod backoff;
pub mod cancel;
pub mod report;
pub mod runtime;
pub mod single;

pub use backoff::PollBackoff;
pub use cancel::{CancelHandle, CancelSignal, cancel_pair};
pub use report::{RunReport, StepRun};
pub use runtime::PipelineRuntime;
pub use single::run_single_step;
