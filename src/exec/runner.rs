// src/exec/runner.rs

//! The `Runner` capability: one in-flight step execution.

use std::future::Future;
use std::pin::Pin;

use crate::engine::StepOutcome;
use crate::errors::Result;
use crate::types::BackendKind;

/// Boxed future returned by the async runner methods.
pub type RunnerFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Handle to a single dispatched step, regardless of backend.
///
/// The scheduler only ever calls [`poll`](Runner::poll) while a run is in
/// flight, so implementations must never block there. [`wait`](Runner::wait)
/// is reserved for ad hoc single-step invocation.
///
/// Every backend may hold a local artifact (captured stdout, a declared
/// output file, ...). [`cleanup`](Runner::cleanup) releases it and must be
/// safe to call more than once.
pub trait Runner: Send {
    /// Name of the step this runner executes.
    fn step(&self) -> &str;

    /// Backend the runner is bound to.
    fn backend(&self) -> BackendKind;

    /// Non-blocking status check: `None` while still running.
    fn poll(&mut self) -> Result<Option<StepOutcome>>;

    /// Captured output. Only valid once the runner has finished.
    fn take_output(&mut self) -> Result<Vec<u8>>;

    /// Wait for the runner to finish.
    fn wait(&mut self) -> RunnerFuture<'_, Result<StepOutcome>>;

    /// Ask the underlying execution to stop and wait for it to acknowledge.
    fn terminate(&mut self) -> RunnerFuture<'_, Result<()>>;

    /// Release any backend-local temporary artifact.
    fn cleanup(&mut self) -> Result<()>;
}
