use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use crate::config::model::Pipeline;
use crate::dag::graph::DagGraph;
use crate::dag::queue::StepQueue;
use crate::dag::scheduler_step::SchedulerStep;
use crate::dag::step_info::{FailureReason, ScheduledStep, StepInfo, StepState};
use crate::engine::{StepName, StepOutcome};
use crate::errors::{CalxError, Result};
use crate::types::FailurePolicy;

/// Phase of the scheduler state machine.
///
/// `Init -> Admitting -> Polling -> (Admitting | Draining) -> Done`, with
/// `Aborted` reachable from any non-terminal phase on fail-fast failure,
/// deadlock or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Admitting,
    Polling,
    Draining,
    Done,
    Aborted,
}

/// Scheduler holds the immutable DAG plus the mutable state of one run.
///
/// It is responsible for:
/// - handing out eligible steps in batches (at most once per step)
/// - releasing dependents when a step completes
/// - applying the failure policy (fail-fast abort or best-effort blocking)
/// - detecting a queue that can never drain
///
/// It performs no IO; the async runtime in `engine::runtime` drives it.
#[derive(Debug)]
pub struct Scheduler {
    graph: DagGraph,
    queue: StepQueue,
    steps: BTreeMap<StepName, StepInfo>,
    policy: FailurePolicy,
    phase: Phase,
}

impl Scheduler {
    /// Construct a scheduler from a [`Pipeline`].
    ///
    /// Fails with `StepNotFound` when a DAG node references an unknown
    /// `[step.*]`; dependency problems are left to validation (or to
    /// deadlock detection for unchecked pipelines).
    pub fn from_pipeline(pipeline: &Pipeline, policy: FailurePolicy) -> Result<Self> {
        let graph = DagGraph::from_pipeline(pipeline);
        let queue = StepQueue::from_pipeline(pipeline);

        let mut steps = BTreeMap::new();
        for entry in pipeline.dag.iter() {
            let config = pipeline.step_config_of(entry).cloned().ok_or_else(|| {
                CalxError::StepNotFound(format!(
                    "dag node '{}' references unknown step '{}'",
                    entry.name, entry.step
                ))
            })?;
            steps.insert(entry.name.clone(), StepInfo::from_entry(entry, config));
        }

        debug!(steps = steps.len(), %policy, "scheduler initialised");

        Ok(Self {
            graph,
            queue,
            steps,
            policy,
            phase: Phase::Init,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn graph(&self) -> &DagGraph {
        &self.graph
    }

    pub fn queue(&self) -> &StepQueue {
        &self.queue
    }

    /// True once every step has left the queue.
    pub fn queue_is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn state_of(&self, step: &str) -> Option<StepState> {
        self.steps.get(step).map(|info| info.state)
    }

    pub fn failure_of(&self, step: &str) -> Option<&FailureReason> {
        self.steps.get(step).and_then(|info| info.failure.as_ref())
    }

    /// Every step with its current state, sorted by name.
    pub fn states(&self) -> impl Iterator<Item = (&str, StepState)> {
        self.steps.iter().map(|(name, info)| (name.as_str(), info.state))
    }

    /// Names of steps in the given state, sorted.
    pub fn steps_in(&self, state: StepState) -> Vec<StepName> {
        self.steps
            .values()
            .filter(|info| info.state == state)
            .map(|info| info.name.clone())
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.steps
            .values()
            .filter(|info| info.state == StepState::Running)
            .count()
    }

    /// ADMITTING: take every eligible step out of the queue, mark it running
    /// and return the batch. Leaves the scheduler in `Polling`.
    pub fn admit(&mut self) -> Vec<ScheduledStep> {
        if matches!(self.phase, Phase::Done | Phase::Aborted) {
            warn!(phase = ?self.phase, "admit called on a finished run; ignoring");
            return Vec::new();
        }

        self.transition(Phase::Admitting);

        let mut batch = Vec::new();
        for queued in self.queue.take_eligible() {
            if let Some(info) = self.steps.get_mut(&queued.name) {
                info!(step = %info.name, config = %info.step, "admitting step");
                info.state = StepState::Running;
                batch.push(ScheduledStep::from_step_info(info));
            } else {
                warn!(step = %queued.name, "queued step missing from step table");
            }
        }

        self.transition(Phase::Polling);
        batch
    }

    /// Handle completion of a dispatched step.
    ///
    /// The step's output must already be persisted by the caller; this only
    /// updates run state and releases (or blocks) dependents.
    pub fn step_completion(&mut self, step: &str, outcome: StepOutcome) -> SchedulerStep {
        if !self.take_running(step) {
            return SchedulerStep::default();
        }

        let mut result = match outcome {
            StepOutcome::Success => {
                self.set_state(step, StepState::Succeeded);
                debug!(step = %step, "step completed successfully");
                SchedulerStep {
                    newly_eligible: self.queue.release(step),
                    ..SchedulerStep::default()
                }
            }
            StepOutcome::Failed(code) => {
                warn!(step = %step, exit_code = code, policy = %self.policy, "step failed");
                self.apply_failure(step, FailureReason::Exit(code))
            }
        };

        self.after_completion(&mut result);
        result
    }

    /// Handle a runner factory failure for a step returned by [`admit`].
    ///
    /// [`admit`]: Scheduler::admit
    pub fn step_launch_failed(&mut self, step: &str, reason: impl Into<String>) -> SchedulerStep {
        if !self.take_running(step) {
            return SchedulerStep::default();
        }

        let reason = reason.into();
        warn!(step = %step, reason = %reason, policy = %self.policy, "runner launch failed");

        let mut result = self.apply_failure(step, FailureReason::Launch(reason));
        self.after_completion(&mut result);
        result
    }

    /// Deadlock check, run after an admission round.
    ///
    /// A non-empty queue with nothing eligible and nothing running can never
    /// make progress.
    pub fn check_deadlock(&self, active_runs: usize) -> Result<()> {
        if active_runs == 0 && !self.queue.is_empty() && self.queue.eligible().is_empty() {
            return Err(CalxError::Deadlock {
                stuck: self.queue.stuck(),
            });
        }
        Ok(())
    }

    /// Abort the run: every queued step becomes `Abandoned`.
    ///
    /// Running steps are left alone; the runtime terminates them and reports
    /// each through [`mark_terminated`](Scheduler::mark_terminated).
    pub fn abort(&mut self) -> Vec<StepName> {
        let abandoned = self.queue.drain();
        for name in abandoned.iter() {
            self.set_state(name, StepState::Abandoned);
        }
        if !abandoned.is_empty() {
            info!(?abandoned, "abandoning queued steps");
        }
        self.transition(Phase::Aborted);
        abandoned
    }

    /// Record that a running step's runner was terminated.
    pub fn mark_terminated(&mut self, step: &str) {
        if self.state_of(step) == Some(StepState::Running) {
            self.set_state(step, StepState::Terminated);
        }
    }

    /// Record that an admitted step was never launched because the run
    /// aborted while its batch was being dispatched.
    pub fn withdraw(&mut self, step: &str) {
        if self.state_of(step) == Some(StepState::Running) {
            self.set_state(step, StepState::Abandoned);
        }
    }

    /// DRAINING -> DONE, once the queue is empty and nothing is running.
    pub fn finish(&mut self) -> Result<()> {
        if !self.queue.is_empty() || self.running_count() > 0 {
            return Err(CalxError::Other(anyhow::anyhow!(
                "cannot finish run: {} queued, {} running",
                self.queue.len(),
                self.running_count()
            )));
        }
        if self.phase != Phase::Draining {
            self.transition(Phase::Draining);
        }
        self.transition(Phase::Done);
        Ok(())
    }

    fn apply_failure(&mut self, step: &str, reason: FailureReason) -> SchedulerStep {
        if let Some(info) = self.steps.get_mut(step) {
            info.state = StepState::Failed;
            info.failure = Some(reason);
        }

        let mut result = SchedulerStep {
            newly_failed: vec![step.to_string()],
            ..SchedulerStep::default()
        };

        match self.policy {
            FailurePolicy::FailFast => {
                result.abandoned = self.abort();
                result.abort = true;
            }
            FailurePolicy::BestEffort => {
                result.newly_blocked = self.block_dependents(step);
            }
        }

        result
    }

    /// Remove every transitive dependent of `failed` from the queue and mark
    /// it `Blocked`.
    fn block_dependents(&mut self, failed: &str) -> Vec<StepName> {
        let mut blocked = Vec::new();

        for name in self.graph.transitive_dependents(failed) {
            if self.queue.remove(&name).is_some() {
                debug!(step = %name, upstream = %failed, "blocking step due to upstream failure");
                self.set_state(&name, StepState::Blocked);
                blocked.push(name);
            }
        }

        blocked
    }

    fn after_completion(&mut self, result: &mut SchedulerStep) {
        // Aborted is terminal; late completions only settle step states.
        if result.abort || self.phase == Phase::Aborted {
            return;
        }
        if !self.queue.is_empty() {
            self.transition(Phase::Admitting);
        } else if self.running_count() == 0 {
            self.transition(Phase::Draining);
        }
    }

    /// Ensure `step` is currently running; logs and returns false otherwise.
    fn take_running(&mut self, step: &str) -> bool {
        match self.state_of(step) {
            Some(StepState::Running) => true,
            Some(state) => {
                warn!(step = %step, ?state, "completion for a step that is not running; ignoring");
                false
            }
            None => {
                warn!(step = %step, "completion for unknown step; ignoring");
                false
            }
        }
    }

    fn set_state(&mut self, step: &str, state: StepState) {
        if let Some(info) = self.steps.get_mut(step) {
            info.state = state;
        }
    }

    fn transition(&mut self, to: Phase) {
        if self.phase != to {
            debug!(from = ?self.phase, to = ?to, "scheduler phase change");
            self.phase = to;
        }
    }
}
