// src/engine/runtime.rs

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use crate::config::model::Pipeline;
use crate::config::validate::check_node_name;
use crate::dag::{Phase, ScheduledStep, Scheduler};
use crate::errors::{CalxError, Result};
use crate::exec::{Runner, RunnerFactory, RunnerRequest};
use crate::store::OutputStore;

use super::backoff::PollBackoff;
use super::cancel::CancelSignal;
use super::report::RunReport;
use super::{RunOptions, StepName, StepOutcome};

/// A dispatched step paired with its live runner.
struct ActiveRun {
    runner: Box<dyn Runner>,
    started: Instant,
}

/// Drives one pipeline run: admits eligible steps, polls their runners,
/// persists outputs and releases dependents until the DAG is drained.
///
/// The scheduler and the output store are owned here and only touched by
/// this loop. Concurrency lives in the runners; the loop itself never waits
/// on a single runner.
pub struct PipelineRuntime<F: RunnerFactory> {
    scheduler: Scheduler,
    factory: F,
    store: OutputStore,
    /// Sorted by name so completions in one sweep are handled in a stable order.
    active: BTreeMap<StepName, ActiveRun>,
    options: RunOptions,
    cancel: CancelSignal,
    admissions: Vec<Vec<StepName>>,
}

impl<F: RunnerFactory> fmt::Debug for PipelineRuntime<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineRuntime")
            .field("scheduler", &self.scheduler)
            .field("active", &self.active.keys().collect::<Vec<_>>())
            .field("scratch", &self.store.path())
            .finish_non_exhaustive()
    }
}

impl<F: RunnerFactory> PipelineRuntime<F> {
    /// INIT: build the scheduler from the pipeline and an empty output store
    /// in a fresh scratch directory.
    pub fn new(
        pipeline: &Pipeline,
        options: RunOptions,
        factory: F,
        cancel: CancelSignal,
    ) -> Result<Self> {
        // Node names become scratch file names; refuse them before any runner
        // exists rather than when the first output is stored.
        for entry in pipeline.dag.iter() {
            check_node_name(&entry.name)?;
        }

        let scheduler = Scheduler::from_pipeline(pipeline, options.policy)?;
        let store = OutputStore::create(&options.scratch_root)?;

        Ok(Self {
            scheduler,
            factory,
            store,
            active: BTreeMap::new(),
            options,
            cancel,
            admissions: Vec::new(),
        })
    }

    /// Scratch directory of this run.
    pub fn scratch_dir(&self) -> &std::path::Path {
        self.store.path()
    }

    /// Execute the whole DAG.
    ///
    /// The scratch directory is removed before returning on every path.
    pub async fn run(mut self) -> Result<RunReport> {
        info!(
            steps = self.scheduler.graph().len(),
            policy = %self.options.policy,
            scratch = ?self.store.path(),
            "pipeline run started"
        );

        let outcome = self.drive().await;

        if let Err(ref err) = outcome {
            error!(error = %err, "pipeline run aborted");
            self.shutdown().await;
        }

        let PipelineRuntime {
            scheduler,
            store,
            admissions,
            ..
        } = self;

        let teardown = store.teardown();

        match (outcome, teardown) {
            (Err(err), Err(teardown_err)) => {
                warn!(error = %teardown_err, "failed to remove scratch directory");
                Err(err)
            }
            (Err(err), Ok(_)) => Err(err),
            (Ok(()), Err(teardown_err)) => Err(teardown_err),
            (Ok(()), Ok(outputs)) => {
                let report = RunReport::from_scheduler(&scheduler, outputs, admissions);
                info!(
                    succeeded = report.succeeded.len(),
                    failed = report.failed.len(),
                    blocked = report.blocked.len(),
                    "pipeline run finished"
                );
                Ok(report)
            }
        }
    }

    /// Main control loop: ADMITTING and POLLING until the queue is drained,
    /// then DRAINING -> DONE.
    async fn drive(&mut self) -> Result<()> {
        loop {
            if self.cancel.is_cancelled() {
                return Err(CalxError::Cancelled);
            }

            self.admit_ready()?;

            if self.active.is_empty() {
                if self.scheduler.queue_is_empty() {
                    break;
                }
                // Nothing running: either launch failures freed nothing new
                // (best-effort) and we loop to admit again, or the queue is
                // stuck for good.
                self.scheduler.check_deadlock(0)?;
                continue;
            }

            self.poll_until_completion().await?;
        }

        self.scheduler.finish()?;
        info!("all steps dispatched and completed");
        Ok(())
    }

    /// ADMITTING: request a runner for every eligible step in one batch.
    fn admit_ready(&mut self) -> Result<()> {
        let batch = self.scheduler.admit();
        if batch.is_empty() {
            return Ok(());
        }

        let names: Vec<StepName> = batch.iter().map(|s| s.name.clone()).collect();
        debug!(?names, "admitted batch");
        self.admissions.push(names);

        let mut pending = batch.into_iter();
        while let Some(step) = pending.next() {
            if let Err(err) = self.launch(&step) {
                let reason = err.to_string();
                error!(step = %step.name, error = %reason, "failed to create runner");

                let result = self.scheduler.step_launch_failed(&step.name, reason.clone());
                if result.abort {
                    for rest in pending {
                        self.scheduler.withdraw(&rest.name);
                    }
                    return Err(CalxError::RunnerLaunch {
                        step: step.name,
                        reason,
                    });
                }
            }
        }

        Ok(())
    }

    fn launch(&mut self, step: &ScheduledStep) -> Result<()> {
        let backend = self.factory.backend_for(step);
        let request = RunnerRequest {
            step,
            backend,
            scratch_dir: self.store.path(),
        };

        let runner = self.factory.create(request)?;
        debug!(step = %step.name, %backend, "runner created");

        self.active.insert(
            step.name.clone(),
            ActiveRun {
                runner,
                started: Instant::now(),
            },
        );
        Ok(())
    }

    /// POLLING: sweep every active run until at least one has finished, then
    /// process all completions seen in that sweep.
    async fn poll_until_completion(&mut self) -> Result<()> {
        let mut backoff = PollBackoff::new(self.options.poll_interval, self.options.max_poll_interval);

        loop {
            let finished = self.sweep();

            if !finished.is_empty() {
                let mut first_err = None;
                for (name, status) in finished {
                    if let Err(err) = self.complete(name, status) {
                        first_err.get_or_insert(err);
                    }
                }
                return match first_err {
                    Some(err) => Err(err),
                    None => Ok(()),
                };
            }

            let delay = backoff.next_delay();
            trace!(?delay, active = self.active.len(), "no completions this sweep; sleeping");

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.cancel.cancelled() => {
                    return Err(CalxError::Cancelled);
                }
            }
        }
    }

    /// Non-blocking status check of every active run, in name order.
    fn sweep(&mut self) -> Vec<(StepName, Result<StepOutcome>)> {
        let mut finished = Vec::new();

        for (name, run) in self.active.iter_mut() {
            match run.runner.poll() {
                Ok(Some(outcome)) => finished.push((name.clone(), Ok(outcome))),
                Ok(None) => {}
                Err(err) => finished.push((name.clone(), Err(err))),
            }
        }

        finished
    }

    /// Completion handling: persist output, release the runner's artifact,
    /// update the dependency graph, drop the active run.
    fn complete(&mut self, name: StepName, status: Result<StepOutcome>) -> Result<()> {
        let Some(mut run) = self.active.remove(&name) else {
            return Ok(());
        };

        let mut outcome = status.unwrap_or_else(|err| {
            error!(step = %name, error = %err, "polling runner failed; treating as failure");
            StepOutcome::Failed(-1)
        });

        let output = match run.runner.take_output() {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!(step = %name, error = %err, "could not read step output");
                if outcome.is_success() {
                    outcome = StepOutcome::Failed(-1);
                }
                Vec::new()
            }
        };

        // The runner is released and the step settled even when the output
        // cannot be stored; the store error then ends the run.
        let stored = self.store.put(&name, output);
        if let Err(ref err) = stored {
            error!(step = %name, error = %err, "failed to store step output");
            outcome = StepOutcome::Failed(-1);
        }

        if let Err(err) = run.runner.cleanup() {
            warn!(step = %name, error = %err, "failed to release runner artifact");
        }

        info!(
            step = %name,
            backend = %run.runner.backend(),
            ?outcome,
            elapsed_ms = run.started.elapsed().as_millis() as u64,
            "step finished"
        );

        let result = self.scheduler.step_completion(&name, outcome);

        if !result.newly_blocked.is_empty() {
            warn!(step = %name, blocked = ?result.newly_blocked, "dependents permanently blocked");
        }

        stored?;

        if result.abort {
            let code = match outcome {
                StepOutcome::Failed(code) => code,
                StepOutcome::Success => -1,
            };
            return Err(CalxError::RunnerFailure { step: name, code });
        }

        Ok(())
    }

    /// Abort path: stop admitting, terminate every active run (bounded) and
    /// release its artifacts. Leaves zero active runs.
    async fn shutdown(&mut self) {
        if self.scheduler.phase() != Phase::Aborted {
            self.scheduler.abort();
        }

        let active = std::mem::take(&mut self.active);
        for (name, mut run) in active {
            match timeout(self.options.terminate_timeout, run.runner.terminate()).await {
                Ok(Ok(())) => debug!(step = %name, "runner terminated"),
                Ok(Err(err)) => warn!(step = %name, error = %err, "failed to terminate runner"),
                Err(_) => warn!(
                    step = %name,
                    timeout_ms = self.options.terminate_timeout.as_millis() as u64,
                    "runner did not acknowledge termination in time"
                ),
            }

            if let Err(err) = run.runner.cleanup() {
                warn!(step = %name, error = %err, "failed to release runner artifact");
            }

            self.scheduler.mark_terminated(&name);
        }
    }
}
