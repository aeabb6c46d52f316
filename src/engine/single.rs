// src/engine/single.rs

//! Ad hoc execution of a single `[step.*]` outside the DAG.

use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::model::Pipeline;
use crate::dag::ScheduledStep;
use crate::errors::{CalxError, Result};
use crate::exec::{Runner, RunnerFactory, RunnerRequest};
use crate::store::OutputStore;

use super::cancel::CancelSignal;
use super::report::StepRun;
use super::{RunOptions, StepOutcome};

/// Run one step configuration to completion with [`Runner::wait`].
///
/// Dependencies are ignored. The step still gets its own scratch directory
/// (exposed as `CALX_TMPDIR`), which is removed before returning.
pub async fn run_single_step<F: RunnerFactory>(
    pipeline: &Pipeline,
    step: &str,
    options: &RunOptions,
    factory: &mut F,
    mut cancel: CancelSignal,
) -> Result<StepRun> {
    let config = pipeline
        .step
        .get(step)
        .cloned()
        .ok_or_else(|| CalxError::StepNotFound(step.to_string()))?;

    let scheduled = ScheduledStep {
        name: step.to_string(),
        step: step.to_string(),
        config,
    };

    let store = OutputStore::create(&options.scratch_root)?;
    let result = execute(&scheduled, &store, options, factory, &mut cancel).await;
    let teardown = store.teardown();

    match (result, teardown) {
        (Ok(run), Ok(_)) => Ok(run),
        (Ok(_), Err(err)) => Err(err),
        (Err(err), teardown) => {
            if let Err(teardown_err) = teardown {
                warn!(error = %teardown_err, "failed to remove scratch directory");
            }
            Err(err)
        }
    }
}

async fn execute<F: RunnerFactory>(
    step: &ScheduledStep,
    store: &OutputStore,
    options: &RunOptions,
    factory: &mut F,
    cancel: &mut CancelSignal,
) -> Result<StepRun> {
    let backend = factory.backend_for(step);
    let request = RunnerRequest {
        step,
        backend,
        scratch_dir: store.path(),
    };

    let mut runner = factory.create(request).map_err(|err| CalxError::RunnerLaunch {
        step: step.name.clone(),
        reason: err.to_string(),
    })?;

    info!(step = %step.name, %backend, "running single step");

    let waited = tokio::select! {
        res = runner.wait() => Some(res),
        _ = cancel.cancelled() => None,
    };

    let outcome = match waited {
        Some(res) => res,
        None => {
            terminate(runner.as_mut(), options).await;
            return Err(CalxError::Cancelled);
        }
    };

    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => {
            release(runner.as_mut());
            return Err(err);
        }
    };

    let output = match runner.take_output() {
        Ok(bytes) => bytes,
        Err(err) => {
            release(runner.as_mut());
            return Err(err);
        }
    };
    release(runner.as_mut());

    if let StepOutcome::Failed(code) = outcome {
        warn!(step = %step.name, exit_code = code, "single step failed");
    }

    Ok(StepRun {
        step: step.name.clone(),
        backend,
        outcome,
        output,
    })
}

async fn terminate(runner: &mut dyn Runner, options: &RunOptions) {
    match timeout(options.terminate_timeout, runner.terminate()).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => warn!(step = %runner.step(), error = %err, "failed to terminate runner"),
        Err(_) => warn!(step = %runner.step(), "runner did not acknowledge termination in time"),
    }
    release(runner);
}

fn release(runner: &mut dyn Runner) {
    if let Err(err) = runner.cleanup() {
        warn!(step = %runner.step(), error = %err, "failed to release runner artifact");
    }
}
