use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use calx::dag::ScheduledStep;
use calx::engine::StepOutcome;
use calx::errors::{CalxError, Result};
use calx::exec::{Runner, RunnerFactory, RunnerFuture, RunnerRequest};
use calx::types::BackendKind;

/// Scripted behaviour of one fake step.
#[derive(Debug, Clone)]
pub struct FakeStep {
    pub outcome: StepOutcome,
    /// Number of polls that report "still running" before finishing.
    pub polls: usize,
    pub output: Vec<u8>,
    /// Fail in `RunnerFactory::create` with this message.
    pub launch_error: Option<String>,
    /// Never finish on its own; only `terminate` stops it.
    pub hang: bool,
    /// On finishing, put a directory where the output file should go so the
    /// store cannot write it.
    pub blocks_store: bool,
}

impl FakeStep {
    pub fn succeed(output: &str) -> Self {
        Self {
            outcome: StepOutcome::Success,
            polls: 0,
            output: output.as_bytes().to_vec(),
            launch_error: None,
            hang: false,
            blocks_store: false,
        }
    }

    pub fn fail(code: i32) -> Self {
        Self {
            outcome: StepOutcome::Failed(code),
            ..Self::succeed("")
        }
    }

    pub fn launch_error(message: &str) -> Self {
        Self {
            launch_error: Some(message.to_string()),
            ..Self::succeed("")
        }
    }

    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Self::succeed("")
        }
    }

    pub fn blocking_store(mut self) -> Self {
        self.blocks_store = true;
        self
    }

    pub fn after_polls(mut self, polls: usize) -> Self {
        self.polls = polls;
        self
    }
}

/// Everything the fake runners did, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FakeEvent {
    /// A runner was requested. `scratch` lists the step outputs present in
    /// the scratch directory at that moment.
    Created {
        step: String,
        backend: BackendKind,
        scratch: Vec<String>,
    },
    Finished(String),
    OutputTaken(String),
    Cleaned(String),
    Terminated(String),
}

/// Shared, cloneable event log.
#[derive(Debug, Clone, Default)]
pub struct FakeLog(Arc<Mutex<Vec<FakeEvent>>>);

impl FakeLog {
    pub fn push(&self, event: FakeEvent) {
        self.0.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<FakeEvent> {
        self.0.lock().unwrap().clone()
    }

    /// Steps for which a runner was created, in creation order.
    pub fn created(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                FakeEvent::Created { step, .. } => Some(step),
                _ => None,
            })
            .collect()
    }

    /// Scratch contents observed when the runner for `step` was created.
    pub fn scratch_seen_by(&self, step: &str) -> Option<Vec<String>> {
        self.events().into_iter().find_map(|e| match e {
            FakeEvent::Created { step: s, scratch, .. } if s == step => Some(scratch),
            _ => None,
        })
    }

    /// Position of the first event equal to `event`.
    pub fn position(&self, event: &FakeEvent) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }

    /// Position of the `Created` event for `step`.
    pub fn created_at(&self, step: &str) -> Option<usize> {
        self.events()
            .iter()
            .position(|e| matches!(e, FakeEvent::Created { step: s, .. } if s == step))
    }

    pub fn count(&self, event: &FakeEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }
}

/// A runner factory whose runners follow a script instead of spawning
/// processes.
pub struct FakeRunnerFactory {
    script: HashMap<String, FakeStep>,
    default: FakeStep,
    backend: BackendKind,
    log: FakeLog,
}

impl FakeRunnerFactory {
    /// Every step succeeds immediately with its name as output.
    pub fn new(log: FakeLog) -> Self {
        Self {
            script: HashMap::new(),
            default: FakeStep::succeed(""),
            backend: BackendKind::Local,
            log,
        }
    }

    pub fn with_step(mut self, step: &str, behaviour: FakeStep) -> Self {
        self.script.insert(step.to_string(), behaviour);
        self
    }

    pub fn with_default(mut self, behaviour: FakeStep) -> Self {
        self.default = behaviour;
        self
    }

    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    fn behaviour_of(&self, step: &str) -> FakeStep {
        self.script.get(step).cloned().unwrap_or_else(|| {
            let mut fallback = self.default.clone();
            if fallback.output.is_empty() {
                fallback.output = step.as_bytes().to_vec();
            }
            fallback
        })
    }
}

fn scratch_outputs(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.path().is_file())
                .filter_map(|e| e.file_name().to_str().map(|s| s.to_string()))
                .filter(|name| !name.starts_with('.'))
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

impl RunnerFactory for FakeRunnerFactory {
    fn backend_for(&self, _step: &ScheduledStep) -> BackendKind {
        self.backend
    }

    fn create(&mut self, request: RunnerRequest<'_>) -> Result<Box<dyn Runner>> {
        let name = request.step.name.clone();
        self.log.push(FakeEvent::Created {
            step: name.clone(),
            backend: request.backend,
            scratch: scratch_outputs(request.scratch_dir),
        });

        let behaviour = self.behaviour_of(&name);
        if let Some(ref message) = behaviour.launch_error {
            return Err(CalxError::Other(anyhow::anyhow!("{message}")));
        }

        Ok(Box::new(FakeRunner {
            step: name,
            backend: request.backend,
            behaviour,
            scratch: request.scratch_dir.to_path_buf(),
            polls_seen: 0,
            finished: None,
            log: self.log.clone(),
        }))
    }
}

struct FakeRunner {
    step: String,
    backend: BackendKind,
    behaviour: FakeStep,
    scratch: PathBuf,
    polls_seen: usize,
    finished: Option<StepOutcome>,
    log: FakeLog,
}

impl FakeRunner {
    fn finish(&mut self, outcome: StepOutcome) -> StepOutcome {
        if self.finished.is_none() {
            if self.behaviour.blocks_store {
                fs::create_dir_all(self.scratch.join(&self.step))
                    .expect("fake runner could not occupy the output path");
            }
            self.finished = Some(outcome);
            self.log.push(FakeEvent::Finished(self.step.clone()));
        }
        outcome
    }
}

impl Runner for FakeRunner {
    fn step(&self) -> &str {
        &self.step
    }

    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn poll(&mut self) -> Result<Option<StepOutcome>> {
        if let Some(outcome) = self.finished {
            return Ok(Some(outcome));
        }
        if self.behaviour.hang {
            return Ok(None);
        }
        if self.polls_seen < self.behaviour.polls {
            self.polls_seen += 1;
            return Ok(None);
        }
        Ok(Some(self.finish(self.behaviour.outcome)))
    }

    fn take_output(&mut self) -> Result<Vec<u8>> {
        self.log.push(FakeEvent::OutputTaken(self.step.clone()));
        Ok(self.behaviour.output.clone())
    }

    fn wait(&mut self) -> RunnerFuture<'_, Result<StepOutcome>> {
        Box::pin(async move {
            if self.behaviour.hang && self.finished.is_none() {
                std::future::pending::<()>().await;
            }
            for _ in 0..self.behaviour.polls {
                tokio::task::yield_now().await;
            }
            let outcome = self.finished.unwrap_or(self.behaviour.outcome);
            Ok(self.finish(outcome))
        })
    }

    fn terminate(&mut self) -> RunnerFuture<'_, Result<()>> {
        Box::pin(async move {
            self.log.push(FakeEvent::Terminated(self.step.clone()));
            self.finished.get_or_insert(StepOutcome::Failed(-1));
            Ok(())
        })
    }

    fn cleanup(&mut self) -> Result<()> {
        self.log.push(FakeEvent::Cleaned(self.step.clone()));
        Ok(())
    }
}
