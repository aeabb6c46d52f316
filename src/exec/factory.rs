// src/exec/factory.rs

//! Runner creation.
//!
//! The runtime talks to a `RunnerFactory` instead of spawning processes
//! itself. Production code uses [`ProcessRunnerFactory`]; tests provide a
//! factory whose runners finish on a script.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::Pipeline;
use crate::dag::ScheduledStep;
use crate::engine::RunOptions;
use crate::errors::{CalxError, Result};
use crate::exec::backend::BackendSelector;
use crate::exec::command::{StepPaths, container_name, docker_command, local_command};
use crate::exec::env::step_environment;
use crate::exec::process::ProcessRunner;
use crate::exec::runner::Runner;
use crate::types::BackendKind;

/// Everything a factory needs to launch one step.
#[derive(Debug, Clone, Copy)]
pub struct RunnerRequest<'a> {
    pub step: &'a ScheduledStep,
    /// Backend chosen by [`RunnerFactory::backend_for`].
    pub backend: BackendKind,
    /// Scratch directory of the current run.
    pub scratch_dir: &'a Path,
}

/// Produces runners bound to a backend.
pub trait RunnerFactory: Send {
    /// Backend the given step is routed to.
    fn backend_for(&self, step: &ScheduledStep) -> BackendKind;

    /// Launch the step. Errors are reported as launch failures and handled
    /// according to the run's failure policy.
    fn create(&mut self, request: RunnerRequest<'_>) -> Result<Box<dyn Runner>>;
}

/// Real factory: local child processes or `docker run`.
#[derive(Debug, Clone)]
pub struct ProcessRunnerFactory {
    workdir: PathBuf,
    selector: BackendSelector,
    docker_image: Option<String>,
}

impl ProcessRunnerFactory {
    pub fn new(
        workdir: impl Into<PathBuf>,
        selector: BackendSelector,
        docker_image: Option<String>,
    ) -> Self {
        Self {
            workdir: workdir.into(),
            selector,
            docker_image,
        }
    }

    /// Build the factory for a pipeline, resolving backend overrides once.
    ///
    /// Fails when some step resolves to docker but no image is configured.
    pub fn for_pipeline(
        pipeline: &Pipeline,
        workdir: impl Into<PathBuf>,
        default_backend: BackendKind,
    ) -> Result<Self> {
        let selector = BackendSelector::from_pipeline(pipeline, default_backend);

        let needs_docker = selector
            .any_resolves_to(pipeline.step.keys().map(|s| s.as_str()), BackendKind::Docker);
        if needs_docker && pipeline.config.docker_image.is_none() {
            return Err(CalxError::ConfigError(
                "[config].docker_image is required when a step runs on the docker backend"
                    .to_string(),
            ));
        }

        Ok(Self::new(
            workdir,
            selector,
            pipeline.config.docker_image.clone(),
        ))
    }

    /// Factory for the workdir and default backend carried by `options`.
    pub fn from_options(pipeline: &Pipeline, options: &RunOptions) -> Result<Self> {
        Self::for_pipeline(pipeline, options.workdir.clone(), options.default_backend)
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn selector(&self) -> &BackendSelector {
        &self.selector
    }
}

impl RunnerFactory for ProcessRunnerFactory {
    fn backend_for(&self, step: &ScheduledStep) -> BackendKind {
        self.selector.resolve(&step.step)
    }

    fn create(&mut self, request: RunnerRequest<'_>) -> Result<Box<dyn Runner>> {
        let step = request.step;
        let env = step_environment(&self.workdir, &step.config)?;

        let capture = request
            .scratch_dir
            .join(".runs")
            .join(format!("{}.stdout", step.name));
        let declared_output = step.config.output.as_ref().map(|o| self.workdir.join(o));

        let host_paths = StepPaths {
            workdir: &self.workdir,
            scratch: request.scratch_dir,
        };

        let mut container = None;
        let command = match request.backend {
            BackendKind::Local => local_command(&step.config.cmd, &step.name, host_paths, &env),
            BackendKind::Docker => {
                let image = self.docker_image.as_deref().ok_or_else(|| {
                    CalxError::ConfigError(format!(
                        "step '{}' needs the docker backend but no docker_image is configured",
                        step.name
                    ))
                })?;
                let name = container_name(request.scratch_dir, &step.name);
                let command =
                    docker_command(image, &step.config.cmd, &step.name, &name, host_paths, &env);
                container = Some(name);
                command
            }
        };

        debug!(
            step = %step.name,
            backend = %request.backend,
            cmd = %step.config.cmd,
            "creating process runner"
        );

        let mut runner = ProcessRunner::spawn(
            &step.name,
            request.backend,
            command,
            capture,
            declared_output,
        )?;
        if let Some(name) = container {
            runner = runner.with_container(name);
        }

        Ok(Box::new(runner))
    }
}
