// src/exec/process.rs

//! Child-process runner shared by the local and docker backends.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};

use anyhow::{Context, anyhow};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

use crate::engine::StepOutcome;
use crate::errors::Result;
use crate::exec::runner::{Runner, RunnerFuture};
use crate::types::BackendKind;

/// Map an exit status onto the scheduler's outcome.
pub fn outcome_from_status(status: ExitStatus) -> StepOutcome {
    if status.success() {
        StepOutcome::Success
    } else {
        StepOutcome::Failed(status.code().unwrap_or(-1))
    }
}

/// A step running as a child process.
///
/// Stdout goes straight to `capture` so a chatty step can never fill a pipe
/// while the scheduler is busy elsewhere. Stderr is drained in the background
/// and logged at debug.
#[derive(Debug)]
pub struct ProcessRunner {
    step: String,
    backend: BackendKind,
    child: Child,
    capture: PathBuf,
    /// File the step writes its result to, if it declares one.
    declared_output: Option<PathBuf>,
    /// Name of the container when the step runs under `docker run`.
    container: Option<String>,
    status: Option<StepOutcome>,
    cleaned: bool,
}

impl ProcessRunner {
    /// Spawn `command`, capturing stdout into `capture`.
    ///
    /// On unix the child leads a new process group so that `terminate` also
    /// reaches whatever the shell started.
    pub fn spawn(
        step: &str,
        backend: BackendKind,
        mut command: Command,
        capture: PathBuf,
        declared_output: Option<PathBuf>,
    ) -> Result<Self> {
        if let Some(parent) = capture.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating capture directory {:?}", parent))?;
        }
        let stdout = fs::File::create(&capture)
            .with_context(|| format!("creating capture file {:?}", capture))?;

        command
            .stdout(Stdio::from(stdout))
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);

        let mut child = command
            .spawn()
            .with_context(|| format!("spawning process for step '{}'", step))?;

        info!(step = %step, %backend, pid = child.id(), "step process started");

        if let Some(stderr) = child.stderr.take() {
            let step_name = step.to_string();
            tokio::spawn(async move {
                let reader = BufReader::new(stderr);
                let mut lines = reader.lines();

                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(step = %step_name, "stderr: {}", line);
                }
            });
        }

        Ok(Self {
            step: step.to_string(),
            backend,
            child,
            capture,
            declared_output,
            container: None,
            status: None,
            cleaned: false,
        })
    }

    /// Remember the container name so `terminate` can kill it.
    pub fn with_container(mut self, name: impl Into<String>) -> Self {
        self.container = Some(name.into());
        self
    }

    /// File whose contents become the captured output.
    pub fn output_source(&self) -> &Path {
        self.declared_output.as_deref().unwrap_or(&self.capture)
    }

    #[cfg(unix)]
    fn kill_process_tree(&mut self) {
        if let Some(pid) = self.child.id() {
            // The child is its own group leader, see `spawn`. It has not been
            // reaped yet, so the group id cannot have been reused.
            let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
            if rc == 0 {
                debug!(step = %self.step, pgid = pid, "killed step process group");
                return;
            }
            let err = std::io::Error::last_os_error();
            if err.raw_os_error() != Some(libc::ESRCH) {
                warn!(step = %self.step, error = %err, "failed to kill step process group");
            }
        }
        self.kill_child();
    }

    #[cfg(not(unix))]
    fn kill_process_tree(&mut self) {
        self.kill_child();
    }

    fn kill_child(&mut self) {
        if let Err(e) = self.child.start_kill() {
            // InvalidInput means the child already exited.
            if e.kind() != ErrorKind::InvalidInput {
                warn!(step = %self.step, error = %e, "failed to kill step process");
            }
        }
    }

    fn record(&mut self, status: ExitStatus) -> StepOutcome {
        let outcome = outcome_from_status(status);
        info!(
            step = %self.step,
            exit_code = status.code().unwrap_or(-1),
            success = status.success(),
            "step process exited"
        );
        self.status = Some(outcome);
        outcome
    }
}

impl Runner for ProcessRunner {
    fn step(&self) -> &str {
        &self.step
    }

    fn backend(&self) -> BackendKind {
        self.backend
    }

    fn poll(&mut self) -> Result<Option<StepOutcome>> {
        if let Some(outcome) = self.status {
            return Ok(Some(outcome));
        }

        let status = self
            .child
            .try_wait()
            .with_context(|| format!("polling process of step '{}'", self.step))?;

        Ok(status.map(|s| self.record(s)))
    }

    fn take_output(&mut self) -> Result<Vec<u8>> {
        if self.status.is_none() {
            return Err(anyhow!("output of step '{}' requested before it finished", self.step).into());
        }

        let source = self.output_source().to_path_buf();
        let bytes =
            fs::read(&source).with_context(|| format!("reading output of step '{}' from {:?}", self.step, source))?;
        Ok(bytes)
    }

    fn wait(&mut self) -> RunnerFuture<'_, Result<StepOutcome>> {
        Box::pin(async move {
            if let Some(outcome) = self.status {
                return Ok(outcome);
            }

            let status = self
                .child
                .wait()
                .await
                .with_context(|| format!("waiting for process of step '{}'", self.step))?;

            Ok(self.record(status))
        })
    }

    fn terminate(&mut self) -> RunnerFuture<'_, Result<()>> {
        Box::pin(async move {
            if self.status.is_some() {
                return Ok(());
            }

            info!(step = %self.step, "terminating step process");

            if let Some(name) = self.container.as_deref() {
                kill_container(&self.step, name).await;
            }
            self.kill_process_tree();

            let status = self
                .child
                .wait()
                .await
                .with_context(|| format!("waiting for terminated step '{}'", self.step))?;
            self.record(status);
            Ok(())
        })
    }

    fn cleanup(&mut self) -> Result<()> {
        if self.cleaned {
            return Ok(());
        }

        let artifacts = std::iter::once(self.capture.clone()).chain(self.declared_output.clone());
        for path in artifacts {
            match fs::remove_file(&path) {
                Ok(()) => debug!(step = %self.step, path = ?path, "removed runner artifact"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!("removing runner artifact {:?}", path))
                        .into());
                }
            }
        }

        self.cleaned = true;
        Ok(())
    }
}

/// Stop a named container. It may already be gone, which is fine.
async fn kill_container(step: &str, name: &str) {
    let result = Command::new("docker")
        .arg("kill")
        .arg(name)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match result {
        Ok(status) if status.success() => info!(step = %step, container = %name, "killed container"),
        Ok(status) => debug!(
            step = %step,
            container = %name,
            exit_code = status.code().unwrap_or(-1),
            "docker kill did not succeed, container probably already exited"
        ),
        Err(e) => warn!(step = %step, container = %name, error = %e, "failed to run docker kill"),
    }
}
