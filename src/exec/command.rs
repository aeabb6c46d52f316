// src/exec/command.rs

//! Command construction for each backend.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;

/// Where the working directory is mounted inside the container.
pub const CONTAINER_WORKDIR: &str = "/usr/src/app";
/// Where the scratch directory is mounted inside the container.
pub const CONTAINER_SCRATCH: &str = "/tmp/calx";

/// Paths a step sees, which differ between host and container.
#[derive(Debug, Clone, Copy)]
pub struct StepPaths<'a> {
    pub workdir: &'a Path,
    pub scratch: &'a Path,
}

/// Shell invocation appropriate for the platform.
fn shell(cmd: &str) -> Command {
    if cfg!(windows) {
        let mut c = Command::new("cmd");
        c.arg("/C").arg(cmd);
        c
    } else {
        let mut c = Command::new("sh");
        c.arg("-c").arg(cmd);
        c
    }
}

/// `sh -c <cmd>` in the working directory.
pub fn local_command(
    cmd: &str,
    step: &str,
    paths: StepPaths<'_>,
    env: &[(String, String)],
) -> Command {
    let mut command = shell(cmd);
    command
        .current_dir(paths.workdir)
        .envs(env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
        .env("CALX_TMPDIR", paths.scratch)
        .env("CALX_WORKDIR", paths.workdir)
        .env("CALX_STEP", step)
        .stdin(Stdio::null());
    command
}

/// Container name for one step of one run.
///
/// The scratch directory is unique per run, so its name keeps concurrent
/// runs of the same pipeline apart. Characters docker rejects become `-`.
pub fn container_name(scratch: &Path, step: &str) -> String {
    let run = scratch
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    format!("calx-{run}-{step}")
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.' | '-' => c,
            _ => '-',
        })
        .collect()
}

/// `docker run` with the working directory and scratch directory mounted.
///
/// The container is named so it can be killed by name; killing the `docker`
/// client alone leaves it running.
pub fn docker_command(
    image: &str,
    cmd: &str,
    step: &str,
    container: &str,
    paths: StepPaths<'_>,
    env: &[(String, String)],
) -> Command {
    let mut command = Command::new("docker");
    command
        .arg("run")
        .arg("--rm")
        .arg("--name")
        .arg(container)
        .arg("-v")
        .arg(format!("{}:{}", paths.workdir.display(), CONTAINER_WORKDIR))
        .arg("-v")
        .arg(format!("{}:{}", paths.scratch.display(), CONTAINER_SCRATCH))
        .arg("-w")
        .arg(CONTAINER_WORKDIR);

    for (k, v) in env.iter() {
        command.arg("-e").arg(format!("{k}={v}"));
    }

    command
        .arg("-e")
        .arg(format!("CALX_TMPDIR={CONTAINER_SCRATCH}"))
        .arg("-e")
        .arg(format!("CALX_WORKDIR={CONTAINER_WORKDIR}"))
        .arg("-e")
        .arg(format!("CALX_STEP={step}"))
        .arg(image)
        .arg("sh")
        .arg("-c")
        .arg(cmd)
        .current_dir(paths.workdir)
        .stdin(Stdio::null());
    command
}
