// tests/cli_run.rs
//
// The command-line entry point: its result decides the process exit status.
#![cfg(unix)]

use std::fs;

use calx::cli::CliArgs;
use calx_test_utils::{init_tracing, with_timeout};
use clap::Parser;
use tempfile::TempDir;

fn write_pipeline(dir: &TempDir, toml: &str) {
    fs::write(dir.path().join("pipeline.toml"), toml).unwrap();
}

fn args(workdir: &TempDir, scratch_root: &TempDir, extra: &[&str]) -> CliArgs {
    let mut argv = vec![
        "calx-run".to_string(),
        workdir.path().display().to_string(),
        "--scratch-root".to_string(),
        scratch_root.path().display().to_string(),
    ];
    argv.extend(extra.iter().map(|s| s.to_string()));
    CliArgs::try_parse_from(argv).unwrap()
}

const PARTIAL_FAILURE: &str = r#"
[config]
policy = "best-effort"

[step.broken]
cmd = "false"

[step.fine]
cmd = "true"

[[dag]]
name = "A"
step = "broken"

[[dag]]
name = "B"
step = "fine"

[[dag]]
name = "C"
step = "fine"
dependencies = ["A"]
"#;

#[tokio::test]
async fn test_best_effort_partial_failure_is_an_error() {
    init_tracing();
    let workdir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    write_pipeline(&workdir, PARTIAL_FAILURE);

    let err = with_timeout(calx::run(args(&workdir, &scratch, &["--all"])))
        .await
        .unwrap_err();

    let message = err.to_string();
    assert!(message.contains("1 failed"), "unexpected error: {message}");
    assert!(message.contains("1 blocked"), "unexpected error: {message}");
    assert!(fs::read_dir(scratch.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_all_steps_succeeding_is_ok() {
    init_tracing();
    let workdir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    write_pipeline(&workdir, &PARTIAL_FAILURE.replace("\"false\"", "\"true\""));

    with_timeout(calx::run(args(&workdir, &scratch, &["--all"])))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_failing_single_step_is_an_error() {
    init_tracing();
    let workdir = TempDir::new().unwrap();
    let scratch = TempDir::new().unwrap();
    write_pipeline(&workdir, PARTIAL_FAILURE);

    let err = with_timeout(calx::run(args(&workdir, &scratch, &["--step", "broken"])))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("broken"), "unexpected error: {err}");

    with_timeout(calx::run(args(&workdir, &scratch, &["--step", "fine"])))
        .await
        .unwrap();
}
