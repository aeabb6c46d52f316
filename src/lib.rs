// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod store;
pub mod types;

use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::model::Pipeline;
use crate::config::{load_and_validate, resolve_pipeline_path, validate_pipeline};
use crate::engine::{
    CancelHandle, CancelSignal, PipelineRuntime, RunOptions, RunReport, cancel_pair,
};
use crate::exec::{BackendSelector, ProcessRunnerFactory, RunnerFactory};

pub use crate::engine::run_single_step;

/// Execute the full DAG of a pipeline.
///
/// The pipeline is validated first, so a malformed graph is rejected with a
/// configuration error before any runner is created. Success and best-effort
/// partial failure return a [`RunReport`]; fail-fast failure, deadlock and
/// cancellation return an error. The scratch directory is gone either way.
pub async fn run_pipeline<F: RunnerFactory>(
    pipeline: &Pipeline,
    options: RunOptions,
    factory: F,
    cancel: CancelSignal,
) -> errors::Result<RunReport> {
    validate_pipeline(pipeline)?;
    let runtime = PipelineRuntime::new(pipeline, options, factory, cancel)?;
    runtime.run().await
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - pipeline loading
/// - runner factory with resolved backend overrides
/// - scheduler runtime (full DAG) or single-step invocation
/// - Ctrl-C and `--timeout` cancellation
pub async fn run(args: CliArgs) -> Result<()> {
    let workdir = args
        .workdir
        .canonicalize()
        .with_context(|| format!("resolving working directory {:?}", args.workdir))?;
    let pipeline_path = resolve_pipeline_path(&workdir, &args.file);
    let pipeline = load_and_validate(&pipeline_path)
        .with_context(|| format!("loading pipeline {:?}", pipeline_path))?;

    if args.dry_run {
        print_dry_run(&pipeline, &workdir);
        return Ok(());
    }

    let mut options = RunOptions::from_pipeline(&pipeline, &workdir);
    if let Some(backend) = args.backend {
        options = options.with_backend(backend.into());
    }
    if let Some(policy) = args.policy {
        options = options.with_policy(policy.into());
    }
    if let Some(root) = args.scratch_root {
        options = options.with_scratch_root(root);
    }

    let factory = ProcessRunnerFactory::from_options(&pipeline, &options)?;

    let (cancel_handle, cancel) = cancel_pair();
    spawn_cancel_sources(&cancel_handle, args.timeout);

    if let Some(step) = args.step {
        let mut factory = factory;
        let run = run_single_step(&pipeline, &step, &options, &mut factory, cancel).await?;

        std::io::stdout()
            .write_all(&run.output)
            .context("writing step output to stdout")?;

        if !run.is_success() {
            anyhow::bail!("step '{}' failed: {:?}", run.step, run.outcome);
        }
        return Ok(());
    }

    info!(workdir = ?workdir, pipeline = ?pipeline_path, "running full pipeline");
    let report = run_pipeline(&pipeline, options, factory, cancel).await?;

    print!("{report}");

    if !report.is_success() {
        anyhow::bail!(
            "pipeline finished with {} failed and {} blocked step(s)",
            report.failed.len(),
            report.blocked.len()
        );
    }

    Ok(())
}

/// Ctrl-C and the optional run timeout both request cancellation.
fn spawn_cancel_sources(handle: &CancelHandle, timeout_secs: Option<u64>) {
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            handle.cancel();
        });
    }

    if let Some(secs) = timeout_secs {
        let handle = handle.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            info!(timeout_secs = secs, "run timeout elapsed");
            handle.cancel();
        });
    }
}

/// Simple dry-run output: print steps, dependencies and resolved backends.
fn print_dry_run(pipeline: &Pipeline, workdir: &Path) {
    let selector = BackendSelector::from_pipeline(pipeline, pipeline.config.backend);

    println!("calx dry-run");
    println!("  workdir = {}", workdir.display());
    println!("  config.policy = {}", pipeline.config.policy);
    println!("  config.backend = {}", pipeline.config.backend);
    if let Some(ref image) = pipeline.config.docker_image {
        println!("  config.docker_image = {image}");
    }
    println!();

    println!("dag ({}):", pipeline.dag.len());
    for entry in pipeline.dag.iter() {
        println!("  - {} (step: {})", entry.name, entry.step);
        if let Some(cfg) = pipeline.step_config_of(entry) {
            println!("      cmd: {}", cfg.cmd);
            println!("      backend: {}", selector.resolve(&entry.step));
            if let Some(ref out) = cfg.output {
                println!("      output: {out}");
            }
        }
        if !entry.dependencies.is_empty() {
            println!("      dependencies: {:?}", entry.dependencies);
        }
    }

    debug!("dry-run complete (no execution)");
}
