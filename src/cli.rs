// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{ArgGroup, Parser, ValueEnum};

use crate::types::{BackendKind, FailurePolicy};

/// Command-line arguments for `calx-run`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "calx-run",
    version,
    about = "Run pipeline steps in dependency order.",
    long_about = None
)]
#[command(group(ArgGroup::new("mode").required(true).args(["all", "step"])))]
pub struct CliArgs {
    /// Working directory. Steps run here and pipeline paths resolve from here.
    #[arg(value_name = "WORKDIR")]
    pub workdir: PathBuf,

    /// Path to the pipeline file (TOML), relative to WORKDIR unless absolute.
    #[arg(short, long, value_name = "PATH", default_value = "pipeline.toml")]
    pub file: PathBuf,

    /// Run every step of the pipeline DAG.
    #[arg(short, long)]
    pub all: bool,

    /// Run a single `[step.<NAME>]` outside the DAG.
    #[arg(short, long, value_name = "NAME")]
    pub step: Option<String>,

    /// Default backend for steps without an override.
    ///
    /// If omitted, `[config].backend` is used.
    #[arg(short, long, value_enum, value_name = "BACKEND")]
    pub backend: Option<BackendArg>,

    /// What to do when a step fails.
    ///
    /// If omitted, `[config].policy` is used.
    #[arg(long, value_enum, value_name = "POLICY")]
    pub policy: Option<PolicyArg>,

    /// Cancel the run after this many seconds.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Parent directory for the per-run scratch directory.
    ///
    /// Default: the system temporary directory.
    #[arg(long, value_name = "DIR")]
    pub scratch_root: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CALX_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Parse + validate, print the DAG, but don't launch any step.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum BackendArg {
    Local,
    Docker,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Local => BackendKind::Local,
            BackendArg::Docker => BackendKind::Docker,
        }
    }
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum PolicyArg {
    FailFast,
    BestEffort,
}

impl From<PolicyArg> for FailurePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::FailFast => FailurePolicy::FailFast,
            PolicyArg::BestEffort => FailurePolicy::BestEffort,
        }
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
