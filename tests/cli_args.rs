// tests/cli_args.rs

use std::path::PathBuf;

use calx::cli::{BackendArg, CliArgs, LogLevel, PolicyArg};
use calx::logging::build_filter;
use calx::types::{BackendKind, FailurePolicy};
use clap::Parser;

#[test]
fn test_all_mode_with_defaults() {
    let args = CliArgs::try_parse_from(["calx-run", "proj", "--all"]).unwrap();

    assert!(args.all);
    assert_eq!(args.step, None);
    assert_eq!(args.workdir, PathBuf::from("proj"));
    assert_eq!(args.file, PathBuf::from("pipeline.toml"));
    assert!(args.backend.is_none());
    assert!(args.policy.is_none());
    assert!(!args.dry_run);
}

#[test]
fn test_single_step_with_overrides() {
    let args = CliArgs::try_parse_from([
        "calx-run",
        ".",
        "-s",
        "train",
        "-f",
        "ci.toml",
        "-b",
        "docker",
        "--policy",
        "best-effort",
        "--timeout",
        "30",
        "--log-level",
        "debug",
    ])
    .unwrap();

    assert_eq!(args.step.as_deref(), Some("train"));
    assert_eq!(args.file, PathBuf::from("ci.toml"));
    assert_eq!(args.backend.map(BackendKind::from), Some(BackendKind::Docker));
    assert_eq!(
        args.policy.map(FailurePolicy::from),
        Some(FailurePolicy::BestEffort)
    );
    assert_eq!(args.timeout, Some(30));
    assert!(matches!(args.log_level, Some(LogLevel::Debug)));
}

#[test]
fn test_mode_is_required_and_exclusive() {
    assert!(CliArgs::try_parse_from(["calx-run", "."]).is_err());
    assert!(CliArgs::try_parse_from(["calx-run", ".", "--all", "--step", "x"]).is_err());
}

#[test]
fn test_arg_enums_map_to_domain_types() {
    assert_eq!(BackendKind::from(BackendArg::Local), BackendKind::Local);
    assert_eq!(FailurePolicy::from(PolicyArg::FailFast), FailurePolicy::FailFast);
}

#[test]
fn test_cli_level_builds_a_filter() {
    let filter = build_filter(Some(LogLevel::Trace)).unwrap();
    assert!(filter.to_string().contains("trace"));
}
