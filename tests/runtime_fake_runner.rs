// tests/runtime_fake_runner.rs
//
// Full runs of the control loop against scripted runners.

use std::fs;
use std::path::Path;
use std::time::Duration;

use calx::config::Pipeline;
use calx::dag::FailureReason;
use calx::engine::{CancelSignal, PipelineRuntime, RunOptions, cancel_pair};
use calx::errors::CalxError;
use calx::run_pipeline;
use calx::types::{BackendKind, FailurePolicy};
use calx_test_utils::builders::PipelineBuilder;
use calx_test_utils::fake_runner::{FakeEvent, FakeLog, FakeRunnerFactory, FakeStep};
use calx_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

fn options(pipeline: &Pipeline, scratch_root: &Path) -> RunOptions {
    RunOptions::from_pipeline(pipeline, scratch_root)
        .with_scratch_root(scratch_root)
        .with_poll_interval(Duration::from_millis(1), Duration::from_millis(5))
        .with_terminate_timeout(Duration::from_millis(200))
}

fn scratch_root_is_empty(root: &Path) -> bool {
    fs::read_dir(root).map(|mut d| d.next().is_none()).unwrap_or(true)
}

/// A and B have no dependencies; C depends on both.
fn fan_in() -> Pipeline {
    PipelineBuilder::new()
        .node("A", &[])
        .node("B", &[])
        .node("C", &["A", "B"])
        .build()
}

#[tokio::test]
async fn test_fan_in_runs_roots_together_then_dependent() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = fan_in();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone());

    let report = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap();

    assert!(report.is_success());
    assert_eq!(
        report.admissions,
        vec![vec!["A".to_string(), "B".to_string()], vec!["C".to_string()]]
    );
    assert_eq!(report.succeeded, vec!["A", "B", "C"]);
    assert_eq!(report.output("A"), Some(&b"A"[..]));
    assert_eq!(report.output("B"), Some(&b"B"[..]));
    assert_eq!(report.output("C"), Some(&b"C"[..]));
    assert_eq!(report.outputs.len(), 3);

    assert!(scratch_root_is_empty(root.path()), "scratch directory must be removed");
}

#[tokio::test]
async fn test_dependent_sees_upstream_outputs_in_scratch() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = fan_in();
    let log = FakeLog::default();
    // B takes a few sweeps longer than A.
    let factory = FakeRunnerFactory::new(log.clone())
        .with_step("B", FakeStep::succeed("b-out").after_polls(3));

    let report = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap();

    assert_eq!(report.output("B"), Some(&b"b-out"[..]));

    assert_eq!(log.scratch_seen_by("A"), Some(vec![]));
    assert_eq!(
        log.scratch_seen_by("C"),
        Some(vec!["A".to_string(), "B".to_string()])
    );

    // Upstream completion, output retrieval and cleanup all happen before the
    // dependent is launched.
    let c_created = log.created_at("C").unwrap();
    for upstream in ["A", "B"] {
        for event in [
            FakeEvent::Finished(upstream.to_string()),
            FakeEvent::OutputTaken(upstream.to_string()),
            FakeEvent::Cleaned(upstream.to_string()),
        ] {
            let at = log.position(&event).unwrap();
            assert!(at < c_created, "{event:?} must precede creation of C");
        }
    }

    // A finished first; B was still running when A completed.
    assert!(
        log.position(&FakeEvent::Finished("A".into())).unwrap()
            < log.position(&FakeEvent::Finished("B".into())).unwrap()
    );
}

#[tokio::test]
async fn test_every_step_is_dispatched_exactly_once() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("a", &[])
        .node("b", &["a"])
        .node("c", &["a"])
        .node("d", &["b", "c"])
        .node("e", &["d", "a"])
        .build();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone())
        .with_step("b", FakeStep::succeed("b").after_polls(2))
        .with_step("c", FakeStep::succeed("c").after_polls(5));

    let report = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap();

    let mut created = log.created();
    created.sort();
    assert_eq!(created, vec!["a", "b", "c", "d", "e"]);
    for step in ["a", "b", "c", "d", "e"] {
        assert_eq!(log.count(&FakeEvent::Cleaned(step.to_string())), 1);
    }
    assert_eq!(report.admissions.len(), 4);
}

#[tokio::test]
async fn test_best_effort_blocks_dependents_and_finishes_other_branches() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("A", &[])
        .node("B", &["A"])
        .node("C", &[])
        .policy(FailurePolicy::BestEffort)
        .build();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone()).with_step("A", FakeStep::fail(3));

    let report = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.failed, vec![("A".to_string(), FailureReason::Exit(3))]);
    assert_eq!(report.blocked, vec!["B"]);
    assert_eq!(report.succeeded, vec!["C"]);
    assert_eq!(report.output("C"), Some(&b"C"[..]));
    // A's (empty) output is still recorded.
    assert_eq!(report.output("A"), Some(&b""[..]));

    assert!(!log.created().contains(&"B".to_string()));
    assert!(scratch_root_is_empty(root.path()));

    let summary = report.to_string();
    assert!(summary.contains("blocked (1)"));
    assert!(summary.contains("A: exited with code 3"));
}

#[tokio::test]
async fn test_best_effort_launch_failure_blocks_dependents() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("A", &[])
        .node("B", &["A"])
        .node("C", &[])
        .policy(FailurePolicy::BestEffort)
        .build();
    let log = FakeLog::default();
    let factory =
        FakeRunnerFactory::new(log.clone()).with_step("A", FakeStep::launch_error("no shell"));

    let report = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap();

    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0],
        (ref name, FailureReason::Launch(ref reason)) if name == "A" && reason.contains("no shell")
    ));
    assert_eq!(report.blocked, vec!["B"]);
    assert_eq!(report.succeeded, vec!["C"]);
    assert!(report.output("A").is_none());
}

#[tokio::test]
async fn test_fail_fast_terminates_active_runs_and_abandons_queue() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("A", &[])
        .node("B", &[])
        .node("C", &["A"])
        .build();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone())
        .with_step("A", FakeStep::fail(2).after_polls(1))
        .with_step("B", FakeStep::hang());

    let err = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap_err();

    assert!(
        matches!(err, CalxError::RunnerFailure { ref step, code: 2 } if step == "A"),
        "unexpected error: {err:?}"
    );
    assert_eq!(log.count(&FakeEvent::Terminated("B".into())), 1);
    assert_eq!(log.count(&FakeEvent::Cleaned("B".into())), 1);
    assert!(log.created_at("C").is_none());
    assert!(scratch_root_is_empty(root.path()));
}

#[tokio::test]
async fn test_fail_fast_launch_failure_aborts_run() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("A", &[])
        .node("B", &[])
        .node("C", &["A"])
        .build();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone())
        .with_step("A", FakeStep::launch_error("image missing"))
        .with_default(FakeStep::hang());

    let err = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap_err();

    assert!(matches!(err, CalxError::RunnerLaunch { ref step, .. } if step == "A"));
    // B sorts after A in the batch and is never launched.
    assert_eq!(log.created(), vec!["A"]);
    assert!(scratch_root_is_empty(root.path()));
}

#[tokio::test]
async fn test_cancellation_terminates_everything_and_removes_scratch() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = fan_in();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone()).with_default(FakeStep::hang());

    let (handle, signal) = cancel_pair();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
    });

    let err = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        signal,
    ))
    .await
    .unwrap_err();

    assert!(matches!(err, CalxError::Cancelled));
    assert_eq!(log.created(), vec!["A", "B"]);
    assert_eq!(log.count(&FakeEvent::Terminated("A".into())), 1);
    assert_eq!(log.count(&FakeEvent::Terminated("B".into())), 1);
    assert!(log.created_at("C").is_none());
    assert!(scratch_root_is_empty(root.path()));
}

#[tokio::test]
async fn test_cancel_before_start_launches_nothing() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = fan_in();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone());

    let (handle, signal) = cancel_pair();
    handle.cancel();

    let err = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        signal,
    ))
    .await
    .unwrap_err();

    assert!(matches!(err, CalxError::Cancelled));
    assert!(log.events().is_empty());
    assert!(scratch_root_is_empty(root.path()));
}

#[tokio::test]
async fn test_invalid_pipeline_creates_no_runner() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("A", &[])
        .node("B", &["X"])
        .build_unchecked();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone());

    let err = run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    )
    .await
    .unwrap_err();

    assert!(err.is_configuration());
    assert!(matches!(err, CalxError::ConfigError(ref msg) if msg.contains("'X'")));
    assert!(log.events().is_empty());
    assert!(scratch_root_is_empty(root.path()));
}

#[tokio::test]
async fn test_unvalidated_cycle_is_reported_as_deadlock() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("A", &[])
        .node("B", &["A", "C"])
        .node("C", &["B"])
        .build_unchecked();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone());

    let runtime = PipelineRuntime::new(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    )
    .unwrap();
    let err = with_timeout(runtime.run()).await.unwrap_err();

    match err {
        CalxError::Deadlock { stuck } => {
            let names: Vec<_> = stuck.iter().map(|s| s.name.as_str()).collect();
            assert_eq!(names, vec!["B", "C"]);
        }
        other => panic!("Expected Deadlock, got {other:?}"),
    }
    // A ran; the cycle was only noticed once nothing else could progress.
    assert_eq!(log.created(), vec!["A"]);
    assert!(scratch_root_is_empty(root.path()));
}

#[tokio::test]
async fn test_runner_backend_is_passed_through() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new().node("A", &[]).build();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone()).with_backend(BackendKind::Docker);

    with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap();

    assert!(matches!(
        log.events().first(),
        Some(FakeEvent::Created { backend: BackendKind::Docker, .. })
    ));
}

#[tokio::test]
async fn test_node_name_unusable_as_file_name_is_rejected_before_launch() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("ok", &[])
        .node("bad/name", &[])
        .build_unchecked();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone());

    let err = PipelineRuntime::new(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    )
    .unwrap_err();

    assert!(matches!(err, CalxError::ConfigError(ref msg) if msg.contains("bad/name")));
    assert!(log.events().is_empty());
    assert!(scratch_root_is_empty(root.path()));
}

#[tokio::test]
async fn test_store_failure_still_releases_runner_and_settles_step() {
    init_tracing();
    let root = TempDir::new().unwrap();
    let pipeline = PipelineBuilder::new()
        .node("A", &[])
        .node("B", &["A"])
        .policy(FailurePolicy::BestEffort)
        .build();
    let log = FakeLog::default();
    let factory = FakeRunnerFactory::new(log.clone())
        .with_step("A", FakeStep::succeed("lost").blocking_store());

    let err = with_timeout(run_pipeline(
        &pipeline,
        options(&pipeline, root.path()),
        factory,
        CancelSignal::never(),
    ))
    .await
    .unwrap_err();

    assert!(!err.is_configuration(), "unexpected error: {err:?}");
    assert_eq!(log.count(&FakeEvent::Cleaned("A".into())), 1);
    assert_eq!(log.created(), vec!["A"]);
    assert!(scratch_root_is_empty(root.path()));
}
