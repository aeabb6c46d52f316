// tests/property_scheduler.rs

use std::collections::{BTreeSet, HashSet};

use proptest::prelude::*;
use calx::config::Pipeline;
use calx::dag::{Scheduler, StepState};
use calx::engine::StepOutcome;
use calx::types::FailurePolicy;
use calx_test_utils::builders::PipelineBuilder;

// Acyclic by construction: step N may only depend on steps 0..N-1.
fn dag_strategy(max_steps: usize) -> impl Strategy<Value = Pipeline> {
    (1..=max_steps).prop_flat_map(|num_steps| {
        proptest::collection::vec(
            proptest::collection::vec(any::<usize>(), 0..num_steps),
            num_steps,
        )
        .prop_map(move |raw_deps| {
            let mut builder = PipelineBuilder::new();
            for (i, potential) in raw_deps.into_iter().enumerate() {
                let deps: BTreeSet<String> = if i == 0 {
                    BTreeSet::new()
                } else {
                    potential.into_iter().map(|d| format!("s{}", d % i)).collect()
                };
                let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
                builder = builder.node(&format!("s{i}"), &deps);
            }
            builder.build()
        })
    })
}

proptest! {
    #[test]
    fn test_every_step_dispatched_once_in_dependency_order(
        pipeline in dag_strategy(12),
        // Completion order within a batch, as a rotation.
        rotation in 0..12usize,
    ) {
        let mut sched = Scheduler::from_pipeline(&pipeline, FailurePolicy::FailFast).unwrap();
        let mut dispatched: Vec<String> = Vec::new();
        let mut completed: HashSet<String> = HashSet::new();
        let mut running: Vec<String> = Vec::new();

        loop {
            for step in sched.admit() {
                let entry = pipeline.node(&step.name).unwrap();
                for dep in entry.dependencies.iter() {
                    prop_assert!(completed.contains(dep), "{} admitted before {}", step.name, dep);
                }
                prop_assert!(!dispatched.contains(&step.name));
                dispatched.push(step.name.clone());
                running.push(step.name);
            }

            if running.is_empty() {
                break;
            }

            let idx = rotation % running.len();
            let name = running.remove(idx);
            let result = sched.step_completion(&name, StepOutcome::Success);
            prop_assert!(!result.abort);
            completed.insert(name);
        }

        prop_assert_eq!(dispatched.len(), pipeline.dag.len());
        prop_assert!(sched.queue_is_empty());
        prop_assert!(sched.finish().is_ok());
        prop_assert!(sched.states().all(|(_, state)| state == StepState::Succeeded));
    }

    #[test]
    fn test_best_effort_never_runs_downstream_of_failure(
        pipeline in dag_strategy(10),
        failing in proptest::collection::hash_set(0..10usize, 0..3),
    ) {
        let failing: HashSet<String> = failing.into_iter().map(|i| format!("s{i}")).collect();
        let mut sched = Scheduler::from_pipeline(&pipeline, FailurePolicy::BestEffort).unwrap();
        let mut failed: HashSet<String> = HashSet::new();
        let mut running: Vec<String> = Vec::new();

        loop {
            for step in sched.admit() {
                let downstream_of_failure = failed
                    .iter()
                    .any(|f| sched.graph().transitive_dependents(f).contains(&step.name));
                prop_assert!(!downstream_of_failure, "{} ran after an upstream failure", step.name);
                running.push(step.name);
            }

            let Some(name) = running.pop() else { break };
            let outcome = if failing.contains(&name) {
                failed.insert(name.clone());
                StepOutcome::Failed(1)
            } else {
                StepOutcome::Success
            };
            sched.step_completion(&name, outcome);
        }

        prop_assert!(sched.queue_is_empty());
        prop_assert!(sched.finish().is_ok());
        for (name, state) in sched.states() {
            prop_assert!(state.is_terminal(), "{} left in {:?}", name, state);
        }
    }
}
