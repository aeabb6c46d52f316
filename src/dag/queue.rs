// src/dag/queue.rs

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::config::model::Pipeline;
use crate::engine::StepName;
use crate::errors::StuckStep;

/// A step that has not been dispatched yet, with the dependencies it is still
/// waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedStep {
    pub name: StepName,
    /// Name of the `[step.*]` configuration this node executes.
    pub step: String,
    /// Dependencies that have not completed yet. The step is eligible exactly
    /// when this is empty.
    pub remaining: BTreeSet<StepName>,
}

impl QueuedStep {
    pub fn is_eligible(&self) -> bool {
        self.remaining.is_empty()
    }
}

/// The mutable dependency graph of a single run: every not-yet-dispatched
/// step keyed by name.
///
/// Semantics:
/// - `eligible()` lists queued steps with no remaining dependencies.
/// - `take_eligible()` removes those steps from the queue (dispatch), so a
///   step can never be handed out twice.
/// - `release(name)` removes a completed step from every remaining set and is
///   idempotent.
/// - `is_empty()` is true once every step has been dispatched or removed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepQueue {
    queued: BTreeMap<StepName, QueuedStep>,
}

impl StepQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the queue with every DAG node of the pipeline.
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let queued = pipeline
            .dag
            .iter()
            .map(|entry| {
                (
                    entry.name.clone(),
                    QueuedStep {
                        name: entry.name.clone(),
                        step: entry.step.clone(),
                        remaining: entry.dependencies.iter().cloned().collect(),
                    },
                )
            })
            .collect();

        Self { queued }
    }

    /// Names of queued steps whose remaining dependency set is empty, sorted.
    pub fn eligible(&self) -> Vec<StepName> {
        self.queued
            .values()
            .filter(|q| q.is_eligible())
            .map(|q| q.name.clone())
            .collect()
    }

    /// Remove and return every eligible step, sorted by name.
    pub fn take_eligible(&mut self) -> Vec<QueuedStep> {
        let names = self.eligible();
        names
            .into_iter()
            .filter_map(|name| self.queued.remove(&name))
            .collect()
    }

    /// Remove `completed` from the remaining set of every still-queued step.
    ///
    /// Returns the steps that became eligible because of this call; a second
    /// call with the same name returns nothing and changes nothing.
    pub fn release(&mut self, completed: &str) -> Vec<StepName> {
        let mut unblocked = Vec::new();

        for q in self.queued.values_mut() {
            if q.remaining.remove(completed) && q.remaining.is_empty() {
                unblocked.push(q.name.clone());
            }
        }

        if !unblocked.is_empty() {
            debug!(completed = %completed, ?unblocked, "released dependents");
        }

        unblocked
    }

    /// Drop a step from the queue without dispatching it.
    pub fn remove(&mut self, name: &str) -> Option<QueuedStep> {
        self.queued.remove(name)
    }

    /// Drop every queued step, returning their names sorted.
    pub fn drain(&mut self) -> Vec<StepName> {
        let names = self.queued.keys().cloned().collect();
        self.queued.clear();
        names
    }

    pub fn get(&self, name: &str) -> Option<&QueuedStep> {
        self.queued.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.queued.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    /// Every queued step together with what it is still waiting on.
    ///
    /// Used to build deadlock diagnostics.
    pub fn stuck(&self) -> Vec<StuckStep> {
        self.queued
            .values()
            .map(|q| StuckStep {
                name: q.name.clone(),
                waiting_on: q.remaining.iter().cloned().collect(),
            })
            .collect()
    }
}
