// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet};

use crate::config::model::Pipeline;
use crate::engine::StepName;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct DagNode {
    /// Direct dependencies: steps that must complete before this one can run.
    deps: Vec<StepName>,
    /// Direct dependents: steps that depend on this one.
    dependents: Vec<StepName>,
}

/// Immutable adjacency view of the pipeline DAG keyed by step name.
///
/// Acyclicity is validated in `config::validate`; here we only keep the
/// topology for scheduling decisions and diagnostics. Iteration order is
/// sorted by name so every traversal is reproducible.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: BTreeMap<StepName, DagNode>,
}

impl DagGraph {
    /// Build a DAG from a [`Pipeline`].
    ///
    /// Dependencies on undeclared nodes are kept in `deps` (so they stay
    /// visible in diagnostics) but produce no dependent edge.
    pub fn from_pipeline(pipeline: &Pipeline) -> Self {
        let mut nodes: BTreeMap<StepName, DagNode> = BTreeMap::new();

        for entry in pipeline.dag.iter() {
            nodes.insert(
                entry.name.clone(),
                DagNode {
                    deps: entry.dependencies.clone(),
                    dependents: Vec::new(),
                },
            );
        }

        let edges: Vec<(StepName, StepName)> = nodes
            .iter()
            .flat_map(|(name, node)| node.deps.iter().map(move |d| (d.clone(), name.clone())))
            .collect();

        for (dep, dependent) in edges {
            if let Some(dep_node) = nodes.get_mut(&dep) {
                dep_node.dependents.push(dependent);
            }
        }

        Self { nodes }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Immediate dependencies of a step.
    pub fn dependencies_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a step.
    pub fn dependents_of(&self, name: &str) -> &[StepName] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Every step reachable downstream of `name`, excluding `name` itself.
    pub fn transitive_dependents(&self, name: &str) -> BTreeSet<StepName> {
        let mut stack: Vec<&str> = self.dependents_of(name).iter().map(|s| s.as_str()).collect();
        let mut seen = BTreeSet::new();

        while let Some(current) = stack.pop() {
            if !seen.insert(current.to_string()) {
                continue;
            }
            stack.extend(self.dependents_of(current).iter().map(|s| s.as_str()));
        }

        seen
    }
}
