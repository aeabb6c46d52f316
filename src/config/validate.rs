// src/config/validate.rs

use std::collections::HashSet;
use std::sync::LazyLock;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use regex::Regex;

use crate::config::model::{Pipeline, RawPipelineFile};
use crate::errors::{CalxError, Result};
use crate::exec::BackendSelector;
use crate::types::BackendKind;

/// DAG node names double as file names in the scratch directory.
static NODE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]*$").expect("node name regex is valid")
});

impl TryFrom<RawPipelineFile> for Pipeline {
    type Error = CalxError;

    fn try_from(raw: RawPipelineFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_pipeline(&raw)?;
        Ok(Pipeline::new_unchecked(raw.config, raw.step, raw.dag))
    }
}

/// Run every structural check against an already-built pipeline.
pub fn validate_pipeline(pipeline: &Pipeline) -> Result<()> {
    let raw = RawPipelineFile {
        config: pipeline.config.clone(),
        step: pipeline.step.clone(),
        dag: pipeline.dag.clone(),
    };
    validate_raw_pipeline(&raw)
}

fn validate_raw_pipeline(raw: &RawPipelineFile) -> Result<()> {
    ensure_has_steps(raw)?;
    validate_global_config(raw)?;
    validate_node_names(raw)?;
    validate_step_references(raw)?;
    validate_dependencies(raw)?;
    validate_dag(raw)?;
    Ok(())
}

fn ensure_has_steps(raw: &RawPipelineFile) -> Result<()> {
    if raw.step.is_empty() {
        return Err(CalxError::ConfigError(
            "pipeline must contain at least one [step.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_global_config(raw: &RawPipelineFile) -> Result<()> {
    let cfg = &raw.config;

    if cfg.poll_interval_ms == 0 {
        return Err(CalxError::ConfigError(
            "[config].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if cfg.max_poll_interval_ms < cfg.poll_interval_ms {
        return Err(CalxError::ConfigError(format!(
            "[config].max_poll_interval_ms ({}) must be >= poll_interval_ms ({})",
            cfg.max_poll_interval_ms, cfg.poll_interval_ms
        )));
    }

    // Same routing as dispatch: a docker default alone needs no image when
    // every step is pinned elsewhere.
    let selector = BackendSelector::from_steps(&raw.step, cfg.backend);
    let wants_docker =
        selector.any_resolves_to(raw.step.keys().map(String::as_str), BackendKind::Docker);

    if wants_docker && cfg.docker_image.is_none() {
        return Err(CalxError::ConfigError(
            "[config].docker_image is required when a step runs on the docker backend"
                .to_string(),
        ));
    }

    Ok(())
}

/// Reject a DAG node name that cannot be used as a scratch file name.
pub fn check_node_name(name: &str) -> Result<()> {
    if NODE_NAME.is_match(name) {
        return Ok(());
    }
    Err(CalxError::ConfigError(format!(
        "dag node name '{name}' is invalid (allowed: letters, digits, '_', '-', '.')"
    )))
}

fn validate_node_names(raw: &RawPipelineFile) -> Result<()> {
    let mut seen = HashSet::new();

    for entry in raw.dag.iter() {
        check_node_name(&entry.name)?;
        if !seen.insert(entry.name.as_str()) {
            return Err(CalxError::ConfigError(format!(
                "dag node '{}' is declared more than once",
                entry.name
            )));
        }
    }

    Ok(())
}

fn validate_step_references(raw: &RawPipelineFile) -> Result<()> {
    for entry in raw.dag.iter() {
        if !raw.step.contains_key(&entry.step) {
            return Err(CalxError::StepNotFound(format!(
                "dag node '{}' references unknown step '{}'",
                entry.name, entry.step
            )));
        }
    }
    Ok(())
}

fn validate_dependencies(raw: &RawPipelineFile) -> Result<()> {
    let names: HashSet<&str> = raw.dag.iter().map(|e| e.name.as_str()).collect();

    for entry in raw.dag.iter() {
        for dep in entry.dependencies.iter() {
            if dep == &entry.name {
                return Err(CalxError::ConfigError(format!(
                    "dag node '{}' cannot depend on itself",
                    entry.name
                )));
            }
            if !names.contains(dep.as_str()) {
                return Err(CalxError::ConfigError(format!(
                    "dag node '{}' has unknown dependency '{}'",
                    entry.name, dep
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(raw: &RawPipelineFile) -> Result<()> {
    // Edge direction: dep -> node. For `B` with `dependencies = ["A"]` we add
    // edge A -> B.
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for entry in raw.dag.iter() {
        graph.add_node(entry.name.as_str());
    }

    for entry in raw.dag.iter() {
        for dep in entry.dependencies.iter() {
            graph.add_edge(dep.as_str(), entry.name.as_str(), ());
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => {
            let node = cycle.node_id();
            Err(CalxError::DagCycle(format!(
                "cycle detected in pipeline DAG involving step '{}'",
                node
            )))
        }
    }
}
