// src/exec/backend.rs

//! Backend routing for steps.
//!
//! The run-wide default backend can be overridden per step. Overrides are
//! resolved once, when the selector is built from the pipeline, so dispatch
//! never has to re-inspect step configuration:
//!
//! 1. `type = "docker"` steps always run on the local backend (they drive
//!    docker themselves).
//! 2. An explicit `backend = "..."` on the step wins next.
//! 3. Everything else uses the run-wide default.

use std::collections::BTreeMap;

use tracing::debug;

use crate::config::model::{Pipeline, StepConfig};
use crate::types::{BackendKind, StepKind};

/// Maps `[step.*]` names to the backend their runners are bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSelector {
    default: BackendKind,
    overrides: BTreeMap<String, BackendKind>,
}

impl BackendSelector {
    /// Selector with no overrides.
    pub fn new(default: BackendKind) -> Self {
        Self {
            default,
            overrides: BTreeMap::new(),
        }
    }

    /// Resolve every per-step override declared in the pipeline.
    pub fn from_pipeline(pipeline: &Pipeline, default: BackendKind) -> Self {
        Self::from_steps(&pipeline.step, default)
    }

    /// Same as [`from_pipeline`](Self::from_pipeline), for the bare
    /// `[step.*]` table.
    pub fn from_steps(steps: &BTreeMap<String, StepConfig>, default: BackendKind) -> Self {
        let mut selector = Self::new(default);

        for (name, cfg) in steps.iter() {
            let pinned = match (cfg.kind, cfg.backend) {
                (StepKind::Docker, _) => Some(BackendKind::Local),
                (StepKind::Shell, explicit) => explicit,
            };

            if let Some(backend) = pinned {
                if backend != default {
                    debug!(step = %name, %backend, "backend override");
                }
                selector.overrides.insert(name.clone(), backend);
            }
        }

        selector
    }

    pub fn with_override(mut self, step: impl Into<String>, backend: BackendKind) -> Self {
        self.overrides.insert(step.into(), backend);
        self
    }

    pub fn default_backend(&self) -> BackendKind {
        self.default
    }

    /// Backend for the `[step.<name>]` configuration.
    pub fn resolve(&self, step: &str) -> BackendKind {
        self.overrides.get(step).copied().unwrap_or(self.default)
    }

    /// Whether any of the given step configurations resolves to `backend`.
    pub fn any_resolves_to<'a>(
        &self,
        steps: impl IntoIterator<Item = &'a str>,
        backend: BackendKind,
    ) -> bool {
        steps.into_iter().any(|s| self.resolve(s) == backend)
    }
}
