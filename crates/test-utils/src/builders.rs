#![allow(dead_code)]

use std::collections::BTreeMap;

use calx::config::{ConfigSection, DagEntry, Pipeline, RawPipelineFile, StepConfig};
use calx::errors::Result;
use calx::types::{BackendKind, FailurePolicy, StepKind};

/// Builder for `Pipeline` to simplify test setup.
pub struct PipelineBuilder {
    raw: RawPipelineFile,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self {
            raw: RawPipelineFile {
                config: ConfigSection::default(),
                step: BTreeMap::new(),
                dag: Vec::new(),
            },
        }
    }

    pub fn with_step(mut self, name: &str, step: StepConfig) -> Self {
        self.raw.step.insert(name.to_string(), step);
        self
    }

    /// Add a DAG node executing `[step.<step>]`.
    pub fn with_node(mut self, name: &str, step: &str, deps: &[&str]) -> Self {
        self.raw.dag.push(DagEntry {
            name: name.to_string(),
            step: step.to_string(),
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
        });
        self
    }

    /// Shorthand: a node plus a same-named `echo <name>` step config.
    pub fn node(self, name: &str, deps: &[&str]) -> Self {
        let with_cfg = if self.raw.step.contains_key(name) {
            self
        } else {
            let cmd = format!("echo {name}");
            self.with_step(name, StepConfigBuilder::new(&cmd).build())
        };
        with_cfg.with_node(name, name, deps)
    }

    pub fn policy(mut self, policy: FailurePolicy) -> Self {
        self.raw.config.policy = policy;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.raw.config.backend = backend;
        self
    }

    pub fn docker_image(mut self, image: &str) -> Self {
        self.raw.config.docker_image = Some(image.to_string());
        self
    }

    pub fn poll_interval_ms(mut self, initial: u64, max: u64) -> Self {
        self.raw.config.poll_interval_ms = initial;
        self.raw.config.max_poll_interval_ms = max;
        self
    }

    pub fn try_build(self) -> Result<Pipeline> {
        Pipeline::try_from(self.raw)
    }

    pub fn build(self) -> Pipeline {
        self.try_build()
            .expect("Failed to build valid pipeline from builder")
    }

    /// Skip validation, for tests that need a broken graph.
    pub fn build_unchecked(self) -> Pipeline {
        Pipeline::new_unchecked(self.raw.config, self.raw.step, self.raw.dag)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `StepConfig`.
pub struct StepConfigBuilder {
    step: StepConfig,
}

impl StepConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            step: StepConfig::shell(cmd),
        }
    }

    pub fn kind(mut self, kind: StepKind) -> Self {
        self.step.kind = kind;
        self
    }

    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.step.backend = Some(backend);
        self
    }

    pub fn envfile(mut self, path: &str) -> Self {
        self.step.envfile = Some(path.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.step.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn output(mut self, path: &str) -> Self {
        self.step.output = Some(path.to_string());
        self
    }

    pub fn build(self) -> StepConfig {
        self.step
    }
}
