// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::{BackendKind, FailurePolicy, StepKind};

/// Top-level pipeline definition as read from a TOML file.
///
/// ```toml
/// [config]
/// policy = "best-effort"
/// backend = "local"
///
/// [step.build]
/// cmd = "make build"
///
/// [[dag]]
/// name = "A"
/// step = "build"
/// dependencies = []
/// ```
///
/// This is the raw, unvalidated shape. Use [`Pipeline`] (via
/// `Pipeline::try_from`) everywhere else.
#[derive(Debug, Clone, Deserialize)]
pub struct RawPipelineFile {
    /// Run-wide behaviour from `[config]`.
    #[serde(default)]
    pub config: ConfigSection,

    /// Execution configurations from `[step.<name>]`, keyed by name.
    #[serde(default)]
    pub step: BTreeMap<String, StepConfig>,

    /// DAG nodes from `[[dag]]`, in declaration order.
    #[serde(default)]
    pub dag: Vec<DagEntry>,
}

/// Validated pipeline definition.
///
/// Construction through `TryFrom<RawPipelineFile>` guarantees:
/// - every DAG node references an existing `[step.*]`
/// - every dependency names a declared DAG node
/// - the dependency graph is acyclic
#[derive(Debug, Clone)]
pub struct Pipeline {
    pub config: ConfigSection,
    pub step: BTreeMap<String, StepConfig>,
    pub dag: Vec<DagEntry>,
}

impl Pipeline {
    /// Build a pipeline without running validation.
    ///
    /// Intended for tests that need a deliberately broken graph.
    pub fn new_unchecked(
        config: ConfigSection,
        step: BTreeMap<String, StepConfig>,
        dag: Vec<DagEntry>,
    ) -> Self {
        Self { config, step, dag }
    }

    /// Look up the DAG node with the given name.
    pub fn node(&self, name: &str) -> Option<&DagEntry> {
        self.dag.iter().find(|entry| entry.name == name)
    }

    /// Execution configuration referenced by a DAG node.
    pub fn step_config_of(&self, node: &DagEntry) -> Option<&StepConfig> {
        self.step.get(&node.step)
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// `"fail-fast"` (default) or `"best-effort"`.
    #[serde(default)]
    pub policy: FailurePolicy,

    /// Run-wide default backend; the CLI `--backend` flag takes precedence.
    #[serde(default)]
    pub backend: BackendKind,

    /// Image used by the docker backend.
    #[serde(default)]
    pub docker_image: Option<String>,

    /// First sleep taken after a polling sweep with no completions.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Ceiling for the poll backoff.
    #[serde(default = "default_max_poll_interval_ms")]
    pub max_poll_interval_ms: u64,

    /// How long to wait for a runner to acknowledge termination.
    #[serde(default = "default_terminate_timeout_ms")]
    pub terminate_timeout_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    20
}

fn default_max_poll_interval_ms() -> u64 {
    500
}

fn default_terminate_timeout_ms() -> u64 {
    5_000
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            policy: FailurePolicy::default(),
            backend: BackendKind::default(),
            docker_image: None,
            poll_interval_ms: default_poll_interval_ms(),
            max_poll_interval_ms: default_max_poll_interval_ms(),
            terminate_timeout_ms: default_terminate_timeout_ms(),
        }
    }
}

/// `[step.<name>]` section: how to execute a step. Opaque to the scheduler.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StepConfig {
    /// Shell command to execute.
    pub cmd: String,

    /// `type = "shell" | "docker"`.
    #[serde(default, rename = "type")]
    pub kind: StepKind,

    /// Explicit backend for this step, overriding the run-wide default.
    #[serde(default)]
    pub backend: Option<BackendKind>,

    /// `KEY=VALUE` file, relative to the working directory.
    #[serde(default)]
    pub envfile: Option<String>,

    /// Inline environment, applied after `envfile`.
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// File (relative to the working directory) the step writes its result
    /// to. When unset, stdout is the captured output.
    #[serde(default)]
    pub output: Option<String>,
}

impl StepConfig {
    /// Plain shell step with everything else defaulted.
    pub fn shell(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            kind: StepKind::Shell,
            backend: None,
            envfile: None,
            env: BTreeMap::new(),
            output: None,
        }
    }
}

/// `[[dag]]` entry: one node of the pipeline DAG.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DagEntry {
    /// Unique node name; also the key of its captured output.
    pub name: String,

    /// Name of the `[step.*]` configuration this node executes.
    pub step: String,

    /// Nodes that must complete before this one may start.
    #[serde(default)]
    pub dependencies: Vec<String>,
}
