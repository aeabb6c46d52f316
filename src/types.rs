use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// What the scheduler does once a step fails (non-success exit or launch error).
///
/// - `FailFast`: abandon every queued step, terminate active runs and report
///   the failure (default behaviour).
/// - `BestEffort`: mark the failed step's transitive dependents as permanently
///   blocked and keep scheduling every unaffected branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailurePolicy {
    #[default]
    FailFast,
    BestEffort,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('_', "-").as_str() {
            "fail-fast" => Ok(FailurePolicy::FailFast),
            "best-effort" => Ok(FailurePolicy::BestEffort),
            other => Err(format!(
                "invalid policy: {other} (expected \"fail-fast\" or \"best-effort\")"
            )),
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePolicy::FailFast => f.write_str("fail-fast"),
            FailurePolicy::BestEffort => f.write_str("best-effort"),
        }
    }
}

/// Execution backend a runner is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Plain child process in the working directory.
    #[default]
    Local,
    /// `docker run` with the working directory mounted at `/usr/src/app`.
    Docker,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "docker" => Ok(BackendKind::Docker),
            other => Err(format!(
                "invalid backend: {other} (expected \"local\" or \"docker\")"
            )),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Local => f.write_str("local"),
            BackendKind::Docker => f.write_str("docker"),
        }
    }
}

/// Kind of a `[step.<name>]` definition (`type = "..."` in TOML).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    #[default]
    Shell,
    /// The step drives docker itself, so it must never be nested inside the
    /// docker backend.
    Docker,
}
