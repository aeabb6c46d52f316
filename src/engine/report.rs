// src/engine/report.rs

use std::fmt;

use crate::dag::{FailureReason, Scheduler, StepState};
use crate::engine::{StepName, StepOutcome};
use crate::store::StepOutputs;
use crate::types::BackendKind;

/// Final result of a full pipeline run that was not aborted.
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Captured output of every completed step, keyed by step name.
    pub outputs: StepOutputs,
    pub succeeded: Vec<StepName>,
    pub failed: Vec<(StepName, FailureReason)>,
    /// Steps that never ran because an upstream step failed.
    pub blocked: Vec<StepName>,
    /// Admission batches in order; each inner list is one ADMITTING phase.
    pub admissions: Vec<Vec<StepName>>,
}

impl RunReport {
    pub fn from_scheduler(
        scheduler: &Scheduler,
        outputs: StepOutputs,
        admissions: Vec<Vec<StepName>>,
    ) -> Self {
        let failed = scheduler
            .steps_in(StepState::Failed)
            .into_iter()
            .map(|name| {
                let reason = scheduler
                    .failure_of(&name)
                    .cloned()
                    .unwrap_or(FailureReason::Exit(-1));
                (name, reason)
            })
            .collect();

        Self {
            outputs,
            succeeded: scheduler.steps_in(StepState::Succeeded),
            failed,
            blocked: scheduler.steps_in(StepState::Blocked),
            admissions,
        }
    }

    /// True when every step succeeded.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.blocked.is_empty()
    }

    pub fn output(&self, step: &str) -> Option<&[u8]> {
        self.outputs.get(step).map(|o| o.as_slice())
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "succeeded ({}):", self.succeeded.len())?;
        for name in self.succeeded.iter() {
            writeln!(f, "  - {name}")?;
        }
        if !self.failed.is_empty() {
            writeln!(f, "failed ({}):", self.failed.len())?;
            for (name, reason) in self.failed.iter() {
                writeln!(f, "  - {name}: {reason}")?;
            }
        }
        if !self.blocked.is_empty() {
            writeln!(f, "blocked ({}):", self.blocked.len())?;
            for name in self.blocked.iter() {
                writeln!(f, "  - {name}")?;
            }
        }
        Ok(())
    }
}

/// Result of an ad hoc single-step invocation.
#[derive(Debug, Clone)]
pub struct StepRun {
    pub step: StepName,
    pub backend: BackendKind,
    pub outcome: StepOutcome,
    pub output: Vec<u8>,
}

impl StepRun {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}
