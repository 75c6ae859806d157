use std::fmt;
use std::time::Duration;

use serde::Serialize;

use crate::errors::{StepError, WorkflowError};
use crate::state::StateSnapshot;

/// Top-level step a failure is attributed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepRef {
    pub index: usize,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PhaseStatus {
    Completed,
    TimedOut,
    Failed,
}

impl fmt::Display for PhaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::TimedOut => write!(f, "timed_out"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// How a phase ended.
#[derive(Debug, Clone, PartialEq)]
pub enum PhaseOutcome {
    Completed {
        snapshot: StateSnapshot,
    },
    /// The deadline fired. Writes of interrupted tasks were discarded.
    TimedOut {
        steps_completed: usize,
        total_steps: usize,
        snapshot: StateSnapshot,
    },
    Failed {
        error: StepError,
        step: StepRef,
    },
}

impl PhaseOutcome {
    pub fn status(&self) -> PhaseStatus {
        match self {
            Self::Completed { .. } => PhaseStatus::Completed,
            Self::TimedOut { .. } => PhaseStatus::TimedOut,
            Self::Failed { .. } => PhaseStatus::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn snapshot(&self) -> Option<&StateSnapshot> {
        match self {
            Self::Completed { snapshot } | Self::TimedOut { snapshot, .. } => Some(snapshot),
            Self::Failed { .. } => None,
        }
    }

    /// Convert into the caller-facing result for `phase`.
    pub fn into_result(self, phase: &str, deadline: Duration) -> Result<StateSnapshot, WorkflowError> {
        match self {
            Self::Completed { snapshot } => Ok(snapshot),
            Self::TimedOut {
                steps_completed,
                total_steps,
                ..
            } => Err(WorkflowError::PhaseTimedOut {
                phase: phase.to_string(),
                steps_completed,
                total_steps,
                timeout: deadline,
            }),
            Self::Failed { error, step } => Err(WorkflowError::PhaseFailed {
                phase: phase.to_string(),
                step: step.name,
                step_index: step.index,
                source: error,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_result() {
        let ok = PhaseOutcome::Completed {
            snapshot: StateSnapshot::default(),
        };
        assert!(ok.is_completed());
        assert!(ok.into_result("p", Duration::from_secs(1)).is_ok());

        let timed_out = PhaseOutcome::TimedOut {
            steps_completed: 1,
            total_steps: 3,
            snapshot: StateSnapshot::default(),
        };
        assert_eq!(timed_out.status(), PhaseStatus::TimedOut);
        match timed_out.into_result("p", Duration::from_secs(5)) {
            Err(WorkflowError::PhaseTimedOut {
                steps_completed: 1,
                total_steps: 3,
                timeout,
                ..
            }) => assert_eq!(timeout, Duration::from_secs(5)),
            other => panic!("unexpected {other:?}"),
        }

        let failed = PhaseOutcome::Failed {
            error: StepError::Cancelled { task: "x".into() },
            step: StepRef {
                index: 2,
                name: "region_analyzer".into(),
            },
        };
        assert!(failed.snapshot().is_none());
        match failed.into_result("p", Duration::from_secs(5)) {
            Err(WorkflowError::PhaseFailed { step, step_index, .. }) => {
                assert_eq!(step, "region_analyzer");
                assert_eq!(step_index, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
