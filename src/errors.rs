//! Typed error hierarchy for the StoryLand orchestration core.
//!
//! - `ComposeError`: phase topology violations caught when a phase is built
//! - `BackendError`: classified generation-backend failures
//! - `CapabilityError`: failures of external capabilities (tools)
//! - `StepError`: a step that could not produce its output
//! - `CheckpointError`: the human selection gate could not proceed
//! - `WorkflowError`: run-level failures surfaced to the caller
//! - `ConfigError`: invalid or missing configuration

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Message shown when discovery produced nothing to choose from.
pub const NO_CANDIDATES_MESSAGE: &str = "No regions available to create an itinerary. \
The discovery phase did not find enough locations to group into travel regions. \
Try a different book or check the discovery results.";

/// Topology violations detected by the phase builder.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComposeError {
    #[error("Phase '{phase}' has no steps")]
    EmptyPhase { phase: String },

    #[error("Phase '{phase}' has a zero deadline")]
    ZeroDeadline { phase: String },

    #[error("Sequence '{sequence}' has no stages")]
    EmptySequence { sequence: String },

    #[error("Task '{task}' is declared more than once in phase '{phase}'")]
    DuplicateTask { phase: String, task: String },

    #[error("Fan-out group '{group}' needs at least 2 children, found {found}")]
    TooFewChildren { group: String, found: usize },

    #[error("Fan-out group '{group}': children '{first}' and '{second}' both write '{key}'")]
    OverlappingWrites {
        group: String,
        first: String,
        second: String,
        key: String,
    },
}

/// Failures reported by a generation backend.
///
/// Only `RateLimited` and `Overloaded` are transient; everything else fails
/// the step on the first occurrence.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum BackendError {
    #[error("Rate limited by generation backend (HTTP {status}): {message}")]
    RateLimited { status: u16, message: String },

    #[error("Generation backend overloaded (HTTP {status}): {message}")]
    Overloaded { status: u16, message: String },

    #[error("Generation backend rejected the request (HTTP {status}): {message}")]
    Permanent { status: u16, message: String },

    #[error("Invalid response from generation backend: {0}")]
    InvalidResponse(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Generation call exceeded {0:?}")]
    TaskTimeout(Duration),

    #[error("Generation call cancelled")]
    Cancelled,
}

impl BackendError {
    /// Classify an HTTP status returned by the backend.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::RateLimited { status, message },
            500 | 503 | 504 => Self::Overloaded { status, message },
            _ => Self::Permanent { status, message },
        }
    }

    /// Whether the retry wrapper should try again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RateLimited { .. } | Self::Overloaded { .. })
    }
}

/// Why a retried operation gave up.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RetryFailure {
    #[error("gave up after {attempts} attempt(s): {last}")]
    Exhausted { attempts: u32, last: BackendError },

    #[error(transparent)]
    Aborted(BackendError),
}

/// Failures of an external capability invoked on behalf of a task.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CapabilityError {
    #[error("Unknown capability '{0}'")]
    Unknown(String),

    #[error("Invalid arguments for '{name}': {message}")]
    InvalidArguments { name: String, message: String },

    #[error("Capability '{name}' request failed: {message}")]
    Request { name: String, message: String },

    #[error("Capability '{name}' cannot be called directly: {message}")]
    Unsupported { name: String, message: String },
}

/// A step that did not produce its output.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum StepError {
    #[error("Task '{task}' failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        task: String,
        attempts: u32,
        last: BackendError,
    },

    #[error("Task '{task}' failed: {source}")]
    Backend {
        task: String,
        #[source]
        source: BackendError,
    },

    #[error("Task '{task}' requires unknown capability '{capability}'")]
    UnknownCapability { task: String, capability: String },

    #[error("Task '{task}' was cancelled")]
    Cancelled { task: String },

    #[error("Fan-out group '{group}' lost a child: {message}")]
    Join { group: String, message: String },
}

impl StepError {
    /// Name of the task (or group) the error belongs to.
    pub fn task(&self) -> &str {
        match self {
            Self::RetriesExhausted { task, .. }
            | Self::Backend { task, .. }
            | Self::UnknownCapability { task, .. }
            | Self::Cancelled { task } => task,
            Self::Join { group, .. } => group,
        }
    }
}

/// Failures of the human selection checkpoint.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("{}", NO_CANDIDATES_MESSAGE)]
    NoCandidates,

    #[error("Failed to read selection: {0}")]
    Input(#[from] std::io::Error),
}

/// Invalid or missing configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{key} is not set. Add it to .env, storyland.toml or the environment")]
    Missing { key: String },

    #[error("Invalid value '{value}' for {key}: {reason}")]
    Invalid {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Failed to read config file at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Run-level failures returned by the itinerary workflow.
#[derive(Debug, Error)]
pub enum WorkflowError {
    #[error(
        "Phase '{phase}' exceeded its {timeout:?} deadline after {steps_completed}/{total_steps} steps. \
Consider increasing WORKFLOW_TIMEOUT (--timeout) or simplifying the request."
    )]
    PhaseTimedOut {
        phase: String,
        steps_completed: usize,
        total_steps: usize,
        timeout: Duration,
    },

    #[error("Phase '{phase}' failed at step {step_index} ('{step}'): {source}")]
    PhaseFailed {
        phase: String,
        step: String,
        step_index: usize,
        #[source]
        source: StepError,
    },

    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    #[error("Invalid workflow definition: {0}")]
    Compose(#[from] ComposeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Run store error: {0}")]
    Store(#[source] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(BackendError::from_status(429, "slow down").is_transient());
        assert!(BackendError::from_status(500, "oops").is_transient());
        assert!(BackendError::from_status(503, "busy").is_transient());
        assert!(BackendError::from_status(504, "gateway").is_transient());
        assert!(!BackendError::from_status(400, "bad").is_transient());
        assert!(!BackendError::from_status(403, "denied").is_transient());
        assert!(!BackendError::from_status(502, "bad gateway").is_transient());
    }

    #[test]
    fn test_non_http_errors_are_not_transient() {
        assert!(!BackendError::Transport("reset".into()).is_transient());
        assert!(!BackendError::InvalidResponse("garbage".into()).is_transient());
        assert!(!BackendError::Cancelled.is_transient());
        assert!(!BackendError::TaskTimeout(Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn test_no_candidates_message() {
        let msg = CheckpointError::NoCandidates.to_string();
        assert!(msg.starts_with("No regions available to create an itinerary."));
        assert!(msg.contains("Try a different book"));
    }

    #[test]
    fn test_timeout_message_mentions_progress() {
        let err = WorkflowError::PhaseTimedOut {
            phase: "discovery_stage".into(),
            steps_completed: 2,
            total_steps: 4,
            timeout: Duration::from_secs(300),
        };
        let msg = err.to_string();
        assert!(msg.contains("discovery_stage"));
        assert!(msg.contains("2/4"));
        assert!(msg.contains("WORKFLOW_TIMEOUT"));
    }

    #[test]
    fn test_step_error_task_name() {
        let err = StepError::Cancelled {
            task: "city_pipeline".into(),
        };
        assert_eq!(err.task(), "city_pipeline");
        let err = StepError::Join {
            group: "parallel_discovery".into(),
            message: "panicked".into(),
        };
        assert_eq!(err.task(), "parallel_discovery");
    }
}
