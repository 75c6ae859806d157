//! Progress events streamed to observers (terminal UI, dev server).

use serde::Serialize;
use tokio::sync::mpsc;

use super::outcome::PhaseStatus;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    PhaseStarted {
        phase: String,
        total_steps: usize,
        deadline_ms: u64,
    },
    StepStarted {
        phase: String,
        index: usize,
        step: String,
    },
    StepCompleted {
        phase: String,
        index: usize,
        step: String,
    },
    TaskStarted {
        task: String,
    },
    TaskRetrying {
        task: String,
        attempt: u32,
        delay_ms: u64,
    },
    TaskCompleted {
        task: String,
        key: String,
        defaulted: bool,
    },
    TaskFailed {
        task: String,
        error: String,
    },
    PhaseFinished {
        phase: String,
        status: PhaseStatus,
        steps_completed: usize,
    },
    CheckpointResolved {
        selected: Vec<u32>,
    },
}

/// Best-effort event publisher. Events are dropped when nobody listens or
/// the channel is full, so observers never slow a phase down.
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<WorkflowEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<WorkflowEvent>) -> Self {
        Self { tx: Some(tx) }
    }

    pub fn emit(&self, event: WorkflowEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}
