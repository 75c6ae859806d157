//! A run: one end-to-end itinerary request with its state and event log.

use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::RunState;
use super::store::RunRecord;

/// What happened, from the orchestrator's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    PhaseStarted,
    PhaseCompleted,
    PhaseTimedOut,
    PhaseFailed,
    TaskStarted,
    TaskCompleted,
    TaskRetried,
    TaskFailed,
    CheckpointResolved,
}

/// One entry of a run's append-only event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    pub timestamp: DateTime<Utc>,
    pub author: String,
    pub kind: EventKind,
    #[serde(default)]
    pub text: String,
}

/// Append-only, shareable event log.
#[derive(Clone, Default)]
pub struct EventLog {
    inner: Arc<RwLock<Vec<RunEvent>>>,
}

impl EventLog {
    pub fn from_events(events: Vec<RunEvent>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(events)),
        }
    }

    pub fn push(&self, event: RunEvent) {
        self.inner
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> Vec<RunEvent> {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The last `n` events, oldest first.
    pub fn recent(&self, n: usize) -> Vec<RunEvent> {
        let events = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let start = events.len().saturating_sub(n);
        events[start..].to_vec()
    }
}

struct RunInner {
    id: Uuid,
    user_id: String,
    created_at: DateTime<Utc>,
    state: RunState,
    events: EventLog,
    phase: RwLock<Option<String>>,
}

/// Handle to a run. Cheap to clone; all clones observe the same run.
#[derive(Clone)]
pub struct Run {
    inner: Arc<RunInner>,
}

impl Run {
    pub fn new(user_id: impl Into<String>, state: RunState) -> Self {
        Self {
            inner: Arc::new(RunInner {
                id: Uuid::new_v4(),
                user_id: user_id.into(),
                created_at: Utc::now(),
                state,
                events: EventLog::default(),
                phase: RwLock::new(None),
            }),
        }
    }

    /// Rehydrate a run from a persisted record.
    pub fn from_record(record: RunRecord) -> Self {
        Self {
            inner: Arc::new(RunInner {
                id: record.run_id,
                user_id: record.user_id,
                created_at: record.created_at,
                state: RunState::with_values(record.state.into_inner()),
                events: EventLog::from_events(record.events),
                phase: RwLock::new(record.current_phase),
            }),
        }
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn user_id(&self) -> &str {
        &self.inner.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.inner.created_at
    }

    pub fn state(&self) -> &RunState {
        &self.inner.state
    }

    pub fn events(&self) -> &EventLog {
        &self.inner.events
    }

    pub fn current_phase(&self) -> Option<String> {
        self.inner
            .phase
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_phase(&self, phase: impl Into<String>) {
        *self.inner.phase.write().unwrap_or_else(PoisonError::into_inner) = Some(phase.into());
    }

    pub fn record(&self, author: &str, kind: EventKind, text: impl Into<String>) {
        self.inner.events.push(RunEvent {
            timestamp: Utc::now(),
            author: author.to_string(),
            kind,
            text: text.into(),
        });
    }

    /// Serializable copy of the run as it stands now.
    pub fn to_record(&self) -> RunRecord {
        RunRecord {
            run_id: self.id(),
            user_id: self.user_id().to_string(),
            created_at: self.created_at(),
            updated_at: Utc::now(),
            current_phase: self.current_phase(),
            state: self.state().snapshot(),
            events: self.events().snapshot(),
        }
    }
}

impl std::fmt::Debug for Run {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Run")
            .field("id", &self.id())
            .field("user_id", &self.user_id())
            .field("phase", &self.current_phase())
            .field("events", &self.events().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_run_is_blank() {
        let run = Run::new("user1", RunState::new());
        assert_eq!(run.user_id(), "user1");
        assert!(run.events().is_empty());
        assert_eq!(run.current_phase(), None);
    }

    #[test]
    fn test_record_appends_in_order() {
        let run = Run::new("user1", RunState::new());
        run.record("metadata_stage", EventKind::PhaseStarted, "");
        run.record("book_metadata_researcher", EventKind::TaskCompleted, "found it");
        let events = run.events().snapshot();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].kind, EventKind::PhaseStarted);
        assert_eq!(events[1].author, "book_metadata_researcher");
        assert_eq!(events[1].text, "found it");
    }

    #[test]
    fn test_recent_events() {
        let log = EventLog::default();
        for i in 0..5 {
            log.push(RunEvent {
                timestamp: Utc::now(),
                author: format!("task{i}"),
                kind: EventKind::TaskCompleted,
                text: String::new(),
            });
        }
        let recent = log.recent(2);
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].author, "task3");
        assert_eq!(recent[1].author, "task4");
        assert_eq!(log.recent(10).len(), 5);
    }

    #[test]
    fn test_record_round_trip_preserves_identity() {
        let run = Run::new("user1", RunState::with_values([("book_title", json!("Emma"))]));
        run.set_phase("discovery_stage");
        run.record("discovery_stage", EventKind::PhaseStarted, "");

        let restored = Run::from_record(run.to_record());
        assert_eq!(restored.id(), run.id());
        assert_eq!(restored.current_phase().as_deref(), Some("discovery_stage"));
        assert_eq!(restored.state().get("book_title"), Some(json!("Emma")));
        assert_eq!(restored.events().len(), 1);
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        let value = serde_json::to_value(EventKind::CheckpointResolved).unwrap();
        assert_eq!(value, json!("checkpoint_resolved"));
    }
}
