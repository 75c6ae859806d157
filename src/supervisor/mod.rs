//! Phase supervisor: runs a phase's steps in order under one deadline.
//!
//! Each phase gets a child cancellation token. When the deadline fires the
//! token is cancelled, in-flight tasks are dropped before they commit, and the
//! phase reports `TimedOut` with the number of top-level steps that finished.

mod events;
mod outcome;
mod runner;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

pub use events::{EventSink, WorkflowEvent};
pub use outcome::{PhaseOutcome, PhaseStatus, StepRef};

use crate::backend::GenerationBackend;
use crate::capability::CapabilityRegistry;
use crate::compose::Phase;
use crate::config::Config;
use crate::errors::StepError;
use crate::retry::RetryPolicy;
use crate::state::{EventKind, Run};
use runner::StageRunner;

pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub retry: RetryPolicy,
    /// Ceiling for a single generation call.
    pub task_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            task_timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}

impl SupervisorConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            retry: config.retry_policy(),
            task_timeout: config.task_timeout(),
        }
    }
}

pub struct PhaseSupervisor {
    config: SupervisorConfig,
    backend: Arc<dyn GenerationBackend>,
    capabilities: CapabilityRegistry,
    events: EventSink,
    cancel: CancellationToken,
}

impl PhaseSupervisor {
    pub fn new(
        config: SupervisorConfig,
        backend: Arc<dyn GenerationBackend>,
        capabilities: CapabilityRegistry,
    ) -> Self {
        Self {
            config,
            backend,
            capabilities,
            events: EventSink::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_event_channel(mut self, tx: mpsc::Sender<WorkflowEvent>) -> Self {
        self.events = EventSink::new(tx);
        self
    }

    /// Parent token for every phase; cancelling it stops the current phase.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    /// Run `phase` against `run`, giving up after `deadline`.
    #[instrument(
        name = "phase",
        skip_all,
        fields(phase = %phase.name(), run_id = %run.id())
    )]
    pub async fn run_phase(&self, phase: &Phase, run: &Run, deadline: Duration) -> PhaseOutcome {
        let total_steps = phase.step_count();
        let cancel = self.cancel.child_token();
        let runner = StageRunner {
            backend: self.backend.clone(),
            capabilities: self.capabilities.clone(),
            config: self.config.clone(),
            run: run.clone(),
            cancel: cancel.clone(),
            events: self.events.clone(),
        };

        run.set_phase(phase.name());
        run.record(phase.name(), EventKind::PhaseStarted, "");
        self.events.emit(WorkflowEvent::PhaseStarted {
            phase: phase.name().to_string(),
            total_steps,
            deadline_ms: deadline.as_millis() as u64,
        });
        info!(total_steps, deadline_ms = deadline.as_millis() as u64, "phase_started");

        let completed = AtomicUsize::new(0);
        let steps = async {
            for (index, step) in phase.steps().iter().enumerate() {
                self.events.emit(WorkflowEvent::StepStarted {
                    phase: phase.name().to_string(),
                    index,
                    step: step.name().to_string(),
                });
                runner.run_stage(step).await.map_err(|e| (index, e))?;
                completed.fetch_add(1, Ordering::SeqCst);
                self.events.emit(WorkflowEvent::StepCompleted {
                    phase: phase.name().to_string(),
                    index,
                    step: step.name().to_string(),
                });
            }
            Ok::<(), (usize, StepError)>(())
        };

        let outcome = tokio::select! {
            biased;
            _ = tokio::time::sleep(deadline) => {
                cancel.cancel();
                PhaseOutcome::TimedOut {
                    steps_completed: completed.load(Ordering::SeqCst),
                    total_steps,
                    snapshot: run.state().snapshot(),
                }
            }
            _ = cancel.cancelled() => {
                PhaseOutcome::TimedOut {
                    steps_completed: completed.load(Ordering::SeqCst),
                    total_steps,
                    snapshot: run.state().snapshot(),
                }
            }
            result = steps => match result {
                Ok(()) => PhaseOutcome::Completed { snapshot: run.state().snapshot() },
                Err((index, error)) => {
                    cancel.cancel();
                    PhaseOutcome::Failed {
                        step: StepRef { index, name: phase.steps()[index].name().to_string() },
                        error,
                    }
                }
            }
        };

        self.finish(phase, run, &outcome);
        outcome
    }

    fn finish(&self, phase: &Phase, run: &Run, outcome: &PhaseOutcome) {
        let steps_completed = match outcome {
            PhaseOutcome::Completed { .. } => phase.step_count(),
            PhaseOutcome::TimedOut {
                steps_completed, ..
            } => *steps_completed,
            PhaseOutcome::Failed { step, .. } => step.index,
        };

        match outcome {
            PhaseOutcome::Completed { .. } => {
                info!("phase_completed");
                run.record(phase.name(), EventKind::PhaseCompleted, "");
            }
            PhaseOutcome::TimedOut { total_steps, .. } => {
                warn!(steps_completed, total_steps, "phase_timed_out");
                run.record(
                    phase.name(),
                    EventKind::PhaseTimedOut,
                    format!("{steps_completed}/{total_steps} steps completed"),
                );
            }
            PhaseOutcome::Failed { error, step } => {
                error!(step = %step.name, step_index = step.index, error = %error, "phase_failed");
                run.record(phase.name(), EventKind::PhaseFailed, error.to_string());
            }
        }

        self.events.emit(WorkflowEvent::PhaseFinished {
            phase: phase.name().to_string(),
            status: outcome.status(),
            steps_completed,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ScriptedBackend;
    use crate::compose::{FanOutGroup, OutputShape, PhaseBuilder, Sequence, TaskDescriptor};
    use crate::errors::BackendError;
    use crate::logging::capture::LogCapture;
    use crate::models::CityDiscovery;
    use crate::state::{RunState, StateSnapshot};
    use serde_json::json;

    fn fast_config() -> SupervisorConfig {
        SupervisorConfig {
            retry: RetryPolicy {
                attempts: 3,
                initial_delay: Duration::from_millis(10),
                exp_base: 2.0,
                max_delay: Duration::from_millis(100),
            },
            task_timeout: Duration::from_secs(30),
        }
    }

    fn supervisor(backend: ScriptedBackend) -> (PhaseSupervisor, Arc<ScriptedBackend>) {
        let backend = backend.into_shared();
        let sup = PhaseSupervisor::new(fast_config(), backend.clone(), CapabilityRegistry::new());
        (sup, backend)
    }

    fn task(name: &str) -> TaskDescriptor {
        TaskDescriptor::new(name, format!("run {name}"))
    }

    #[tokio::test]
    async fn test_sequence_sees_earlier_writes() {
        let (sup, backend) = supervisor(
            ScriptedBackend::new()
                .reply_text("researcher", "notes about the book")
                .reply_json("formatter", json!({"title": "1984", "author": "George Orwell"})),
        );
        let phase = PhaseBuilder::new("p")
            .task(task("researcher"))
            .task(task("formatter").reads(["researcher"]).writes("book_metadata"))
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(5)).await;
        let snapshot = outcome.snapshot().unwrap().clone();
        assert!(outcome.is_completed());
        assert_eq!(snapshot.get("researcher"), Some(&json!("notes about the book")));
        assert_eq!(snapshot.get("book_metadata").unwrap()["author"], json!("George Orwell"));

        let request = backend.last_request("formatter").unwrap();
        assert_eq!(request.inputs["researcher"], json!("notes about the book"));
        assert_eq!(run.current_phase().as_deref(), Some("p"));
    }

    #[tokio::test]
    async fn test_invalid_shaped_output_stores_empty_value() {
        let (sup, _) = supervisor(ScriptedBackend::new().reply_text("cities", "Sorry, no idea."));
        let phase = PhaseBuilder::new("p")
            .task(task("cities").shape(OutputShape::of::<CityDiscovery>("CityDiscovery")))
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(5)).await;
        assert!(outcome.is_completed());
        assert_eq!(run.state().get("cities"), Some(json!({"cities": []})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_times_out_and_discards_in_flight_write() {
        let (sup, _) = supervisor(
            ScriptedBackend::new()
                .reply_text("first", "done")
                .latency("second", Duration::from_secs(60))
                .reply_text("second", "too late"),
        );
        let phase = PhaseBuilder::new("p")
            .task(task("first"))
            .task(task("second"))
            .task(task("third"))
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(10)).await;
        match outcome {
            PhaseOutcome::TimedOut {
                steps_completed,
                total_steps,
                snapshot,
            } => {
                assert_eq!(steps_completed, 1);
                assert_eq!(total_steps, 3);
                assert!(snapshot.contains("first"));
                assert!(!snapshot.contains("second"));
            }
            other => panic!("expected timeout, got {other:?}"),
        }

        // Give any stray task a chance to run; nothing may land late.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(!run.state().contains("second"));
        assert!(!run.state().contains("third"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_deadline_runs_nothing() {
        let (sup, backend) = supervisor(ScriptedBackend::new().reply_text("only", "x"));
        let phase = PhaseBuilder::new("p").task(task("only")).build().unwrap();
        let run = Run::new("user1", RunState::with_values([("seed", json!(1))]));
        let before = run.state().snapshot();

        let outcome = sup.run_phase(&phase, &run, Duration::ZERO).await;
        match outcome {
            PhaseOutcome::TimedOut {
                steps_completed,
                snapshot,
                ..
            } => {
                assert_eq!(steps_completed, 0);
                assert_eq!(snapshot, before);
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert_eq!(backend.calls("only"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let (sup, backend) = supervisor(
            ScriptedBackend::new()
                .fail("flaky", BackendError::from_status(429, "quota"))
                .fail("flaky", BackendError::from_status(503, "busy"))
                .reply_text("flaky", "finally"),
        );
        let phase = PhaseBuilder::new("p").task(task("flaky")).build().unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(60)).await;
        assert!(outcome.is_completed());
        assert_eq!(backend.calls("flaky"), 3);
        let retried = run
            .events()
            .snapshot()
            .iter()
            .filter(|e| e.kind == EventKind::TaskRetried)
            .count();
        assert_eq!(retried, 2);
    }

    #[tokio::test]
    async fn test_permanent_failure_skips_later_steps() {
        let (sup, backend) = supervisor(
            ScriptedBackend::new().fail("broken", BackendError::from_status(400, "bad request")),
        );
        let phase = PhaseBuilder::new("p")
            .task(task("broken"))
            .task(task("after"))
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(5)).await;
        match outcome {
            PhaseOutcome::Failed { error, step } => {
                assert_eq!(step, StepRef { index: 0, name: "broken".into() });
                assert!(matches!(error, StepError::Backend { .. }));
            }
            other => panic!("expected failure, got {other:?}"),
        }
        assert_eq!(backend.calls("broken"), 1);
        assert_eq!(backend.calls("after"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_fail_the_phase() {
        let mut backend = ScriptedBackend::new();
        for _ in 0..3 {
            backend = backend.fail("flaky", BackendError::from_status(503, "busy"));
        }
        let (sup, _) = supervisor(backend);
        let phase = PhaseBuilder::new("p").task(task("flaky")).build().unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(60)).await;
        assert!(matches!(
            outcome,
            PhaseOutcome::Failed {
                error: StepError::RetriesExhausted { attempts: 3, .. },
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_children_run_concurrently() {
        let (sup, _) = supervisor(
            ScriptedBackend::new()
                .default_latency(Duration::from_secs(4))
                .reply_text("a", "A")
                .reply_text("b1", "B1")
                .reply_text("b2", "B2")
                .reply_text("c", "C"),
        );
        let phase = PhaseBuilder::new("p")
            .fan_out(
                FanOutGroup::new("group")
                    .child(task("a"))
                    .child(Sequence::new("b").then(task("b1")).then(task("b2").reads(["b1"])))
                    .child(task("c")),
            )
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let started = tokio::time::Instant::now();
        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(10)).await;
        assert!(outcome.is_completed(), "{outcome:?}");
        // Longest child is two sequential 4s calls.
        assert!(started.elapsed() < Duration::from_secs(10));
        for key in ["a", "b1", "b2", "c"] {
            assert!(run.state().contains(key), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_fan_out_reports_first_failure_in_declaration_order() {
        let (sup, _) = supervisor(
            ScriptedBackend::new()
                .reply_text("ok", "fine")
                .fail("bad1", BackendError::from_status(400, "first"))
                .fail("bad2", BackendError::from_status(403, "second")),
        );
        let phase = PhaseBuilder::new("p")
            .fan_out(
                FanOutGroup::new("group")
                    .child(task("ok"))
                    .child(task("bad1"))
                    .child(task("bad2")),
            )
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(5)).await;
        match outcome {
            PhaseOutcome::Failed { error, step } => {
                assert_eq!(error.task(), "bad1");
                assert_eq!(step.name, "group");
            }
            other => panic!("expected failure, got {other:?}"),
        }
        // The healthy sibling finished and committed.
        assert!(run.state().contains("ok"));
    }

    #[tokio::test]
    async fn test_unknown_capability_fails_step() {
        let (sup, _) = supervisor(ScriptedBackend::new());
        let phase = PhaseBuilder::new("p")
            .task(task("searcher").capability("google_search"))
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(5)).await;
        assert!(matches!(
            outcome,
            PhaseOutcome::Failed {
                error: StepError::UnknownCapability { .. },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let (tx, mut rx) = mpsc::channel(64);
        let (sup, _) = supervisor(ScriptedBackend::new().reply_text("only", "x"));
        let sup = sup.with_event_channel(tx);
        let phase = PhaseBuilder::new("p").task(task("only")).build().unwrap();
        let run = Run::new("user1", RunState::new());

        sup.run_phase(&phase, &run, Duration::from_secs(5)).await;
        drop(sup);

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert!(matches!(events.first(), Some(WorkflowEvent::PhaseStarted { total_steps: 1, .. })));
        assert!(matches!(
            events.last(),
            Some(WorkflowEvent::PhaseFinished {
                status: PhaseStatus::Completed,
                steps_completed: 1,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_steps_run_in_declaration_order() {
        let (sup, backend) = supervisor(ScriptedBackend::new());
        let phase = PhaseBuilder::new("p")
            .task(task("first"))
            .sequence(Sequence::new("pipe").then(task("research")).then(task("format")))
            .task(task("last"))
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        assert!(sup.run_phase(&phase, &run, Duration::from_secs(5)).await.is_completed());
        let order: Vec<String> = backend.requests().into_iter().map(|r| r.task).collect();
        assert_eq!(order, ["first", "research", "format", "last"]);
    }

    /// Disjoint children whose latencies make them finish out of order.
    fn discovery_children() -> Vec<Sequence> {
        vec![
            task("a").into(),
            Sequence::new("b").then(task("b1")).then(task("b2").reads(["b1"])),
            task("c").into(),
        ]
    }

    fn discovery_backend() -> ScriptedBackend {
        ScriptedBackend::new()
            .latency("a", Duration::from_secs(3))
            .latency("b1", Duration::from_secs(1))
            .latency("c", Duration::from_millis(500))
            .reply_text("a", "A")
            .reply_text("b1", "B1")
            .reply_json("b2", json!({"from": "B2"}))
            .reply_text("c", "C")
    }

    async fn snapshot_of(phase: Phase) -> StateSnapshot {
        let (sup, _) = supervisor(discovery_backend());
        let run = Run::new("user1", RunState::with_values([("seed", json!(1))]));
        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(60)).await;
        assert!(outcome.is_completed(), "{outcome:?}");
        outcome.snapshot().unwrap().clone()
    }

    #[tokio::test(start_paused = true)]
    async fn test_fan_out_matches_every_serial_order() {
        let group = discovery_children()
            .into_iter()
            .fold(FanOutGroup::new("group"), FanOutGroup::child);
        let concurrent = snapshot_of(PhaseBuilder::new("p").fan_out(group).build().unwrap()).await;
        assert_eq!(concurrent.len(), 5);

        let orders = [[0, 1, 2], [0, 2, 1], [1, 0, 2], [1, 2, 0], [2, 0, 1], [2, 1, 0]];
        for order in orders {
            let children = discovery_children();
            let phase = order
                .iter()
                .fold(PhaseBuilder::new("p"), |builder, &i| {
                    builder.sequence(children[i].clone())
                })
                .build()
                .unwrap();
            assert_eq!(snapshot_of(phase).await, concurrent, "serial order {order:?}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_parent_stops_phase_with_partial_state() {
        let parent = CancellationToken::new();
        let (sup, backend) = supervisor(
            ScriptedBackend::new()
                .reply_text("first", "done")
                .latency("second", Duration::from_secs(60))
                .reply_text("second", "never"),
        );
        let sup = sup.with_cancellation(parent.clone());
        let phase = PhaseBuilder::new("p")
            .task(task("first"))
            .task(task("second"))
            .build()
            .unwrap();
        let run = Run::new("user1", RunState::new());

        let interrupt = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            parent.cancel();
        });
        let outcome = sup.run_phase(&phase, &run, Duration::from_secs(300)).await;
        interrupt.await.unwrap();

        match outcome {
            PhaseOutcome::TimedOut {
                steps_completed,
                total_steps,
                snapshot,
            } => {
                assert_eq!((steps_completed, total_steps), (1, 2));
                assert_eq!(snapshot.get("first"), Some(&json!("done")));
                assert!(!snapshot.contains("second"));
            }
            other => panic!("expected an interrupted phase, got {other:?}"),
        }
        assert_eq!(backend.calls("second"), 1);
        assert!(
            run.events()
                .snapshot()
                .iter()
                .any(|e| e.kind == EventKind::PhaseTimedOut)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_timing_and_model_errors_are_logged() {
        let (logs, _guard) = LogCapture::install();
        let (sup, _) = supervisor(
            ScriptedBackend::new()
                .latency("slow", Duration::from_millis(250))
                .fail("slow", BackendError::from_status(503, "busy"))
                .reply_text("slow", "ok"),
        );
        let phase = PhaseBuilder::new("p").task(task("slow")).build().unwrap();
        let run = Run::new("user1", RunState::new());

        assert!(sup.run_phase(&phase, &run, Duration::from_secs(5)).await.is_completed());

        let started = logs.named("agent_started");
        assert_eq!(started.len(), 1);
        assert_eq!(started[0]["task"], "slow");

        let errors = logs.named("model_error");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0]["transient"], true);
        assert_eq!(errors[0]["backend"], "scripted");

        // Two 250ms calls around a 10ms backoff.
        let completed = logs.named("agent_completed");
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0]["key"], "slow");
        assert!(completed[0]["duration_ms"].as_u64().unwrap() >= 510);
    }
}
