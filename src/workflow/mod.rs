//! The StoryLand itinerary workflow.
//!
//! Three automated phases run under a shared timeout budget with a human
//! checkpoint between discovery and composition. The run is persisted after
//! every phase so a failed or timed-out run can still be inspected.

mod instructions;
mod phases;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub use phases::{
    COMPOSITION_STAGE, DISCOVERY_STAGE, METADATA_STAGE, PhaseDeadlines, composition_stage,
    discovery_stage, metadata_stage,
};

use crate::checkpoint::{Candidate, CheckpointGate, CheckpointPolicy, SelectionInput};
use crate::compose::Phase;
use crate::config::Config;
use crate::errors::{CheckpointError, WorkflowError};
use crate::models::{
    BookMetadata, RegionAnalysis, TravelPreferences, TravelRegion, TripItinerary, union_cities,
};
use crate::state::{ContextBudget, ContextStats, EventKind, Run, RunRecord, RunState, RunStore};
use crate::supervisor::{PhaseSupervisor, WorkflowEvent};

/// State keys shared by the workflow's tasks.
pub mod keys {
    pub const BOOK_TITLE: &str = "book_title";
    pub const AUTHOR: &str = "author";
    pub const USER_PREFERENCES: &str = crate::tools::PREFERENCES_KEY;
    pub const BOOK_METADATA: &str = "book_metadata";
    pub const BOOK_CONTEXT: &str = "book_context";
    pub const READER_PROFILE: &str = "reader_profile";
    pub const CITY_DISCOVERY: &str = "city_discovery";
    pub const LANDMARK_DISCOVERY: &str = "landmark_discovery";
    pub const AUTHOR_SITES: &str = "author_sites";
    pub const REGION_ANALYSIS: &str = "region_analysis";
    pub const SELECTED_REGIONS: &str = "selected_regions";
    pub const SELECTED_CITIES: &str = "selected_cities";
    pub const FINAL_ITINERARY: &str = "final_itinerary";
}

pub const DEFAULT_WORKFLOW_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_USER_ID: &str = "user1";

/// What the user asked for.
#[derive(Debug, Clone)]
pub struct ItineraryRequest {
    pub book_title: String,
    pub author: Option<String>,
    pub user_id: String,
    pub preferences: TravelPreferences,
    /// Overrides the workflow's configured timeout.
    pub timeout: Option<Duration>,
}

impl ItineraryRequest {
    pub fn new(book_title: impl Into<String>) -> Self {
        Self {
            book_title: book_title.into(),
            author: None,
            user_id: DEFAULT_USER_ID.to_string(),
            preferences: TravelPreferences::default(),
            timeout: None,
        }
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn preferences(mut self, preferences: TravelPreferences) -> Self {
        self.preferences = preferences;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Initial run state: the title, plus author and preferences when given.
    fn initial_state(&self) -> RunState {
        let state = RunState::new();
        state.set(keys::BOOK_TITLE, self.book_title.clone());
        if let Some(author) = &self.author {
            state.set(keys::AUTHOR, author.clone());
        }
        if !self.preferences.is_empty() {
            let prefs = serde_json::to_value(&self.preferences).unwrap_or(Value::Null);
            state.set(keys::USER_PREFERENCES, prefs);
        }
        state
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ItineraryResult {
    pub run_id: Uuid,
    pub book: BookMetadata,
    /// `None` when the composer produced nothing usable.
    pub itinerary: Option<TripItinerary>,
    pub selected_regions: Vec<TravelRegion>,
    pub context_stats: ContextStats,
}

/// Timeout budget shared by the automated phases.
#[derive(Debug, Clone, Copy)]
struct DeadlineBudget {
    remaining: Duration,
}

impl DeadlineBudget {
    fn new(total: Duration) -> Self {
        Self { remaining: total }
    }

    fn deadline_for(&self, phase: Duration) -> Duration {
        phase.min(self.remaining)
    }

    fn charge(&mut self, elapsed: Duration) {
        self.remaining = self.remaining.saturating_sub(elapsed);
    }
}

pub struct StorylandWorkflow {
    supervisor: PhaseSupervisor,
    store: Arc<dyn RunStore>,
    gate: CheckpointGate,
    timeout: Duration,
    deadlines: PhaseDeadlines,
    context: ContextBudget,
    observer: Option<watch::Sender<Option<RunRecord>>>,
}

impl StorylandWorkflow {
    pub fn new(supervisor: PhaseSupervisor, store: Arc<dyn RunStore>) -> Self {
        Self {
            supervisor,
            store,
            gate: CheckpointGate::new(CheckpointPolicy::Interactive).with_subject("region"),
            timeout: DEFAULT_WORKFLOW_TIMEOUT,
            deadlines: PhaseDeadlines::default(),
            context: ContextBudget::default(),
            observer: None,
        }
    }

    /// Workflow with timeouts and context limits taken from configuration.
    pub fn from_config(
        config: &Config,
        supervisor: PhaseSupervisor,
        store: Arc<dyn RunStore>,
    ) -> Self {
        Self::new(supervisor, store)
            .with_timeout(config.workflow_timeout())
            .with_context_budget(ContextBudget::new(
                config.session_max_events,
                config.max_context_tokens,
            ))
    }

    pub fn with_checkpoint_policy(mut self, policy: CheckpointPolicy) -> Self {
        self.gate = CheckpointGate::new(policy).with_subject("region");
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_phase_deadlines(mut self, deadlines: PhaseDeadlines) -> Self {
        self.deadlines = deadlines;
        self
    }

    pub fn with_context_budget(mut self, context: ContextBudget) -> Self {
        self.context = context;
        self
    }

    /// Publish the run record after every phase, e.g. to the dev server.
    pub fn with_observer(mut self, observer: watch::Sender<Option<RunRecord>>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run the whole workflow for `request`, asking `input` at the checkpoint.
    #[instrument(
        skip_all,
        fields(book_title = %request.book_title, user_id = %request.user_id)
    )]
    pub async fn create_itinerary(
        &self,
        request: &ItineraryRequest,
        input: &mut dyn SelectionInput,
    ) -> Result<ItineraryResult, WorkflowError> {
        info!(author = ?request.author, "itinerary_request");

        let run = Run::new(request.user_id.clone(), request.initial_state());
        info!(run_id = %run.id(), store = %self.store.describe(), "session_created");
        self.persist(&run).await?;

        let timeout = request.timeout.unwrap_or(self.timeout);
        let mut budget = DeadlineBudget::new(timeout);
        info!(timeout_secs = timeout.as_secs(), "workflow_starting");

        info!("phase_1_start");
        self.run_phase(&metadata_stage(self.deadlines.metadata)?, &run, &mut budget)
            .await?;
        let book = self.exact_book(&run, request);
        info!(title = %book.title, author = %book.author, "metadata_extracted");

        info!("phase_2_start");
        let discovery = discovery_stage(&book, self.deadlines.discovery)?;
        self.run_phase(&discovery, &run, &mut budget).await?;

        let analysis: RegionAnalysis = run
            .state()
            .get_as(keys::REGION_ANALYSIS)
            .unwrap_or_default();
        info!(num_regions = analysis.regions.len(), "regions_discovered");

        let selected = match self.gate.present(&analysis.regions, input) {
            Ok(selected) => selected,
            Err(err) => {
                if matches!(err, CheckpointError::NoCandidates) {
                    error!(title = %book.title, author = %book.author, "no_regions_available");
                }
                run.record("checkpoint", EventKind::CheckpointResolved, err.to_string());
                self.persist(&run).await?;
                return Err(err.into());
            }
        };
        self.store_selection(&run, &selected);
        self.persist(&run).await?;

        info!(region_count = selected.len(), "phase_3_start");
        self.run_phase(
            &composition_stage(self.deadlines.composition)?,
            &run,
            &mut budget,
        )
        .await?;

        let itinerary = run
            .state()
            .get_as::<TripItinerary>(keys::FINAL_ITINERARY)
            .filter(|itinerary| !itinerary.is_empty());
        let context_stats = self.context.stats(&run.events().snapshot());
        info!(
            total_events = context_stats.num_events,
            cities = itinerary.as_ref().map_or(0, |i| i.cities.len()),
            "workflow_complete"
        );
        info!(
            num_events = context_stats.num_events,
            estimated_tokens = context_stats.estimated_tokens,
            "context_stats"
        );
        if self.context.should_compact(&run.events().snapshot()) {
            warn!(
                max_events = self.context.max_events,
                max_tokens = self.context.max_tokens,
                "context_over_budget"
            );
        }

        Ok(ItineraryResult {
            run_id: run.id(),
            book,
            itinerary,
            selected_regions: selected,
            context_stats,
        })
    }

    /// Run one phase under the remaining budget and persist the run after it.
    async fn run_phase(
        &self,
        phase: &Phase,
        run: &Run,
        budget: &mut DeadlineBudget,
    ) -> Result<(), WorkflowError> {
        let deadline = budget.deadline_for(phase.deadline());
        let started = Instant::now();
        let outcome = self.supervisor.run_phase(phase, run, deadline).await;
        budget.charge(started.elapsed());
        self.persist(run).await?;

        outcome.into_result(phase.name(), deadline).map(|_| ()).inspect_err(|err| {
            if matches!(err, WorkflowError::PhaseTimedOut { .. }) {
                error!(phase = %phase.name(), timeout_ms = deadline.as_millis() as u64, "workflow_timeout");
            }
        })
    }

    /// Title and author as found by the metadata stage, falling back to the
    /// request when the lookup came back empty.
    fn exact_book(&self, run: &Run, request: &ItineraryRequest) -> BookMetadata {
        let mut book: BookMetadata = run
            .state()
            .get_as(keys::BOOK_METADATA)
            .unwrap_or_default();
        if book.title.trim().is_empty() {
            book.title = request.book_title.clone();
        }
        if book.author.trim().is_empty() {
            book.author = request.author.clone().unwrap_or_default();
        }
        book
    }

    fn store_selection(&self, run: &Run, selected: &[TravelRegion]) {
        let cities = union_cities(selected);
        let ids: Vec<u32> = selected.iter().map(Candidate::id).collect();

        run.state().set(
            keys::SELECTED_REGIONS,
            serde_json::to_value(selected).unwrap_or_else(|_| json!([])),
        );
        run.state().set(
            keys::SELECTED_CITIES,
            serde_json::to_value(&cities).unwrap_or_else(|_| json!([])),
        );
        run.record(
            "checkpoint",
            EventKind::CheckpointResolved,
            format!("selected regions {ids:?}"),
        );
        info!(region_count = selected.len(), city_count = cities.len(), "selected_regions_stored");
        self.supervisor
            .events()
            .emit(WorkflowEvent::CheckpointResolved { selected: ids });
    }

    async fn persist(&self, run: &Run) -> Result<(), WorkflowError> {
        let record = run.to_record();
        self.store
            .save(&record)
            .await
            .map_err(WorkflowError::Store)?;
        if let Some(observer) = &self.observer {
            observer.send_replace(Some(record));
        }
        Ok(())
    }
}
