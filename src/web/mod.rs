//! Read-only snapshot server for `--dev`.
//!
//! A browser UI polls these endpoints while the workflow runs in the same
//! process. Nothing here can change a run.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::info;
use uuid::Uuid;

use crate::state::{RunRecord, RunStore};

pub const DEFAULT_PORT: u16 = 8000;

pub struct AppState {
    /// Latest record of the run in progress, `None` before it starts.
    pub current: watch::Receiver<Option<RunRecord>>,
    pub store: Arc<dyn RunStore>,
}

pub type SharedState = Arc<AppState>;

pub enum ApiError {
    NotFound(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub user_id: String,
    pub current_phase: Option<String>,
    pub num_events: usize,
    pub state_keys: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

impl From<&RunRecord> for RunSummary {
    fn from(record: &RunRecord) -> Self {
        Self {
            run_id: record.run_id,
            user_id: record.user_id.clone(),
            current_phase: record.current_phase.clone(),
            num_events: record.events.len(),
            state_keys: record.state.keys().map(str::to_string).collect(),
            created_at: record.created_at,
            updated_at: record.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only the newest `limit` events.
    pub limit: Option<usize>,
}

pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/run", get(current_run))
        .route("/run/state", get(current_state))
        .route("/run/events", get(current_events))
        .route("/runs/{run_id}", get(stored_run))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn current(state: &AppState) -> Result<RunRecord, ApiError> {
    state
        .current
        .borrow()
        .clone()
        .ok_or_else(|| ApiError::NotFound("No run in progress".to_string()))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn current_run(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let record = current(&state)?;
    Ok(Json(RunSummary::from(&record)))
}

async fn current_state(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(current(&state)?.state))
}

async fn current_events(
    State(state): State<SharedState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let mut events = current(&state)?.events;
    if let Some(limit) = query.limit {
        let start = events.len().saturating_sub(limit);
        events.drain(..start);
    }
    Ok(Json(events))
}

async fn stored_run(
    State(state): State<SharedState>,
    Path(run_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    match state.store.load(run_id).await {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(ApiError::NotFound(format!("Run {run_id} not found"))),
        Err(err) => Err(ApiError::Internal(err.to_string())),
    }
}

/// Bind and serve until the process exits.
pub async fn serve(port: u16, state: SharedState) -> Result<()> {
    let addr = format!("127.0.0.1:{port}");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    let local_addr = listener.local_addr()?;
    info!(%local_addr, "dev_server_started");
    println!("StoryLand dev server running at http://{local_addr}");

    axum::serve(listener, build_router(state))
        .await
        .context("Server error")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{EventKind, InMemoryRunStore, Run, RunState};
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use serde_json::json;
    use tower::ServiceExt;

    fn sample_record() -> RunRecord {
        let run = Run::new("user1", RunState::with_values([("book_title", json!("1984"))]));
        run.set_phase("metadata_stage");
        run.record("book_metadata_researcher", EventKind::TaskStarted, "");
        run.record("book_metadata_researcher", EventKind::TaskCompleted, "found it");
        run.to_record()
    }

    fn test_app(current: Option<RunRecord>) -> (Router, Arc<InMemoryRunStore>) {
        let (_tx, rx) = watch::channel(current);
        let store = Arc::new(InMemoryRunStore::new());
        let state = Arc::new(AppState {
            current: rx,
            store: store.clone(),
        });
        (build_router(state), store)
    }

    async fn get(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    #[tokio::test]
    async fn test_health_check() {
        let (app, _) = test_app(None);
        let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }

    #[tokio::test]
    async fn test_no_run_yet_is_not_found() {
        let (app, _) = test_app(None);
        let (status, body) = get(app, "/run").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No run in progress");
    }

    #[tokio::test]
    async fn test_current_run_endpoints() {
        let record = sample_record();
        let (app, _) = test_app(Some(record.clone()));

        let (status, body) = get(app.clone(), "/run").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["run_id"], json!(record.run_id));
        assert_eq!(body["current_phase"], "metadata_stage");
        assert_eq!(body["num_events"], 2);

        let (_, body) = get(app.clone(), "/run/state").await;
        assert_eq!(body, json!({"book_title": "1984"}));

        let (_, body) = get(app, "/run/events?limit=1").await;
        let events = body.as_array().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["kind"], "task_completed");
    }

    #[tokio::test]
    async fn test_stored_run_lookup() {
        let record = sample_record();
        let (app, store) = test_app(None);
        store.save(&record).await.unwrap();

        let (status, body) = get(app.clone(), &format!("/runs/{}", record.run_id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "user1");

        let (status, _) = get(app, &format!("/runs/{}", Uuid::nil())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
