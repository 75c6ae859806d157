//! Run persistence: an in-memory store and a SQLite-backed one.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{RunEvent, StateSnapshot};
use crate::config::Config;

/// Persisted form of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub current_phase: Option<String>,
    pub state: StateSnapshot,
    pub events: Vec<RunEvent>,
}

/// Where runs are saved between phases.
#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert or replace the record with the same run id.
    async fn save(&self, record: &RunRecord) -> Result<()>;

    async fn load(&self, run_id: Uuid) -> Result<Option<RunRecord>>;

    /// All runs of a user, oldest first.
    async fn list(&self, user_id: &str) -> Result<Vec<RunRecord>>;

    fn describe(&self) -> String;
}

/// Open the store selected by configuration.
pub fn open_store(config: &Config) -> Result<Arc<dyn RunStore>> {
    if config.use_database {
        let store = SqliteRunStore::open(&config.database_path())?;
        Ok(Arc::new(store))
    } else {
        Ok(Arc::new(InMemoryRunStore::new()))
    }
}

#[derive(Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<Uuid, RunRecord>>,
}

impl InMemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn save(&self, record: &RunRecord) -> Result<()> {
        self.runs.write().await.insert(record.run_id, record.clone());
        Ok(())
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        Ok(self.runs.read().await.get(&run_id).cloned())
    }

    async fn list(&self, user_id: &str) -> Result<Vec<RunRecord>> {
        let mut runs: Vec<RunRecord> = self
            .runs
            .read()
            .await
            .values()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| r.created_at);
        Ok(runs)
    }

    fn describe(&self) -> String {
        "in-memory".to_string()
    }
}

/// SQLite-backed store.
///
/// The connection lives behind `Arc<Mutex>` and every query runs on tokio's
/// blocking pool so SQLite I/O never stalls async workers.
#[derive(Clone)]
pub struct SqliteRunStore {
    conn: Arc<std::sync::Mutex<Connection>>,
    location: String,
}

impl SqliteRunStore {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open SQLite database at {}", path.display()))?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().context("Failed to open in-memory SQLite database")?;
        Self::init(conn, ":memory:".to_string())
    }

    fn init(conn: Connection, location: String) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS runs (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                current_phase TEXT,
                record TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_runs_user ON runs(user_id, created_at);
            ",
        )
        .context("Failed to run migrations")?;
        Ok(Self {
            conn: Arc::new(std::sync::Mutex::new(conn)),
            location,
        })
    }

    /// Run a closure against the connection on a blocking thread.
    async fn call<F, R>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Connection) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Run store lock poisoned: {}", e))?;
            f(&guard)
        })
        .await
        .context("Run store task panicked")?
    }
}

fn decode(raw: &str) -> Result<RunRecord> {
    serde_json::from_str(raw).context("Corrupt run record")
}

#[async_trait]
impl RunStore for SqliteRunStore {
    async fn save(&self, record: &RunRecord) -> Result<()> {
        let body = serde_json::to_string(record).context("Failed to encode run record")?;
        let id = record.run_id.to_string();
        let user_id = record.user_id.clone();
        let created_at = record.created_at.to_rfc3339();
        let updated_at = record.updated_at.to_rfc3339();
        let phase = record.current_phase.clone();

        self.call(move |conn| {
            conn.execute(
                "INSERT INTO runs (id, user_id, created_at, updated_at, current_phase, record)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    updated_at = excluded.updated_at,
                    current_phase = excluded.current_phase,
                    record = excluded.record",
                params![id, user_id, created_at, updated_at, phase, body],
            )
            .context("Failed to save run")?;
            Ok(())
        })
        .await
    }

    async fn load(&self, run_id: Uuid) -> Result<Option<RunRecord>> {
        let id = run_id.to_string();
        let raw: Option<String> = self
            .call(move |conn| {
                conn.query_row("SELECT record FROM runs WHERE id = ?1", params![id], |row| {
                    row.get(0)
                })
                .optional()
                .context("Failed to load run")
            })
            .await?;
        raw.as_deref().map(decode).transpose()
    }

    async fn list(&self, user_id: &str) -> Result<Vec<RunRecord>> {
        let user_id = user_id.to_string();
        let rows: Vec<String> = self
            .call(move |conn| {
                let mut stmt = conn
                    .prepare("SELECT record FROM runs WHERE user_id = ?1 ORDER BY created_at")?;
                let rows = stmt
                    .query_map(params![user_id], |row| row.get::<_, String>(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;
        rows.iter().map(|raw| decode(raw)).collect()
    }

    fn describe(&self) -> String {
        format!("sqlite ({})", self.location)
    }
}
