//! SQLite-based run log

use crate::core::{FailureKind, RunStatus, StageOutcome};
use crate::persistence::{RunLog, RunSummary, StageLogEntry};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use uuid::Uuid;

const SCHEMA: [&str; 4] = [
    r#"
    CREATE TABLE IF NOT EXISTS runs (
        id TEXT PRIMARY KEY,
        pipeline_name TEXT NOT NULL,
        object_key TEXT NOT NULL,
        resource_name TEXT NOT NULL,
        status TEXT NOT NULL,
        failed_stage TEXT,
        failure_kind TEXT,
        error TEXT,
        started_at TEXT NOT NULL,
        completed_at TEXT,
        completed_stages INTEGER NOT NULL DEFAULT 0,
        total_stages INTEGER NOT NULL DEFAULT 0
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS stage_log (
        run_id TEXT NOT NULL,
        stage TEXT NOT NULL,
        stage_index INTEGER NOT NULL,
        outcome TEXT NOT NULL,
        failure_kind TEXT,
        error TEXT,
        payload TEXT,
        recorded_at TEXT NOT NULL,
        PRIMARY KEY (run_id, stage_index)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_runs_started_at ON runs(started_at)",
    "CREATE INDEX IF NOT EXISTS idx_runs_status ON runs(status)",
];

const RUN_COLUMNS: &str = "id, pipeline_name, object_key, resource_name, status, failed_stage, \
     failure_kind, error, started_at, completed_at, completed_stages, total_stages";

/// SQLite run log
pub struct SqliteRunLog {
    pool: SqlitePool,
}

impl SqliteRunLog {
    /// Open (creating if needed) the database at `db_path`; `:memory:`
    /// opens a private in-memory database
    pub async fn new(db_path: &str) -> Result<Self> {
        let (options, max_connections) = if db_path == ":memory:" {
            (SqliteConnectOptions::from_str("sqlite::memory:")?, 1)
        } else {
            (
                SqliteConnectOptions::new()
                    .filename(db_path)
                    .create_if_missing(true),
                4,
            )
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Default database location under the user's data directory
    pub fn default_path() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mlops-pipeline")
            .join("runs.db")
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let db_path = Self::default_path();
        if let Some(dir) = db_path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let db_path = db_path
            .to_str()
            .context("Database path is not valid UTF-8")?
            .to_string();
        Self::new(&db_path).await
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .context("Failed to initialize schema")?;
        }
        Ok(())
    }

    /// Convert DateTime<Utc> to NaiveDateTime for SQLite
    fn to_naive(dt: DateTime<Utc>) -> NaiveDateTime {
        dt.naive_utc()
    }

    /// Convert NaiveDateTime to DateTime<Utc>
    fn from_naive(dt: NaiveDateTime) -> DateTime<Utc> {
        DateTime::from_naive_utc_and_offset(dt, Utc)
    }

    fn summary_from_row(row: &SqliteRow) -> Result<RunSummary> {
        Ok(RunSummary {
            run_id: Uuid::parse_str(&row.get::<String, _>("id"))?,
            pipeline_name: row.get("pipeline_name"),
            object_key: row.get("object_key"),
            resource_name: row.get("resource_name"),
            status: RunStatus::parse(&row.get::<String, _>("status")),
            failed_stage: row.get("failed_stage"),
            failure_kind: row
                .get::<Option<String>, _>("failure_kind")
                .as_deref()
                .and_then(FailureKind::parse),
            error: row.get("error"),
            started_at: Self::from_naive(row.get("started_at")),
            completed_at: row
                .get::<Option<NaiveDateTime>, _>("completed_at")
                .map(Self::from_naive),
            completed_stages: row.get::<i64, _>("completed_stages") as usize,
            total_stages: row.get::<i64, _>("total_stages") as usize,
        })
    }

    fn entry_from_row(row: &SqliteRow) -> Result<StageLogEntry> {
        let outcome = match row.get::<String, _>("outcome").as_str() {
            "Succeeded" => StageOutcome::Succeeded,
            _ => {
                let kind: Option<String> = row.get("failure_kind");
                StageOutcome::Failed {
                    kind: kind
                        .as_deref()
                        .and_then(FailureKind::parse)
                        .unwrap_or(FailureKind::Backend),
                    error: row.get::<Option<String>, _>("error").unwrap_or_default(),
                }
            }
        };
        let payload: Option<serde_json::Value> = row
            .get::<Option<String>, _>("payload")
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .context("Failed to decode stage payload")?;

        Ok(StageLogEntry {
            run_id: Uuid::parse_str(&row.get::<String, _>("run_id"))?,
            stage: row.get("stage"),
            index: row.get::<i64, _>("stage_index") as usize,
            outcome,
            payload,
            recorded_at: Self::from_naive(row.get("recorded_at")),
        })
    }
}

#[async_trait::async_trait]
impl RunLog for SqliteRunLog {
    async fn save_run(&self, summary: &RunSummary) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO runs
            (id, pipeline_name, object_key, resource_name, status, failed_stage, failure_kind,
             error, started_at, completed_at, completed_stages, total_stages)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(summary.run_id.to_string())
        .bind(&summary.pipeline_name)
        .bind(&summary.object_key)
        .bind(&summary.resource_name)
        .bind(summary.status.as_str())
        .bind(&summary.failed_stage)
        .bind(summary.failure_kind.map(|k| k.as_str()))
        .bind(&summary.error)
        .bind(Self::to_naive(summary.started_at))
        .bind(summary.completed_at.map(Self::to_naive))
        .bind(summary.completed_stages as i64)
        .bind(summary.total_stages as i64)
        .execute(&self.pool)
        .await
        .context("Failed to save run")?;

        Ok(())
    }

    async fn record_stage(&self, entry: &StageLogEntry) -> Result<()> {
        let (outcome, kind, error) = match &entry.outcome {
            StageOutcome::Succeeded => ("Succeeded", None, None),
            StageOutcome::Failed { kind, error } => ("Failed", Some(kind.as_str()), Some(error.as_str())),
        };
        let payload = entry
            .payload
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .context("Failed to encode stage payload")?;

        sqlx::query(
            r#"
            INSERT INTO stage_log
            (run_id, stage, stage_index, outcome, failure_kind, error, payload, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(entry.run_id.to_string())
        .bind(&entry.stage)
        .bind(entry.index as i64)
        .bind(outcome)
        .bind(kind)
        .bind(error)
        .bind(payload)
        .bind(Self::to_naive(entry.recorded_at))
        .execute(&self.pool)
        .await
        .context("Failed to record stage")?;

        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let row = sqlx::query(&format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS))
            .bind(run_id.to_string())
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load run")?;

        row.as_ref().map(Self::summary_from_row).transpose()
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM runs ORDER BY started_at DESC LIMIT ?1",
            RUN_COLUMNS
        ))
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list runs")?;

        rows.iter().map(Self::summary_from_row).collect()
    }

    async fn stage_entries(&self, run_id: Uuid) -> Result<Vec<StageLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT run_id, stage, stage_index, outcome, failure_kind, error, payload, recorded_at
            FROM stage_log
            WHERE run_id = ?1
            ORDER BY stage_index ASC
            "#,
        )
        .bind(run_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load stage log")?;

        rows.iter().map(Self::entry_from_row).collect()
    }
}
