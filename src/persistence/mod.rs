//! Persistence layer for pipeline run history
//!
//! History is observability only: the runner keeps going if a write fails.

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteRunLog;

use crate::core::{FailureKind, RunStatus, StageOutcome};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Summary of a pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique run ID
    pub run_id: Uuid,

    /// Pipeline name
    pub pipeline_name: String,

    /// Object key that triggered the run
    pub object_key: String,

    /// Name given to the run's backend resources
    pub resource_name: String,

    /// Run status
    pub status: RunStatus,

    /// Stage that failed, if the run failed
    pub failed_stage: Option<String>,

    pub failure_kind: Option<FailureKind>,

    pub error: Option<String>,

    /// When the run started
    pub started_at: DateTime<Utc>,

    /// When the run completed (if complete)
    pub completed_at: Option<DateTime<Utc>>,

    /// Number of completed stages
    pub completed_stages: usize,

    /// Total number of stages
    pub total_stages: usize,
}

impl RunSummary {
    /// Progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.total_stages == 0 {
            return 0.0;
        }
        self.completed_stages as f64 / self.total_stages as f64
    }
}

/// One stage outcome, appended as the run progresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageLogEntry {
    pub run_id: Uuid,
    pub stage: String,
    pub index: usize,
    pub outcome: StageOutcome,

    /// Stage result stored in the run context, for succeeded stages
    pub payload: Option<Value>,

    pub recorded_at: DateTime<Utc>,
}

/// Trait for run history backends
#[async_trait::async_trait]
pub trait RunLog: Send + Sync {
    /// Save (or replace) a run summary
    async fn save_run(&self, summary: &RunSummary) -> Result<()>;

    /// Append a stage outcome
    async fn record_stage(&self, entry: &StageLogEntry) -> Result<()>;

    /// Load a run by ID
    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>>;

    /// Most recent runs first
    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>>;

    /// Stage outcomes of a run, in execution order
    async fn stage_entries(&self, run_id: Uuid) -> Result<Vec<StageLogEntry>>;
}

/// In-memory run log (for testing or ephemeral use)
pub struct InMemoryRunLog {
    runs: RwLock<HashMap<Uuid, RunSummary>>,
    stages: RwLock<HashMap<Uuid, Vec<StageLogEntry>>>,
}

impl InMemoryRunLog {
    pub fn new() -> Self {
        Self {
            runs: RwLock::new(HashMap::new()),
            stages: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryRunLog {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RunLog for InMemoryRunLog {
    async fn save_run(&self, summary: &RunSummary) -> Result<()> {
        let mut runs = self.runs.write().await;
        runs.insert(summary.run_id, summary.clone());
        Ok(())
    }

    async fn record_stage(&self, entry: &StageLogEntry) -> Result<()> {
        let mut stages = self.stages.write().await;
        stages.entry(entry.run_id).or_default().push(entry.clone());
        Ok(())
    }

    async fn load_run(&self, run_id: Uuid) -> Result<Option<RunSummary>> {
        let runs = self.runs.read().await;
        Ok(runs.get(&run_id).cloned())
    }

    async fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>> {
        let runs = self.runs.read().await;
        let mut result: Vec<_> = runs.values().cloned().collect();
        result.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        result.truncate(limit);
        Ok(result)
    }

    async fn stage_entries(&self, run_id: Uuid) -> Result<Vec<StageLogEntry>> {
        let stages = self.stages.read().await;
        let mut entries = stages.get(&run_id).cloned().unwrap_or_default();
        entries.sort_by_key(|e| e.index);
        Ok(entries)
    }
}
