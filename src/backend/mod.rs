//! External job backends
//!
//! The engine never talks to a concrete service directly. ETL-style jobs go
//! through [`SyncJobBackend`], which blocks until the job is terminal;
//! training, model registration and batch inference go through
//! [`AsyncJobBackend`], which only offers submit and status check.

pub mod error;
pub mod job;
pub mod simulated;

use async_trait::async_trait;
pub use error::{BackendError, RESOURCE_PENDING};
pub use job::{JobHandle, JobKind, JobOutput, JobSpec, JobStatus, ResourceSpec};
pub use simulated::SimulatedBackend;
use std::sync::Arc;

/// Backend that runs a job to completion in a single call
#[async_trait]
pub trait SyncJobBackend: Send + Sync {
    /// Run the job and return its terminal payload
    async fn run(&self, spec: &JobSpec) -> Result<JobOutput, BackendError>;
}

/// Backend that exposes submit + status check only
#[async_trait]
pub trait AsyncJobBackend: Send + Sync {
    /// Submit a job and return the handle to poll
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, BackendError>;

    /// Check the status of a previously submitted job
    async fn check_status(&self, handle: &JobHandle) -> Result<JobStatus, BackendError>;
}

/// The backend clients a pipeline run needs
///
/// Shared across concurrent runs; backends hold no per-run state.
#[derive(Clone)]
pub struct JobBackends {
    /// Runs ETL jobs (preprocess, postprocess)
    pub etl: Arc<dyn SyncJobBackend>,

    /// Runs training, model and transform jobs
    pub ml: Arc<dyn AsyncJobBackend>,
}

impl JobBackends {
    pub fn new(etl: Arc<dyn SyncJobBackend>, ml: Arc<dyn AsyncJobBackend>) -> Self {
        Self { etl, ml }
    }

    /// Use one simulated backend for both roles
    pub fn simulated(backend: SimulatedBackend) -> Self {
        let backend = Arc::new(backend);
        Self {
            etl: backend.clone(),
            ml: backend,
        }
    }
}
