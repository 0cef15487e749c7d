//! In-process backend for dry runs
//!
//! ETL jobs succeed immediately. Async jobs report `ResourcePending` for a
//! configurable number of status checks, then succeed with outputs shaped
//! like the real service's (model artifact path, transform output path).

use crate::backend::{
    AsyncJobBackend, BackendError, JobHandle, JobKind, JobOutput, JobSpec, JobStatus,
    SyncJobBackend,
};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use tokio::sync::Mutex;
use tracing::debug;

struct SubmittedJob {
    spec: JobSpec,
    remaining_checks: u32,
}

/// Simulated ETL + ML backend
pub struct SimulatedBackend {
    pending_checks: u32,
    jobs: Mutex<HashMap<JobHandle, SubmittedJob>>,
}

impl SimulatedBackend {
    /// `pending_checks` is how many status checks each async job answers
    /// with `ResourcePending` before succeeding
    pub fn new(pending_checks: u32) -> Self {
        Self {
            pending_checks,
            jobs: Mutex::new(HashMap::new()),
        }
    }

    fn finished_output(spec: &JobSpec) -> JobOutput {
        match spec.kind {
            JobKind::Training => {
                let base = spec.output.clone().unwrap_or_default();
                let artifacts = format!(
                    "{}/{}/output/model.tar.gz",
                    base.trim_end_matches('/'),
                    spec.job_name
                );
                JobOutput::new(spec.job_name.clone())
                    .with_output_location(artifacts.clone())
                    .with_details(json!({
                        "TrainingJobStatus": "Completed",
                        "ModelArtifacts": { "S3ModelArtifacts": artifacts },
                    }))
            }
            JobKind::Model => JobOutput::new(spec.job_name.clone()).with_details(json!({
                "ModelArn": format!("arn:aws:sagemaker:local:000000000000:model/{}", spec.job_name.to_lowercase()),
            })),
            JobKind::Transform => {
                let output = spec.output.clone().unwrap_or_default();
                JobOutput::new(spec.job_name.clone())
                    .with_output_location(output.clone())
                    .with_details(json!({
                        "TransformJobStatus": "Completed",
                        "TransformOutput": { "S3OutputPath": output },
                    }))
            }
            JobKind::Etl => {
                let mut out = JobOutput::new(spec.job_name.clone())
                    .with_details(json!({ "JobRunState": "SUCCEEDED" }));
                out.output_location = spec.output.clone();
                out
            }
        }
    }
}

#[async_trait]
impl SyncJobBackend for SimulatedBackend {
    async fn run(&self, spec: &JobSpec) -> Result<JobOutput, BackendError> {
        debug!("Simulated ETL run for {}", spec.job_name);
        Ok(Self::finished_output(spec))
    }
}

#[async_trait]
impl AsyncJobBackend for SimulatedBackend {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, BackendError> {
        let handle = JobHandle::new(format!("{}:{}", spec.kind, spec.job_name));
        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&handle) {
            return Err(BackendError::new(
                "ResourceInUse",
                format!("job {} already exists", spec.job_name),
            ));
        }
        jobs.insert(
            handle.clone(),
            SubmittedJob {
                spec: spec.clone(),
                remaining_checks: self.pending_checks,
            },
        );
        debug!("Simulated submit: {}", handle);
        Ok(handle)
    }

    async fn check_status(&self, handle: &JobHandle) -> Result<JobStatus, BackendError> {
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .get_mut(handle)
            .ok_or_else(|| BackendError::new("ResourceNotFound", format!("unknown job {}", handle)))?;

        if job.remaining_checks > 0 {
            job.remaining_checks -= 1;
            return Err(BackendError::pending(format!("{} is still running", handle)));
        }

        let output = Self::finished_output(&job.spec);
        jobs.remove(handle);
        Ok(JobStatus::Succeeded(output))
    }
}
