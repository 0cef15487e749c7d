//! Test utility functions for mlops-pipeline scenarios

use async_trait::async_trait;
use mlops_pipeline::backend::{
    AsyncJobBackend, BackendError, JobBackends, JobHandle, JobKind, JobOutput, JobSpec, JobStatus,
    SyncJobBackend,
};
use mlops_pipeline::core::{FailureKind, PipelineConfig, PipelineDefinition, RunState};
use mlops_pipeline::execution::{PipelineRunner, PollPolicy, RunReport};
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

pub const BUCKET: &str = "test-bucket";

/// Backend operation seen by [`RecordingBackend`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Run,
    Submit,
    Check,
}

/// One recorded backend call
#[derive(Debug, Clone)]
pub struct Call {
    pub op: Op,
    pub stage: String,
    pub spec: Option<JobSpec>,
    pub at: Instant,
}

#[derive(Default)]
struct Script {
    run_errors: HashMap<String, BackendError>,
    submit_errors: HashMap<String, BackendError>,
    status_errors: HashMap<String, BackendError>,
    pending_checks: HashMap<String, u32>,
    run_delay: Option<Duration>,
}

struct Submitted {
    spec: JobSpec,
    remaining: u32,
}

/// Mock backend that records every call and answers from a per-stage script
#[derive(Default)]
pub struct RecordingBackend {
    script: Mutex<Script>,
    calls: Mutex<Vec<Call>>,
    jobs: Mutex<HashMap<JobHandle, Submitted>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the synchronous job of `stage`
    pub fn fail_run(self, stage: &str, error: BackendError) -> Self {
        self.script.lock().unwrap().run_errors.insert(stage.to_string(), error);
        self
    }

    /// Reject the submission of `stage`
    pub fn fail_submit(self, stage: &str, error: BackendError) -> Self {
        self.script.lock().unwrap().submit_errors.insert(stage.to_string(), error);
        self
    }

    /// Answer every status check of `stage` with `error`
    pub fn fail_status(self, stage: &str, error: BackendError) -> Self {
        self.script.lock().unwrap().status_errors.insert(stage.to_string(), error);
        self
    }

    /// Report `ResourcePending` for the first `n` checks of `stage`
    pub fn pending(self, stage: &str, n: u32) -> Self {
        self.script.lock().unwrap().pending_checks.insert(stage.to_string(), n);
        self
    }

    /// Async jobs submitted but not yet reported finished
    pub fn in_flight(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    /// Make synchronous jobs take `delay`
    pub fn with_run_delay(self, delay: Duration) -> Self {
        self.script.lock().unwrap().run_delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls made for `stage`, in order
    pub fn calls_for(&self, stage: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.stage == stage).collect()
    }

    /// Number of `op` calls made for `stage`
    pub fn count(&self, stage: &str, op: Op) -> usize {
        self.calls_for(stage).iter().filter(|c| c.op == op).count()
    }

    /// Every stage that reached the backend, in first-call order
    pub fn invoked_stages(&self) -> Vec<String> {
        let mut stages: Vec<String> = Vec::new();
        for call in self.calls() {
            if !stages.contains(&call.stage) {
                stages.push(call.stage);
            }
        }
        stages
    }

    /// The job request `stage` sent (run or submit)
    pub fn spec_for(&self, stage: &str) -> Option<JobSpec> {
        self.calls_for(stage).into_iter().find_map(|c| c.spec)
    }

    fn record(&self, op: Op, stage: &str, spec: Option<&JobSpec>) {
        self.calls.lock().unwrap().push(Call {
            op,
            stage: stage.to_string(),
            spec: spec.cloned(),
            at: Instant::now(),
        });
    }

    fn output_for(spec: &JobSpec) -> JobOutput {
        let job_id = format!("{}-{}", spec.stage, spec.job_name);
        match spec.kind {
            JobKind::Training => JobOutput::new(job_id.clone()).with_output_location(format!(
                "{}/{}/output/model.tar.gz",
                spec.output.clone().unwrap_or_default(),
                job_id
            )),
            JobKind::Model => JobOutput::new(job_id).with_details(json!({ "ModelArn": "arn:test" })),
            JobKind::Transform | JobKind::Etl => {
                let mut output = JobOutput::new(job_id);
                output.output_location = spec.output.clone();
                output
            }
        }
    }
}

#[async_trait]
impl SyncJobBackend for RecordingBackend {
    async fn run(&self, spec: &JobSpec) -> Result<JobOutput, BackendError> {
        self.record(Op::Run, &spec.stage, Some(spec));

        let (delay, error) = {
            let script = self.script.lock().unwrap();
            (script.run_delay, script.run_errors.get(&spec.stage).cloned())
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match error {
            Some(e) => Err(e),
            None => Ok(Self::output_for(spec)),
        }
    }
}

#[async_trait]
impl AsyncJobBackend for RecordingBackend {
    async fn submit(&self, spec: &JobSpec) -> Result<JobHandle, BackendError> {
        self.record(Op::Submit, &spec.stage, Some(spec));

        let (error, remaining) = {
            let script = self.script.lock().unwrap();
            (
                script.submit_errors.get(&spec.stage).cloned(),
                script.pending_checks.get(&spec.stage).copied().unwrap_or(0),
            )
        };
        if let Some(e) = error {
            return Err(e);
        }

        let handle = JobHandle::new(format!("{}:{}", spec.stage, spec.job_name));
        self.jobs.lock().unwrap().insert(
            handle.clone(),
            Submitted {
                spec: spec.clone(),
                remaining,
            },
        );
        Ok(handle)
    }

    async fn check_status(&self, handle: &JobHandle) -> Result<JobStatus, BackendError> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(handle)
            .ok_or_else(|| BackendError::new("ResourceNotFound", handle.to_string()))?;
        let stage = job.spec.stage.clone();
        self.record(Op::Check, &stage, None);

        if let Some(e) = self.script.lock().unwrap().status_errors.get(&stage).cloned() {
            return Err(e);
        }
        if job.remaining > 0 {
            job.remaining -= 1;
            return Err(BackendError::pending(format!("{} is running", handle)));
        }
        let output = Self::output_for(&job.spec);
        jobs.remove(handle);
        Ok(JobStatus::Succeeded(output))
    }
}

/// DeepAR definition with a short fixed poll policy
pub fn deepar_definition(policy: PollPolicy) -> PipelineDefinition {
    PipelineDefinition::from_config(&PipelineConfig::deepar(BUCKET, "us-east-1")).with_poll_policy(policy)
}

/// Runner over the DeepAR definition backed by `backend` for both roles
pub fn runner_with(backend: Arc<RecordingBackend>, policy: PollPolicy) -> PipelineRunner {
    let backends = JobBackends::new(backend.clone(), backend);
    PipelineRunner::new(deepar_definition(policy), backends)
}

/// Poll policy used by most scenarios
pub fn quick_policy(max_attempts: u32) -> PollPolicy {
    PollPolicy::fixed(Duration::from_secs(5), max_attempts)
}

/// Assert the exact set of context keys
pub fn assert_keys(report: &RunReport, expected: &[&str]) {
    let mut expected: Vec<&str> = expected.to_vec();
    expected.sort();
    assert_eq!(report.context.keys(), expected, "unexpected context keys");
}

/// Assert the run failed at `index` with `kind`
pub fn assert_failed_at(report: &RunReport, index: usize, kind: FailureKind) {
    match &report.state {
        RunState::Failed { stage_index, cause } => {
            assert_eq!(*stage_index, index, "failed at the wrong stage: {:?}", cause);
            assert_eq!(cause.kind, kind, "wrong failure kind: {}", cause.message);
        }
        other => panic!("Expected Failed at {}, got {:?}", index, other),
    }
}

/// Assert the run succeeded
pub fn assert_succeeded(report: &RunReport) {
    assert_eq!(report.state, RunState::Succeeded, "run did not succeed: {:?}", report.state);
}
