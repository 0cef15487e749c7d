//! Stage task - runs one stage's job against the right backend

use crate::backend::{JobBackends, JobOutput};
use crate::core::{JobError, PipelineStage, RunContext};
use crate::execution::poller::{PollPolicy, PollingInvoker};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

/// What a completed stage records in the run context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageResult {
    pub job_id: String,
    pub output_location: Option<String>,
    #[serde(default)]
    pub details: Value,
}

impl StageResult {
    pub fn to_value(&self) -> Value {
        json!({
            "job_id": self.job_id,
            "output_location": self.output_location,
            "details": self.details,
        })
    }

    /// Read a stage result back out of a context entry
    pub fn from_value(value: &Value) -> Option<Self> {
        serde_json::from_value(value.clone()).ok()
    }
}

impl From<JobOutput> for StageResult {
    fn from(output: JobOutput) -> Self {
        Self {
            job_id: output.job_id,
            output_location: output.output_location,
            details: output.details,
        }
    }
}

/// Executes a single stage
pub struct JobTask<'a> {
    stage: &'a PipelineStage,
    backends: &'a JobBackends,
}

impl<'a> JobTask<'a> {
    pub fn new(stage: &'a PipelineStage, backends: &'a JobBackends) -> Self {
        Self { stage, backends }
    }

    /// Build the job from the context, run it and return its result
    ///
    /// ETL jobs run synchronously. Every other kind is submitted and then
    /// polled under the stage's policy.
    pub async fn invoke(
        &self,
        context: &RunContext,
        variables: &HashMap<String, String>,
    ) -> Result<StageResult, JobError> {
        let spec = self.stage.template.build(&self.stage.name, context, variables)?;
        debug!("Built {} job '{}' for stage {}", spec.kind, spec.job_name, self.stage.name);

        let output = if spec.kind.is_async() {
            let handle = self.backends.ml.submit(&spec).await.map_err(JobError::Submit)?;
            info!("Stage {} submitted job {}", self.stage.name, handle);

            let policy = self.stage.poll.clone().unwrap_or_else(PollPolicy::default);
            let invoker = PollingInvoker::new(policy);
            invoker
                .poll(&handle, || self.backends.ml.check_status(&handle))
                .await?
        } else {
            self.backends.etl.run(&spec).await.map_err(JobError::Backend)?
        };

        Ok(StageResult::from(output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::core::{PipelineConfig, PipelineDefinition};
    use std::time::Duration;

    fn definition() -> PipelineDefinition {
        PipelineDefinition::from_config(&PipelineConfig::deepar("bucket", "us-east-1"))
            .with_poll_policy(PollPolicy::fixed(Duration::from_millis(10), 5))
    }

    #[tokio::test(start_paused = true)]
    async fn test_etl_stage_runs_synchronously() {
        let pipeline = definition();
        let backends = JobBackends::simulated(SimulatedBackend::new(2));
        let ctx = pipeline.new_context("raw/a.zip");
        let vars = pipeline.variables_for(&ctx);

        let stage = pipeline.stage(0).unwrap();
        let result = JobTask::new(stage, &backends).invoke(&ctx, &vars).await.unwrap();
        assert_eq!(result.job_id, "DeepAR-MLOps-Preprocess");
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_stage_polls_until_done() {
        let pipeline = definition();
        let backends = JobBackends::simulated(SimulatedBackend::new(3));
        let ctx = pipeline.new_context("raw/a.zip");
        let vars = pipeline.variables_for(&ctx);

        let stage = pipeline.stage(1).unwrap();
        let result = JobTask::new(stage, &backends).invoke(&ctx, &vars).await.unwrap();
        assert!(result
            .output_location
            .as_deref()
            .is_some_and(|loc| loc.ends_with("/output/model.tar.gz")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_async_stage_times_out() {
        let pipeline = definition();
        let backends = JobBackends::simulated(SimulatedBackend::new(50));
        let ctx = pipeline.new_context("raw/a.zip");
        let vars = pipeline.variables_for(&ctx);

        let stage = pipeline.stage(1).unwrap();
        let err = JobTask::new(stage, &backends).invoke(&ctx, &vars).await.unwrap_err();
        assert!(matches!(err, JobError::PendingTimeout { attempts: 5, .. }));
    }

    #[tokio::test]
    async fn test_missing_input_fails_before_submit() {
        let pipeline = definition();
        let backends = JobBackends::simulated(SimulatedBackend::new(0));
        let ctx = pipeline.new_context("raw/a.zip");
        let vars = pipeline.variables_for(&ctx);

        // register-model needs $.train.output_location
        let stage = pipeline.stage(2).unwrap();
        let err = JobTask::new(stage, &backends).invoke(&ctx, &vars).await.unwrap_err();
        assert!(matches!(err, JobError::MissingInput { .. }));
    }

    #[test]
    fn test_stage_result_value_shape() {
        let result = StageResult::from(JobOutput::new("t-1").with_output_location("s3://b/m"));
        let value = result.to_value();
        assert_eq!(value["job_id"], "t-1");
        assert_eq!(value["output_location"], "s3://b/m");
        assert_eq!(StageResult::from_value(&value), Some(result));
    }
}
