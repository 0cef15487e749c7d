//! Pipeline runner - drives one run through the fixed stage sequence

use crate::backend::JobBackends;
use crate::core::{
    FailureCause, FailureKind, PipelineDefinition, RunContext, RunState, RunStatus, StageOutcome,
    StageRecord, TransitionError,
};
use crate::execution::task::{JobTask, StageResult};
use crate::persistence::{RunLog, RunSummary, StageLogEntry};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
        object_key: String,
    },
    StageStarted {
        run_id: Uuid,
        stage: String,
        index: usize,
    },
    StageCompleted {
        run_id: Uuid,
        stage: String,
        result: StageResult,
    },
    StageFailed {
        run_id: Uuid,
        stage: String,
        kind: FailureKind,
        error: String,
    },
    RunCompleted {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Everything a finished run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub pipeline_name: String,
    pub state: RunState,
    pub context: RunContext,
    pub records: Vec<StageRecord>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    /// Index and cause of the failing stage
    pub fn failure(&self) -> Option<(usize, &FailureCause)> {
        match &self.state {
            RunState::Failed { stage_index, cause } => Some((*stage_index, cause)),
            _ => None,
        }
    }

    pub fn object_key(&self) -> &str {
        self.context.source_object().unwrap_or_default()
    }

    /// Result recorded under `key`, if that stage completed
    pub fn result(&self, key: &str) -> Option<StageResult> {
        self.context.get(key).and_then(StageResult::from_value)
    }

    pub fn summary(&self, total_stages: usize) -> RunSummary {
        let failure = self.failure();
        RunSummary {
            run_id: self.run_id,
            pipeline_name: self.pipeline_name.clone(),
            object_key: self.object_key().to_string(),
            resource_name: self.context.resource_name.clone(),
            status: self.state.status(),
            failed_stage: failure.map(|(_, cause)| cause.stage.clone()),
            failure_kind: failure.map(|(_, cause)| cause.kind),
            error: failure.map(|(_, cause)| cause.message.clone()),
            started_at: self.started_at,
            completed_at: Some(self.completed_at),
            completed_stages: self.records.iter().filter(|r| r.succeeded()).count(),
            total_stages,
        }
    }
}

/// Executes pipeline runs against a set of backends
///
/// A runner is shared by every run a trigger starts; each `execute` call
/// owns its own context and state.
pub struct PipelineRunner {
    definition: Arc<PipelineDefinition>,
    backends: JobBackends,
    run_log: Option<Arc<dyn RunLog>>,
    event_handlers: Vec<EventHandler>,
}

impl PipelineRunner {
    pub fn new(definition: PipelineDefinition, backends: JobBackends) -> Self {
        Self {
            definition: Arc::new(definition),
            backends,
            run_log: None,
            event_handlers: Vec::new(),
        }
    }

    /// Record run history in `log`
    pub fn with_run_log(mut self, log: Arc<dyn RunLog>) -> Self {
        self.run_log = Some(log);
        self
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.event_handlers.push(Arc::new(handler));
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Emit an event to all handlers
    fn emit_event(&self, event: ExecutionEvent) {
        for handler in &self.event_handlers {
            handler(event.clone());
        }
    }

    /// Execute one run triggered by `object_key`
    ///
    /// Stage failures end the run in `Failed` and are reported in the
    /// returned report, not as an `Err`.
    pub async fn execute(&self, object_key: &str) -> Result<RunReport, TransitionError> {
        let definition = &self.definition;
        let total = definition.len();
        let mut context = definition.new_context(object_key);
        let mut state = RunState::NotStarted;
        let mut records = Vec::with_capacity(total);
        let run_id = context.run_id;
        let started_at = Utc::now();

        info!(
            "Starting pipeline run: {} ({}) for {}",
            definition.name, run_id, object_key
        );
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            pipeline_name: definition.name.clone(),
            object_key: object_key.to_string(),
        });

        state.start()?;

        while let Some(index) = state.current_stage() {
            let Some(stage) = definition.stage(index) else {
                break;
            };

            info!("Run {}: stage {}/{} {}", run_id, index + 1, total, stage.name);
            self.emit_event(ExecutionEvent::StageStarted {
                run_id,
                stage: stage.name.clone(),
                index,
            });

            let stage_started = Utc::now();
            let variables = definition.variables_for(&context);
            let invoked = JobTask::new(stage, &self.backends)
                .invoke(&context, &variables)
                .await;
            let outcome = invoked.and_then(|result| {
                context.insert(&stage.result_key, result.to_value())?;
                Ok(result)
            });

            let mut entry = StageLogEntry {
                run_id,
                stage: stage.name.clone(),
                index,
                outcome: StageOutcome::Succeeded,
                payload: None,
                recorded_at: Utc::now(),
            };

            match outcome {
                Ok(result) => {
                    info!("Run {}: stage {} completed (job {})", run_id, stage.name, result.job_id);
                    entry.payload = Some(result.to_value());
                    self.record_stage(&entry).await;
                    self.emit_event(ExecutionEvent::StageCompleted {
                        run_id,
                        stage: stage.name.clone(),
                        result,
                    });
                    state.advance(total)?;
                }
                Err(e) => {
                    let kind = e.kind();
                    let message = e.to_string();
                    error!("Run {}: stage {} failed with {}: {}", run_id, stage.name, kind, message);

                    entry.outcome = StageOutcome::Failed {
                        kind,
                        error: message.clone(),
                    };
                    self.record_stage(&entry).await;
                    self.emit_event(ExecutionEvent::StageFailed {
                        run_id,
                        stage: stage.name.clone(),
                        kind,
                        error: message.clone(),
                    });
                    state.fail(FailureCause {
                        kind,
                        stage: stage.name.clone(),
                        message,
                    })?;
                }
            }

            records.push(StageRecord {
                stage: stage.name.clone(),
                index,
                started_at: stage_started,
                finished_at: entry.recorded_at,
                outcome: entry.outcome,
            });
        }

        let report = RunReport {
            run_id,
            pipeline_name: definition.name.clone(),
            state,
            context,
            records,
            started_at,
            completed_at: Utc::now(),
        };

        let status = report.state.status();
        info!("Pipeline run {} finished: {}", run_id, status.as_str());

        if let Some(log) = &self.run_log {
            if let Err(e) = log.save_run(&report.summary(total)).await {
                warn!("Failed to save run {}: {:#}", run_id, e);
            }
        }
        self.emit_event(ExecutionEvent::RunCompleted { run_id, status });

        Ok(report)
    }

    async fn record_stage(&self, entry: &StageLogEntry) {
        if let Some(log) = &self.run_log {
            if let Err(e) = log.record_stage(entry).await {
                warn!("Failed to record stage {} of run {}: {:#}", entry.stage, entry.run_id, e);
            }
        }
    }
}
