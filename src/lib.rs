//! mlops-pipeline - storage-triggered orchestration for multi-stage ML pipelines

pub mod backend;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use self::backend::{AsyncJobBackend, BackendError, JobBackends, JobSpec, SimulatedBackend, SyncJobBackend};
pub use self::core::{FailureKind, JobError, PipelineConfig, PipelineDefinition, RunContext, RunState};
pub use self::execution::{EventTrigger, ExecutionEvent, PipelineRunner, PollPolicy, RunReport, StorageEvent};
