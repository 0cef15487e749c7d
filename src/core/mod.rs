//! Core domain models
//!
//! This module defines the pipeline definition, its stages, the per-run
//! context and the run state machine.

pub mod config;
pub mod context;
pub mod error;
pub mod images;
pub mod pipeline;
pub mod stage;
pub mod state;

pub use config::PipelineConfig;
pub use context::{RunContext, SOURCE_KEY};
pub use error::{ContextError, FailureKind, JobError};
pub use pipeline::{PipelineDefinition, StageSlot, STAGE_LAYOUT};
pub use stage::{JobTemplate, PipelineStage, ValueSource};
pub use state::{
    FailureCause, PollState, RunState, RunStatus, StageOutcome, StageRecord, TransitionError,
};
