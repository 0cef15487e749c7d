//! Error types for stage execution

use crate::backend::{BackendError, JobHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by run context operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
    #[error("context key '{key}' is already set")]
    KeyExists { key: String },

    #[error("cannot resolve '{path}': {reason}")]
    Unresolved { path: String, reason: String },
}

/// Error that ends a stage (and therefore the run)
#[derive(Debug, Clone, Error)]
pub enum JobError {
    /// Backend rejected the job request
    #[error("job submission rejected: {0}")]
    Submit(BackendError),

    /// Status check failed for a reason other than "still pending"
    #[error("status check for {handle} failed: {source}")]
    Status {
        handle: JobHandle,
        #[source]
        source: BackendError,
    },

    /// Poll attempts exhausted while the job was still pending
    #[error("job {handle} still pending after {attempts} status checks")]
    PendingTimeout { handle: JobHandle, attempts: u32 },

    /// Synchronous job failed
    #[error("job failed: {0}")]
    Backend(BackendError),

    /// A stage input could not be built from the run context
    #[error("unresolved input '{path}': {reason}")]
    MissingInput { path: String, reason: String },

    #[error(transparent)]
    Context(#[from] ContextError),
}

impl JobError {
    pub fn kind(&self) -> FailureKind {
        match self {
            JobError::Submit(_) => FailureKind::Submit,
            JobError::Status { .. } => FailureKind::Status,
            JobError::PendingTimeout { .. } => FailureKind::PendingTimeout,
            JobError::Backend(_) => FailureKind::Backend,
            JobError::MissingInput { .. } => FailureKind::MissingInput,
            JobError::Context(_) => FailureKind::Context,
        }
    }

    /// The backend fault that caused this error, if any
    pub fn backend_error(&self) -> Option<&BackendError> {
        match self {
            JobError::Submit(e) | JobError::Backend(e) => Some(e),
            JobError::Status { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Classification of a terminal stage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    Submit,
    Status,
    PendingTimeout,
    Backend,
    MissingInput,
    Context,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Submit => "SubmitError",
            FailureKind::Status => "StatusError",
            FailureKind::PendingTimeout => "PendingTimeout",
            FailureKind::Backend => "BackendError",
            FailureKind::MissingInput => "MissingInput",
            FailureKind::Context => "ContextError",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "SubmitError" => Some(FailureKind::Submit),
            "StatusError" => Some(FailureKind::Status),
            "PendingTimeout" => Some(FailureKind::PendingTimeout),
            "BackendError" => Some(FailureKind::Backend),
            "MissingInput" => Some(FailureKind::MissingInput),
            "ContextError" => Some(FailureKind::Context),
            _ => None,
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
