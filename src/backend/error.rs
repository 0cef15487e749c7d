//! Backend error types

use thiserror::Error;

/// Error code a status check uses to signal "job not finished yet"
pub const RESOURCE_PENDING: &str = "ResourcePending";

/// Error returned by any backend call
///
/// Backends classify their faults with a string `code`; the poll loop
/// decides retryability by matching codes against its policy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct BackendError {
    pub code: String,
    pub message: String,
}

impl BackendError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    /// A "still running" signal raised as an error
    pub fn pending(message: impl Into<String>) -> Self {
        Self::new(RESOURCE_PENDING, message)
    }

    pub fn is_pending(&self) -> bool {
        self.code == RESOURCE_PENDING
    }
}
