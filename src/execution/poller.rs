//! Polling invoker - bounded status polling for async backends

use crate::backend::{BackendError, JobHandle, JobOutput, JobStatus, RESOURCE_PENDING};
use crate::core::{JobError, PollState};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Retry policy for one async stage
#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Wait after the first pending check
    pub interval: Duration,

    /// Multiplier applied to the wait after each further pending check
    pub backoff_rate: f64,

    /// Total number of status checks before giving up
    pub max_attempts: u32,

    /// Backend error codes that mean "still pending"
    pub retryable_errors: Vec<String>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            backoff_rate: 1.0,
            max_attempts: 600,
            retryable_errors: vec![RESOURCE_PENDING.to_string()],
        }
    }
}

/// Policy values that cannot drive a poll loop
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("interval must be greater than zero")]
    ZeroInterval,

    #[error("backoff_rate must be >= 1.0 (got {0})")]
    BackoffBelowOne(f64),
}

impl PollPolicy {
    /// Constant interval with the default retryable set
    pub fn fixed(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts,
            ..Self::default()
        }
    }

    /// Also treat `code` as a pending signal
    pub fn with_retryable(mut self, code: impl Into<String>) -> Self {
        self.retryable_errors.push(code.into());
        self
    }

    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if self.interval.is_zero() {
            return Err(PolicyError::ZeroInterval);
        }
        if !(self.backoff_rate >= 1.0) {
            return Err(PolicyError::BackoffBelowOne(self.backoff_rate));
        }
        Ok(())
    }

    pub fn is_retryable(&self, error: &BackendError) -> bool {
        self.retryable_errors.iter().any(|code| *code == error.code)
    }

    /// Wait after the `attempt`-th (1-based) pending check
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let factor = self.backoff_rate.powi(exponent);
        Duration::try_from_secs_f64(self.interval.as_secs_f64() * factor).unwrap_or(Duration::MAX)
    }

    /// Total time spent sleeping if every check reports pending
    pub fn worst_case_wait(&self) -> Duration {
        (1..self.max_attempts)
            .map(|attempt| self.delay_after(attempt))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}

/// Runs a bounded status poll loop for one job handle
#[derive(Debug, Clone)]
pub struct PollingInvoker {
    policy: PollPolicy,
}

impl PollingInvoker {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &PollPolicy {
        &self.policy
    }

    /// Poll `check` until the job succeeds, fails, or attempts run out
    ///
    /// Each attempt calls `check` exactly once. A pending status, or an
    /// error whose code is in the retryable set, consumes an attempt and
    /// sleeps before the next one; no sleep follows the final attempt.
    /// Any other error ends the loop immediately.
    pub async fn poll<F, Fut>(&self, handle: &JobHandle, mut check: F) -> Result<JobOutput, JobError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<JobStatus, BackendError>>,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        let (state, result) = loop {
            attempt += 1;

            match check().await {
                Ok(JobStatus::Succeeded(output)) => break (PollState::Succeeded, Ok(output)),
                Ok(JobStatus::Pending) => {
                    debug!("Job {} pending (attempt {}/{})", handle, attempt, max_attempts);
                }
                Err(e) if self.policy.is_retryable(&e) => {
                    debug!("Job {} pending: {} (attempt {}/{})", handle, e, attempt, max_attempts);
                }
                Err(e) => {
                    warn!("Status check for job {} failed: {}", handle, e);
                    break (
                        PollState::Failed,
                        Err(JobError::Status {
                            handle: handle.clone(),
                            source: e,
                        }),
                    );
                }
            }

            if attempt >= max_attempts {
                warn!("Job {} still pending after {} status checks", handle, attempt);
                break (
                    PollState::TimedOut,
                    Err(JobError::PendingTimeout {
                        handle: handle.clone(),
                        attempts: attempt,
                    }),
                );
            }

            tokio::time::sleep(self.policy.delay_after(attempt)).await;
        };

        info!("Poll loop for job {} ended {:?} after {} checks", handle, state, attempt);
        result
    }
}
