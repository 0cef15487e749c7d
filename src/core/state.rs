//! Run state machine and execution records

use crate::core::error::FailureKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why a run ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureCause {
    pub kind: FailureKind,
    pub stage: String,
    pub message: String,
}

/// State of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    NotStarted,
    Running { stage_index: usize },
    Succeeded,
    Failed { stage_index: usize, cause: FailureCause },
}

/// Rejected state transition
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid run transition from {from} on {event}")]
pub struct TransitionError {
    pub from: &'static str,
    pub event: &'static str,
}

impl RunState {
    /// `NotStarted -> Running(0)`
    pub fn start(&mut self) -> Result<(), TransitionError> {
        match self {
            RunState::NotStarted => {
                *self = RunState::Running { stage_index: 0 };
                Ok(())
            }
            _ => Err(self.invalid("start")),
        }
    }

    /// `Running(i) -> Running(i+1)`, or `Running(last) -> Succeeded`
    pub fn advance(&mut self, stage_count: usize) -> Result<(), TransitionError> {
        match *self {
            RunState::Running { stage_index } if stage_index + 1 < stage_count => {
                *self = RunState::Running {
                    stage_index: stage_index + 1,
                };
                Ok(())
            }
            RunState::Running { stage_index } if stage_index + 1 == stage_count => {
                *self = RunState::Succeeded;
                Ok(())
            }
            _ => Err(self.invalid("advance")),
        }
    }

    /// `Running(i) -> Failed(i, cause)`
    pub fn fail(&mut self, cause: FailureCause) -> Result<(), TransitionError> {
        match *self {
            RunState::Running { stage_index } => {
                *self = RunState::Failed { stage_index, cause };
                Ok(())
            }
            _ => Err(self.invalid("fail")),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Succeeded | RunState::Failed { .. })
    }

    /// Index of the stage currently executing
    pub fn current_stage(&self) -> Option<usize> {
        match self {
            RunState::Running { stage_index } => Some(*stage_index),
            _ => None,
        }
    }

    pub fn status(&self) -> RunStatus {
        match self {
            RunState::NotStarted => RunStatus::NotStarted,
            RunState::Running { .. } => RunStatus::Running,
            RunState::Succeeded => RunStatus::Succeeded,
            RunState::Failed { .. } => RunStatus::Failed,
        }
    }

    fn invalid(&self, event: &'static str) -> TransitionError {
        TransitionError {
            from: self.status().as_str(),
            event,
        }
    }
}

/// Coarse run status, as stored in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    NotStarted,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::NotStarted => "NotStarted",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Running" => RunStatus::Running,
            "Succeeded" => RunStatus::Succeeded,
            "Failed" => RunStatus::Failed,
            _ => RunStatus::NotStarted,
        }
    }
}

/// State of a single poll loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Pending,
    Succeeded,
    Failed,
    TimedOut,
}

impl PollState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollState::Pending)
    }
}

/// Outcome of one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageOutcome {
    Succeeded,
    Failed { kind: FailureKind, error: String },
}

/// Timing record for one executed stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: String,
    pub index: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: StageOutcome,
}

impl StageRecord {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, StageOutcome::Succeeded)
    }
}
