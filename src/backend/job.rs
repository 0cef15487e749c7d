//! Job request and response types exchanged with backends

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The kind of external job a stage submits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Extract-transform-load script run (preprocess / postprocess)
    Etl,
    /// Model training job
    Training,
    /// Model registration from training artifacts
    Model,
    /// Batch inference over a dataset
    Transform,
}

impl JobKind {
    /// Whether the backend for this kind only exposes submit + status check
    pub fn is_async(&self) -> bool {
        !matches!(self, JobKind::Etl)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::Etl => "etl",
            JobKind::Training => "training",
            JobKind::Model => "model",
            JobKind::Transform => "transform",
        };
        f.write_str(name)
    }
}

/// Compute sizing for a job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    pub instance_type: String,

    #[serde(default = "default_instance_count")]
    pub instance_count: u32,

    /// Attached volume size in GiB
    #[serde(default)]
    pub volume_size_gb: Option<u32>,
}

fn default_instance_count() -> u32 {
    1
}

/// Fully resolved job request
///
/// Built once per stage invocation; every context reference has already
/// been substituted with a concrete value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSpec {
    /// Pipeline stage that produced this request
    pub stage: String,

    pub kind: JobKind,

    /// Backend-visible job name
    pub job_name: String,

    /// Container image for async kinds
    pub image: Option<String>,

    /// Script location for ETL kinds
    pub script: Option<String>,

    /// Named job arguments (e.g. `--fileuri`)
    pub arguments: BTreeMap<String, String>,

    /// Named input channels mapped to storage locations
    pub inputs: BTreeMap<String, String>,

    /// Output location, if the job writes one
    pub output: Option<String>,

    pub hyperparameters: BTreeMap<String, String>,

    pub resources: Option<ResourceSpec>,

    /// Backend-side runtime cap in seconds
    pub max_runtime_secs: Option<u64>,

    /// Kind-specific options passed through untouched
    pub options: BTreeMap<String, Value>,
}

/// Identifier returned by an asynchronous submit call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Terminal payload of a finished job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub job_id: String,

    /// Where the job wrote its artifacts
    pub output_location: Option<String>,

    /// Backend-specific description of the finished job
    #[serde(default)]
    pub details: Value,
}

impl JobOutput {
    pub fn new(job_id: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            output_location: None,
            details: Value::Null,
        }
    }

    pub fn with_output_location(mut self, location: impl Into<String>) -> Self {
        self.output_location = Some(location.into());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Result of one status check
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    /// Job is still running
    Pending,
    /// Job finished successfully
    Succeeded(JobOutput),
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded(_))
    }
}
