//! Pipeline configuration from YAML

use crate::backend::{ResourceSpec, RESOURCE_PENDING};
use crate::core::context::SOURCE_KEY;
use crate::core::pipeline::STAGE_LAYOUT;
use crate::core::stage::ValueSource;
use crate::execution::PollPolicy;
use anyhow::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::time::Duration;

/// Longest prefix that still leaves room for `-{uid}-{run}` within the
/// 63 character backend name limit
const MAX_RESOURCE_PREFIX_LEN: usize = 38;

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Pipeline version (optional)
    #[serde(default)]
    pub version: Option<String>,

    /// Region the backends run in; selects the default algorithm image
    pub region: String,

    /// Bucket holding pipeline inputs and artifacts
    pub bucket: String,

    /// Explicit algorithm image, overriding the region lookup
    #[serde(default)]
    pub image_uri: Option<String>,

    /// Prefix of the per-run backend resource name
    #[serde(default = "default_resource_name_prefix")]
    pub resource_name_prefix: String,

    /// Which object creations start a run
    pub trigger: TriggerConfig,

    /// Default poll policy for async stages
    #[serde(default)]
    pub poll: PollConfig,

    /// The five pipeline stages
    pub stages: StagesConfig,
}

/// Object-creation filter
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerConfig {
    #[serde(default)]
    pub prefix: String,

    #[serde(default)]
    pub suffix: String,
}

/// Poll policy as written in YAML
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    #[serde(default = "default_backoff_rate")]
    pub backoff_rate: f64,

    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Backend error codes treated as "still pending"
    #[serde(default = "default_retryable_errors")]
    pub retryable_errors: Vec<String>,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            backoff_rate: default_backoff_rate(),
            max_attempts: default_max_attempts(),
            retryable_errors: default_retryable_errors(),
        }
    }
}

impl PollConfig {
    pub fn to_policy(&self) -> PollPolicy {
        PollPolicy {
            interval: Duration::from_secs(self.interval_secs),
            backoff_rate: self.backoff_rate,
            max_attempts: self.max_attempts,
            retryable_errors: self.retryable_errors.clone(),
        }
    }
}

/// The fixed stage sequence; one field per stage, no list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StagesConfig {
    pub preprocess: StageConfig,
    pub train: StageConfig,
    pub register_model: StageConfig,
    pub batch_transform: StageConfig,
    pub postprocess: StageConfig,
}

impl StagesConfig {
    /// Stage configs in execution order
    pub fn ordered(&self) -> [&StageConfig; 5] {
        [
            &self.preprocess,
            &self.train,
            &self.register_model,
            &self.batch_transform,
            &self.postprocess,
        ]
    }
}

/// Configuration of one stage's job
///
/// String values may contain `{{ bucket }}`, `{{ region }}`,
/// `{{ resource_name }}` or `{{ uid }}`. A value of the form `$.key.path`
/// is read from the run context when the stage starts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StageConfig {
    /// Backend job name (defaults to the run's resource name)
    #[serde(default)]
    pub job_name: Option<String>,

    /// Script location for ETL stages
    #[serde(default)]
    pub script: Option<String>,

    #[serde(default)]
    pub arguments: BTreeMap<String, String>,

    /// Input channels (channel name -> location)
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,

    #[serde(default)]
    pub output: Option<String>,

    #[serde(default)]
    pub hyperparameters: BTreeMap<String, String>,

    #[serde(default)]
    pub resources: Option<ResourceSpec>,

    #[serde(default)]
    pub max_runtime_secs: Option<u64>,

    /// Kind-specific options passed to the backend untouched
    #[serde(default)]
    pub options: BTreeMap<String, Value>,

    /// Poll policy override for this stage
    #[serde(default)]
    pub poll: Option<PollConfig>,
}

impl StageConfig {
    /// Every value that may hold a context reference
    fn bound_values(&self) -> impl Iterator<Item = &String> {
        self.job_name
            .iter()
            .chain(self.script.iter())
            .chain(self.arguments.values())
            .chain(self.inputs.values())
            .chain(self.output.iter())
    }
}

fn default_resource_name_prefix() -> String {
    "MLOps-Pipeline".to_string()
}

fn default_interval_secs() -> u64 {
    30
}

fn default_backoff_rate() -> f64 {
    1.0
}

fn default_max_attempts() -> u32 {
    600
}

fn default_retryable_errors() -> Vec<String> {
    vec![RESOURCE_PENDING.to_string()]
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// The DeepAR forecasting pipeline: preprocess a zipped dataset, train,
    /// register the model, batch-forecast and convert the forecast to CSV
    pub fn deepar(bucket: &str, region: &str) -> Self {
        let map = |pairs: &[(&str, &str)]| -> BTreeMap<String, String> {
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        let instance = ResourceSpec {
            instance_type: "ml.c4.2xlarge".to_string(),
            instance_count: 1,
            volume_size_gb: None,
        };

        let preprocess = StageConfig {
            job_name: Some("DeepAR-MLOps-Preprocess".to_string()),
            script: Some("s3://{{ bucket }}/glue/preprocess.py".to_string()),
            arguments: map(&[("--bucket", "{{ bucket }}"), ("--fileuri", "$.fileuri")]),
            output: Some("s3://{{ bucket }}/json".to_string()),
            ..Default::default()
        };

        let train = StageConfig {
            inputs: map(&[
                ("train", "s3://{{ bucket }}/json/train"),
                ("test", "s3://{{ bucket }}/json/test"),
            ]),
            output: Some("s3://{{ bucket }}/model".to_string()),
            hyperparameters: map(&[
                ("time_freq", "2H"),
                ("epochs", "400"),
                ("early_stopping_patience", "40"),
                ("mini_batch_size", "64"),
                ("learning_rate", "5E-4"),
                ("context_length", "84"),
                ("prediction_length", "84"),
            ]),
            resources: Some(ResourceSpec {
                volume_size_gb: Some(100),
                ..instance.clone()
            }),
            max_runtime_secs: Some(3 * 60 * 60),
            ..Default::default()
        };

        let register_model = StageConfig {
            inputs: map(&[("model_data", "$.train.output_location")]),
            options: [("mode".to_string(), Value::from("SingleModel"))]
                .into_iter()
                .collect(),
            ..Default::default()
        };

        let batch_transform = StageConfig {
            inputs: map(&[("data", "s3://{{ bucket }}/json/train")]),
            output: Some("s3://{{ bucket }}/json/forecast".to_string()),
            resources: Some(instance),
            options: [
                ("model_name", Value::from("$.model.job_id")),
                ("batch_strategy", Value::from("SingleRecord")),
                ("split_type", Value::from("Line")),
                ("assemble_with", Value::from("Line")),
                ("invocations_max_retries", Value::from(3)),
                ("invocations_timeout_secs", Value::from(300)),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
            ..Default::default()
        };

        let postprocess = StageConfig {
            job_name: Some("DeepAR-MLOps-Postprocess".to_string()),
            script: Some("s3://{{ bucket }}/glue/postprocess.py".to_string()),
            arguments: map(&[
                ("--bucket", "{{ bucket }}"),
                ("--forecastdir", "$.transform.output_location"),
            ]),
            output: Some("s3://{{ bucket }}/csv".to_string()),
            ..Default::default()
        };

        Self {
            name: "DeepAR-MLOps-Pipeline".to_string(),
            version: None,
            region: region.to_string(),
            bucket: bucket.to_string(),
            image_uri: None,
            resource_name_prefix: "DeepAR-MLOps-Pipeline".to_string(),
            trigger: TriggerConfig {
                prefix: "raw/".to_string(),
                suffix: ".zip".to_string(),
            },
            poll: PollConfig::default(),
            stages: StagesConfig {
                preprocess,
                train,
                register_model,
                batch_transform,
                postprocess,
            },
        }
    }

    /// Validate the pipeline configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Pipeline name cannot be empty");
        }
        if self.bucket.trim().is_empty() {
            anyhow::bail!("Bucket cannot be empty");
        }

        let name_pattern = Regex::new(r"^[a-zA-Z0-9](-*[a-zA-Z0-9])*$")?;
        if !name_pattern.is_match(&self.resource_name_prefix) {
            anyhow::bail!(
                "resource_name_prefix '{}' must be alphanumeric with single hyphens",
                self.resource_name_prefix
            );
        }
        if self.resource_name_prefix.len() > MAX_RESOURCE_PREFIX_LEN {
            anyhow::bail!(
                "resource_name_prefix '{}' is longer than {} characters",
                self.resource_name_prefix,
                MAX_RESOURCE_PREFIX_LEN
            );
        }

        self.poll
            .to_policy()
            .validate()
            .map_err(|e| anyhow::anyhow!("Invalid default poll policy: {}", e))?;

        if self.image_uri.is_none() && crate::core::images::deepar_image_uri(&self.region).is_none() {
            anyhow::bail!(
                "No algorithm image known for region '{}'; set image_uri explicitly",
                self.region
            );
        }

        self.check_references()
    }

    /// Check that every context reference points at the seed entry or at a
    /// stage that runs earlier
    fn check_references(&self) -> Result<()> {
        let mut available: HashSet<&str> = HashSet::new();
        available.insert(SOURCE_KEY);

        for (slot, stage) in STAGE_LAYOUT.iter().zip(self.stages.ordered()) {
            if let Some(poll) = &stage.poll {
                poll.to_policy().validate().map_err(|e| {
                    anyhow::anyhow!("Stage '{}' has an invalid poll policy: {}", slot.name, e)
                })?;
            }

            let option_refs = stage.options.values().filter_map(Value::as_str);
            for raw in stage.bound_values().map(String::as_str).chain(option_refs) {
                if let ValueSource::ContextRef(path) = ValueSource::parse(raw) {
                    let key = path
                        .strip_prefix("$.")
                        .and_then(|rest| rest.split('.').next())
                        .unwrap_or_default();
                    if !available.contains(key) {
                        anyhow::bail!(
                            "Stage '{}' references '{}', which is not produced before it runs",
                            slot.name,
                            path
                        );
                    }
                }
            }

            available.insert(slot.result_key);
        }

        Ok(())
    }

    /// Default poll policy for a stage
    pub fn poll_policy_for(&self, stage: &StageConfig) -> PollPolicy {
        stage.poll.as_ref().unwrap_or(&self.poll).to_policy()
    }

    /// Image for async stages
    pub fn resolved_image(&self) -> Option<String> {
        self.image_uri
            .clone()
            .or_else(|| crate::core::images::deepar_image_uri(&self.region))
    }
}
