//! Stage domain model

use crate::backend::{JobKind, JobSpec, ResourceSpec};
use crate::core::config::StageConfig;
use crate::core::context::RunContext;
use crate::core::error::{ContextError, JobError};
use crate::execution::PollPolicy;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// A value in a stage template: either literal text (with `{{ var }}`
/// placeholders) or a reference into the run context
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    Literal(String),
    ContextRef(String),
}

impl ValueSource {
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with("$.") {
            ValueSource::ContextRef(raw.to_string())
        } else {
            ValueSource::Literal(raw.to_string())
        }
    }

    /// Produce the concrete value for one run
    pub fn resolve(
        &self,
        context: &RunContext,
        variables: &HashMap<String, String>,
    ) -> Result<String, JobError> {
        match self {
            ValueSource::Literal(template) => Ok(render_template(template, variables)),
            ValueSource::ContextRef(path) => context.resolve(path).map_err(|e| match e {
                ContextError::Unresolved { path, reason } => JobError::MissingInput { path, reason },
                other => JobError::Context(other),
            }),
        }
    }
}

/// Replace `{{ name }}` placeholders
pub fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = template.to_string();
    for (key, value) in variables {
        let placeholder = format!("{{{{ {} }}}}", key);
        rendered = rendered.replace(&placeholder, value);
    }
    rendered
}

/// Static description of the job a stage submits
#[derive(Debug, Clone)]
pub struct JobTemplate {
    pub kind: JobKind,
    pub job_name: ValueSource,
    pub image: Option<String>,
    pub script: Option<ValueSource>,
    pub arguments: BTreeMap<String, ValueSource>,
    pub inputs: BTreeMap<String, ValueSource>,
    pub output: Option<ValueSource>,
    pub hyperparameters: BTreeMap<String, String>,
    pub resources: Option<ResourceSpec>,
    pub max_runtime_secs: Option<u64>,
    pub options: BTreeMap<String, Value>,
}

impl JobTemplate {
    pub fn from_config(kind: JobKind, config: &StageConfig, image: Option<String>) -> Self {
        let bind = |m: &BTreeMap<String, String>| -> BTreeMap<String, ValueSource> {
            m.iter()
                .map(|(k, v)| (k.clone(), ValueSource::parse(v)))
                .collect()
        };

        JobTemplate {
            kind,
            job_name: ValueSource::parse(
                config.job_name.as_deref().unwrap_or("{{ resource_name }}"),
            ),
            image: if kind.is_async() { image } else { None },
            script: config.script.as_deref().map(ValueSource::parse),
            arguments: bind(&config.arguments),
            inputs: bind(&config.inputs),
            output: config.output.as_deref().map(ValueSource::parse),
            hyperparameters: config.hyperparameters.clone(),
            resources: config.resources.clone(),
            max_runtime_secs: config.max_runtime_secs,
            options: config.options.clone(),
        }
    }

    /// Build the job request for one run
    ///
    /// Fails without side effects if any input cannot be resolved.
    pub fn build(
        &self,
        stage: &str,
        context: &RunContext,
        variables: &HashMap<String, String>,
    ) -> Result<JobSpec, JobError> {
        let resolve_map = |m: &BTreeMap<String, ValueSource>| -> Result<BTreeMap<String, String>, JobError> {
            m.iter()
                .map(|(k, v)| -> Result<(String, String), JobError> {
                    Ok((k.clone(), v.resolve(context, variables)?))
                })
                .collect()
        };

        let mut options = BTreeMap::new();
        for (key, value) in &self.options {
            let resolved = match value {
                Value::String(raw) => {
                    Value::String(ValueSource::parse(raw).resolve(context, variables)?)
                }
                other => other.clone(),
            };
            options.insert(key.clone(), resolved);
        }

        Ok(JobSpec {
            stage: stage.to_string(),
            kind: self.kind,
            job_name: self.job_name.resolve(context, variables)?,
            image: self.image.clone(),
            script: self
                .script
                .as_ref()
                .map(|s| s.resolve(context, variables))
                .transpose()?,
            arguments: resolve_map(&self.arguments)?,
            inputs: resolve_map(&self.inputs)?,
            output: self
                .output
                .as_ref()
                .map(|o| o.resolve(context, variables))
                .transpose()?,
            hyperparameters: self.hyperparameters.clone(),
            resources: self.resources.clone(),
            max_runtime_secs: self.max_runtime_secs,
            options,
        })
    }
}

/// A single stage in a pipeline
#[derive(Debug, Clone)]
pub struct PipelineStage {
    /// Stage name (e.g. `register-model`)
    pub name: String,

    /// Run context key the stage result is stored under
    pub result_key: String,

    pub template: JobTemplate,

    /// Poll policy for async stages; `None` for ETL stages
    pub poll: Option<PollPolicy>,
}

impl PipelineStage {
    pub fn kind(&self) -> JobKind {
        self.template.kind
    }
}
