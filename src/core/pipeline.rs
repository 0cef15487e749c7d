//! Pipeline definition - the fixed, ordered stage list

use crate::backend::JobKind;
use crate::core::{
    config::PipelineConfig,
    context::RunContext,
    stage::{JobTemplate, PipelineStage},
};
use crate::execution::PollPolicy;
use std::collections::HashMap;
use std::time::Duration;

/// Position of a stage in the fixed sequence
#[derive(Debug, Clone, Copy)]
pub struct StageSlot {
    pub name: &'static str,
    pub result_key: &'static str,
    pub kind: JobKind,
}

/// preprocess -> train -> register-model -> batch-transform -> postprocess
pub const STAGE_LAYOUT: [StageSlot; 5] = [
    StageSlot {
        name: "preprocess",
        result_key: "preprocess",
        kind: JobKind::Etl,
    },
    StageSlot {
        name: "train",
        result_key: "train",
        kind: JobKind::Training,
    },
    StageSlot {
        name: "register-model",
        result_key: "model",
        kind: JobKind::Model,
    },
    StageSlot {
        name: "batch-transform",
        result_key: "transform",
        kind: JobKind::Transform,
    },
    StageSlot {
        name: "postprocess",
        result_key: "postprocess",
        kind: JobKind::Etl,
    },
];

/// A pipeline definition
#[derive(Debug, Clone)]
pub struct PipelineDefinition {
    /// Pipeline name
    pub name: String,

    /// Prefix of each run's resource name
    pub resource_name_prefix: String,

    /// Variables available to every stage template
    pub variables: HashMap<String, String>,

    stages: Vec<PipelineStage>,
}

impl PipelineDefinition {
    /// Create a pipeline from configuration
    pub fn from_config(config: &PipelineConfig) -> Self {
        let image = config.resolved_image();

        let stages = STAGE_LAYOUT
            .iter()
            .zip(config.stages.ordered())
            .map(|(slot, stage_config)| PipelineStage {
                name: slot.name.to_string(),
                result_key: slot.result_key.to_string(),
                template: JobTemplate::from_config(slot.kind, stage_config, image.clone()),
                poll: slot
                    .kind
                    .is_async()
                    .then(|| config.poll_policy_for(stage_config)),
            })
            .collect();

        let mut variables = HashMap::new();
        variables.insert("bucket".to_string(), config.bucket.clone());
        variables.insert("region".to_string(), config.region.clone());

        PipelineDefinition {
            name: config.name.clone(),
            resource_name_prefix: config.resource_name_prefix.clone(),
            variables,
            stages,
        }
    }

    /// Replace the poll policy of every async stage
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        for stage in &mut self.stages {
            if stage.poll.is_some() {
                stage.poll = Some(policy.clone());
            }
        }
        self
    }

    /// Change only the poll interval of every async stage
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        for policy in self.stages.iter_mut().filter_map(|s| s.poll.as_mut()) {
            policy.interval = interval;
        }
        self
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn stage(&self, index: usize) -> Option<&PipelineStage> {
        self.stages.get(index)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name.as_str()).collect()
    }

    /// Fresh context for a run triggered by `object_key`
    pub fn new_context(&self, object_key: &str) -> RunContext {
        RunContext::seeded(&self.resource_name_prefix, object_key)
    }

    /// Template variables for one run
    pub fn variables_for(&self, context: &RunContext) -> HashMap<String, String> {
        let mut vars = self.variables.clone();
        vars.extend(context.template_variables());
        vars
    }
}
