//! Event trigger - storage notifications to pipeline runs

use crate::core::config::TriggerConfig;
use crate::execution::runner::{PipelineRunner, RunReport};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info};

/// Kind of storage notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageEventKind {
    ObjectCreated,
    ObjectRemoved,
    Other(String),
}

impl StorageEventKind {
    /// Classify an S3 `eventName` such as `ObjectCreated:Put`
    pub fn from_event_name(name: &str) -> Self {
        if name.starts_with("ObjectCreated") {
            StorageEventKind::ObjectCreated
        } else if name.starts_with("ObjectRemoved") {
            StorageEventKind::ObjectRemoved
        } else {
            StorageEventKind::Other(name.to_string())
        }
    }
}

/// A single object-storage notification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub bucket: String,
    pub key: String,
    pub kind: StorageEventKind,
}

#[derive(Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<NotificationRecord>,
}

#[derive(Deserialize)]
struct NotificationRecord {
    #[serde(rename = "eventName")]
    event_name: String,
    s3: S3Entity,
}

#[derive(Deserialize)]
struct S3Entity {
    bucket: S3Bucket,
    object: S3Object,
}

#[derive(Deserialize)]
struct S3Bucket {
    name: String,
}

#[derive(Deserialize)]
struct S3Object {
    key: String,
}

impl StorageEvent {
    pub fn object_created(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            kind: StorageEventKind::ObjectCreated,
        }
    }

    /// Parse every record of an S3 event notification document
    pub fn from_s3_notification(json: &str) -> Result<Vec<StorageEvent>> {
        let notification: Notification =
            serde_json::from_str(json).context("Failed to parse storage notification")?;

        Ok(notification
            .records
            .into_iter()
            .map(|record| StorageEvent {
                kind: StorageEventKind::from_event_name(&record.event_name),
                bucket: record.s3.bucket.name,
                key: record.s3.object.key,
            })
            .collect())
    }
}

/// Object key filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerRule {
    pub prefix: String,
    pub suffix: String,
}

impl TriggerRule {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    pub fn matches(&self, key: &str) -> bool {
        key.starts_with(&self.prefix) && key.ends_with(&self.suffix)
    }
}

impl From<&TriggerConfig> for TriggerRule {
    fn from(config: &TriggerConfig) -> Self {
        Self::new(config.prefix.clone(), config.suffix.clone())
    }
}

/// Starts one independent run per matching storage event
pub struct EventTrigger {
    rule: TriggerRule,
    bucket: Option<String>,
    runner: Arc<PipelineRunner>,
}

impl EventTrigger {
    pub fn new(rule: TriggerRule, runner: Arc<PipelineRunner>) -> Self {
        Self {
            rule,
            bucket: None,
            runner,
        }
    }

    /// Only accept events from `bucket`
    pub fn scoped_to(mut self, bucket: impl Into<String>) -> Self {
        self.bucket = Some(bucket.into());
        self
    }

    pub fn rule(&self) -> &TriggerRule {
        &self.rule
    }

    /// Whether `event` should start a run
    pub fn accepts(&self, event: &StorageEvent) -> bool {
        event.kind == StorageEventKind::ObjectCreated
            && self.bucket.as_deref().map_or(true, |b| b == event.bucket)
            && self.rule.matches(&event.key)
    }

    /// Start a run for `event` if it matches the rule
    pub fn on_object_created(
        &self,
        event: StorageEvent,
    ) -> Option<JoinHandle<Option<RunReport>>> {
        if !self.accepts(&event) {
            debug!("Ignoring {:?} event for {}/{}", event.kind, event.bucket, event.key);
            return None;
        }

        info!("Triggering run for {}/{}", event.bucket, event.key);
        Some(tokio::spawn(run(self.runner.clone(), event.key)))
    }

    /// Consume events until the channel closes, then wait for every run
    pub async fn watch(&self, mut events: mpsc::Receiver<StorageEvent>) -> Vec<RunReport> {
        let mut runs = JoinSet::new();
        let mut reports = Vec::new();

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) if self.accepts(&event) => {
                        info!("Triggering run for {}/{}", event.bucket, event.key);
                        runs.spawn(run(self.runner.clone(), event.key));
                    }
                    Some(event) => {
                        debug!("Ignoring {:?} event for {}/{}", event.kind, event.bucket, event.key);
                    }
                    None => break,
                },
                Some(joined) = runs.join_next(), if !runs.is_empty() => {
                    collect(joined, &mut reports);
                }
            }
        }

        while let Some(joined) = runs.join_next().await {
            collect(joined, &mut reports);
        }
        reports
    }
}

async fn run(runner: Arc<PipelineRunner>, key: String) -> Option<RunReport> {
    match runner.execute(&key).await {
        Ok(report) => Some(report),
        Err(e) => {
            error!("Run for {} aborted: {}", key, e);
            None
        }
    }
}

fn collect(
    joined: std::result::Result<Option<RunReport>, tokio::task::JoinError>,
    reports: &mut Vec<RunReport>,
) {
    match joined {
        Ok(Some(report)) => reports.push(report),
        Ok(None) => {}
        Err(e) => error!("Run task failed: {}", e),
    }
}
