//! Run context - accumulated per-run state

use crate::core::error::ContextError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

/// Context key seeded with the triggering object's key
pub const SOURCE_KEY: &str = "fileuri";

/// Execution context for one pipeline run
///
/// Entries are write-once: the seed entry set at trigger time, then one
/// entry per completed stage under that stage's result key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunContext {
    /// Unique run ID
    pub run_id: Uuid,

    /// Trigger timestamp (`%Y%m%dT%H%M%S`, UTC)
    pub uid: String,

    /// Name given to every backend resource this run creates
    pub resource_name: String,

    /// When the run was triggered
    pub triggered_at: DateTime<Utc>,

    entries: BTreeMap<String, Value>,
}

impl RunContext {
    /// Create a context for a new run triggered by `object_key`
    pub fn seeded(resource_prefix: &str, object_key: &str) -> Self {
        let run_id = Uuid::new_v4();
        let triggered_at = Utc::now();
        let uid = triggered_at.format("%Y%m%dT%H%M%S").to_string();
        let short_id = &run_id.simple().to_string()[..8];
        let resource_name = format!("{}-{}-{}", resource_prefix, uid, short_id);

        let mut entries = BTreeMap::new();
        entries.insert(SOURCE_KEY.to_string(), Value::String(object_key.to_string()));

        Self {
            run_id,
            uid,
            resource_name,
            triggered_at,
            entries,
        }
    }

    /// Record a value under a new key
    pub fn insert(&mut self, key: &str, value: Value) -> Result<(), ContextError> {
        if self.entries.contains_key(key) {
            return Err(ContextError::KeyExists {
                key: key.to_string(),
            });
        }
        self.entries.insert(key.to_string(), value);
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Keys in lexical order
    pub fn keys(&self) -> Vec<&str> {
        self.entries.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &BTreeMap<String, Value> {
        &self.entries
    }

    /// The object key that triggered this run
    pub fn source_object(&self) -> Option<&str> {
        self.entries.get(SOURCE_KEY).and_then(Value::as_str)
    }

    /// Resolve a `$.key.field...` reference to a scalar string
    pub fn resolve(&self, path: &str) -> Result<String, ContextError> {
        let unresolved = |reason: &str| ContextError::Unresolved {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        let rest = path
            .strip_prefix("$.")
            .ok_or_else(|| unresolved("reference must start with '$.'"))?;

        let mut segments = rest.split('.');
        let key = segments.next().filter(|k| !k.is_empty()).ok_or_else(|| unresolved("empty key"))?;
        let mut current = self
            .entries
            .get(key)
            .ok_or_else(|| unresolved("no such context entry"))?;

        for segment in segments {
            current = current
                .get(segment)
                .ok_or_else(|| unresolved("no such field"))?;
        }

        match current {
            Value::String(s) => Ok(s.clone()),
            Value::Number(n) => Ok(n.to_string()),
            Value::Bool(b) => Ok(b.to_string()),
            Value::Null => Err(unresolved("value is null")),
            _ => Err(unresolved("value is not a scalar")),
        }
    }

    /// Variables available for `{{ name }}` substitution in stage templates
    pub fn template_variables(&self) -> HashMap<String, String> {
        let mut vars = HashMap::new();
        vars.insert("run_id".to_string(), self.run_id.to_string());
        vars.insert("uid".to_string(), self.uid.clone());
        vars.insert("resource_name".to_string(), self.resource_name.clone());
        vars
    }
}
