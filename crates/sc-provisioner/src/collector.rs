//! Compute context collector
//!
//! Resources provisioned for one `(stack, environment)` leave behind the
//! environment variables, secrets and outputs that workloads consuming them
//! need. The collector gathers them during a program run; values may be
//! output references that the engine resolves when the context is exported.

use crate::engine::ResourceRef;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Environment variable name for one value of a resource, e.g.
/// `env_name("media-assets", "bucket")` is `MEDIA_ASSETS_BUCKET`
pub fn env_name(resource: &str, suffix: &str) -> String {
    format!("{}_{}", resource, suffix)
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// What one resource contributes to the workloads using it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceContext {
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
    #[serde(default)]
    pub secret_env: BTreeMap<String, Value>,
    #[serde(default)]
    pub outputs: BTreeMap<String, Value>,
}

impl ResourceContext {
    pub fn is_empty(&self) -> bool {
        self.env.is_empty() && self.secret_env.is_empty() && self.outputs.is_empty()
    }
}

#[derive(Default)]
struct Collected {
    resources: BTreeMap<String, ResourceContext>,
    dependencies: Vec<ResourceRef>,
}

pub struct ComputeContextCollector {
    stack_name: String,
    environment: String,
    inner: Mutex<Collected>,
}

impl ComputeContextCollector {
    pub fn new(stack_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            environment: environment.into(),
            inner: Mutex::new(Collected::default()),
        }
    }

    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn add_env_variable(&self, resource: &str, name: &str, value: impl Into<Value>) {
        self.inner
            .lock()
            .resources
            .entry(resource.to_string())
            .or_default()
            .env
            .insert(name.to_string(), value.into());
    }

    pub fn add_secret_env_variable(&self, resource: &str, name: &str, value: impl Into<Value>) {
        self.inner
            .lock()
            .resources
            .entry(resource.to_string())
            .or_default()
            .secret_env
            .insert(name.to_string(), value.into());
    }

    pub fn add_output(&self, resource: &str, key: &str, value: impl Into<Value>) {
        self.inner
            .lock()
            .resources
            .entry(resource.to_string())
            .or_default()
            .outputs
            .insert(key.to_string(), value.into());
    }

    /// Marks a resource the consuming workload must be created after
    pub fn add_dependency(&self, resource: ResourceRef) {
        let mut inner = self.inner.lock();
        if !inner.dependencies.contains(&resource) {
            inner.dependencies.push(resource);
        }
    }

    /// Adds a context read back from a parent stack's outputs
    pub fn inject(&self, resource: &str, context: ResourceContext) {
        let mut inner = self.inner.lock();
        let entry = inner.resources.entry(resource.to_string()).or_default();
        entry.env.extend(context.env);
        entry.secret_env.extend(context.secret_env);
        entry.outputs.extend(context.outputs);
    }

    /// Plain environment variables of every collected resource
    pub fn env_variables(&self) -> BTreeMap<String, Value> {
        self.inner
            .lock()
            .resources
            .values()
            .flat_map(|c| c.env.clone())
            .collect()
    }

    pub fn secret_env_variables(&self) -> BTreeMap<String, Value> {
        self.inner
            .lock()
            .resources
            .values()
            .flat_map(|c| c.secret_env.clone())
            .collect()
    }

    pub fn resource_context(&self, resource: &str) -> Option<ResourceContext> {
        self.inner.lock().resources.get(resource).cloned()
    }

    pub fn dependencies(&self) -> Vec<ResourceRef> {
        self.inner.lock().dependencies.clone()
    }
}

impl std::fmt::Debug for ComputeContextCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ComputeContextCollector")
            .field("stack_name", &self.stack_name)
            .field("environment", &self.environment)
            .field("resources", &inner.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collects_per_resource() {
        let collector = ComputeContextCollector::new("infra", "prod");
        collector.add_env_variable("assets", "ASSETS_BUCKET", "acme-assets");
        collector.add_secret_env_variable("db", "MONGO_URI", json!({"$output": {"urn": "u", "key": "uri"}}));
        collector.add_output("assets", "url", "gs://acme-assets");

        assert_eq!(collector.env_variables()["ASSETS_BUCKET"], "acme-assets");
        assert!(collector.secret_env_variables().contains_key("MONGO_URI"));
        assert!(collector.resource_context("db").unwrap().env.is_empty());
        assert!(collector.resource_context("missing").is_none());
    }

    #[test]
    fn test_context_survives_export_and_inject() {
        let parent = ComputeContextCollector::new("infra", "prod");
        parent.add_env_variable("assets", "ASSETS_BUCKET", "acme-assets");
        let exported = serde_json::to_value(parent.resource_context("assets").unwrap()).unwrap();
        assert_eq!(exported["env"]["ASSETS_BUCKET"], "acme-assets");
        assert!(exported.get("secretEnv").is_some());

        let child = ComputeContextCollector::new("web", "prod");
        child.inject("assets", serde_json::from_value(exported).unwrap());
        assert_eq!(child.env_variables()["ASSETS_BUCKET"], "acme-assets");
    }

    #[test]
    fn test_env_name() {
        assert_eq!(env_name("media-assets", "bucket"), "MEDIA_ASSETS_BUCKET");
        assert_eq!(env_name("db", "uri"), "DB_URI");
    }

    #[test]
    fn test_dependencies_are_deduplicated() {
        let collector = ComputeContextCollector::new("infra", "prod");
        let bucket = ResourceRef {
            urn: "urn:sc:infra::gcp:storage:Bucket::assets".to_string(),
            kind: "gcp:storage:Bucket".to_string(),
            name: "assets".to_string(),
        };
        collector.add_dependency(bucket.clone());
        collector.add_dependency(bucket);
        assert_eq!(collector.dependencies().len(), 1);
    }
}
