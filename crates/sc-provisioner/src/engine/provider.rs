//! Cloud provider trait definition

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Cloud provider abstraction trait
///
/// Provider packages (GCP, AWS, Yandex, Cloudflare, MongoDB Atlas) implement
/// this trait; the engine calls it for every resource operation it applies.
/// Unrelated resources of one run are applied concurrently, so
/// implementations must tolerate concurrent calls.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Provider type, e.g. "gcp" or "cloudflare"
    fn name(&self) -> &str;

    /// Check if the provider is properly configured and authenticated
    async fn check_auth(&self) -> Result<AuthStatus>;

    async fn create(&self, request: &ResourceRequest) -> Result<ResourceOutputs>;

    /// Current outputs of the resource; `Ok(None)` when it no longer exists
    async fn read(&self, request: &ResourceRequest) -> Result<Option<ResourceOutputs>>;

    /// Updates the resource in place; `request.outputs` holds the previous outputs
    async fn update(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        self.create(request).await
    }

    async fn delete(&self, request: &ResourceRequest) -> Result<()>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    pub authenticated: bool,
    pub account_info: Option<String>,
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// One resource operation as seen by a provider
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceRequest {
    pub urn: String,
    /// Resource kind, e.g. "gcp:storage:Bucket"
    pub kind: String,
    pub name: String,
    /// Inputs with every output reference resolved
    pub inputs: Value,
    /// Outputs recorded by the previous operation, empty on create
    pub outputs: BTreeMap<String, Value>,
}

impl ResourceRequest {
    pub fn input_str(&self, key: &str) -> Option<&str> {
        self.inputs.get(key).and_then(Value::as_str)
    }

    pub fn output_str(&self, key: &str) -> Option<&str> {
        self.outputs.get(key).and_then(Value::as_str)
    }

    /// Decodes the inputs into a typed struct
    pub fn decode_inputs<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.inputs.clone())?)
    }
}

/// Outputs produced by a provider operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceOutputs {
    pub values: BTreeMap<String, Value>,
    /// Keys whose values are stored encrypted
    pub secrets: BTreeSet<String>,
}

impl ResourceOutputs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        let key = key.into();
        self.secrets.insert(key.clone());
        self.values.insert(key, value.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }
}
