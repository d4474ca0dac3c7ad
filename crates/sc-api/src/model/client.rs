//! client.yaml model: how an application stack deploys into a parent stack

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const CLIENT_TYPE_CLOUD_COMPOSE: &str = "cloud-compose";
pub const CLIENT_TYPE_SINGLE_IMAGE: &str = "single-image";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDescriptor {
    #[serde(default)]
    pub schema_version: String,
    /// Deployment descriptors keyed by environment
    #[serde(default)]
    pub stacks: BTreeMap<String, StackClientDescriptor>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackClientDescriptor {
    #[serde(rename = "type", default = "default_client_type")]
    pub type_: String,
    /// Parent stack reference (`infra`, `org/infra` or `org/project/infra`)
    pub parent: String,
    /// Parent environment; defaults to the child's environment
    #[serde(default)]
    pub parent_env: Option<String>,
    /// Overrides the template chosen by the parent for this environment
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub config: ClientConfig,
}

fn default_client_type() -> String {
    CLIENT_TYPE_SINGLE_IMAGE.to_string()
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientConfig {
    /// Image reference; for cloud-compose stacks the compose loader fills it in
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub secrets: BTreeMap<String, String>,
    /// Parent resources whose outputs are injected into the deployment
    #[serde(default)]
    pub uses: Vec<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub scale: Option<Scale>,
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scale {
    pub min: u32,
    pub max: u32,
}

impl Default for Scale {
    fn default() -> Self {
        Self { min: 1, max: 1 }
    }
}
