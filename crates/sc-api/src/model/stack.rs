//! Stack and per-call parameters

use super::client::{ClientDescriptor, StackClientDescriptor};
use super::server::{ProvisionerConfig, ServerDescriptor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One deployable unit: the server side (resources, templates) and the
/// client side (how applications deploy onto it).
///
/// Built by the caller for every invocation and never cached.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stack {
    pub name: String,
    #[serde(default)]
    pub client: ClientDescriptor,
    #[serde(default)]
    pub server: ServerDescriptor,
    #[serde(default)]
    pub secrets: SecretsDescriptor,
}

impl Stack {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn provisioner_config(&self) -> Option<&ProvisionerConfig> {
        self.server.provisioner.config()
    }

    pub fn client_stack(&self, environment: &str) -> Option<&StackClientDescriptor> {
        self.client.stacks.get(environment)
    }

    /// Child stack that deploys with the parent's server descriptor
    pub fn child_stack(&self, parent_server: &ServerDescriptor) -> Stack {
        Stack {
            name: self.name.clone(),
            client: self.client.clone(),
            server: parent_server.clone(),
            secrets: self.secrets.clone(),
        }
    }
}

/// Decrypted secrets.yaml; only used to resolve `${secret:name}` placeholders
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsDescriptor {
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

/// Identifies a child stack: the application stack deployed into one
/// environment of its parent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackParams {
    pub stack_name: String,
    pub environment: String,
    /// Overrides the parent declared in client.yaml
    #[serde(default)]
    pub parent_stack: Option<String>,
}

impl StackParams {
    pub fn new(stack_name: impl Into<String>, environment: impl Into<String>) -> Self {
        Self {
            stack_name: stack_name.into(),
            environment: environment.into(),
            parent_stack: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionParams {
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    /// Limits provisioning to these parent stacks when run from the CLI
    #[serde(default)]
    pub stacks: Vec<String>,
    #[serde(default)]
    pub profile: Option<String>,
    #[serde(default)]
    pub skip_refresh: bool,
    #[serde(default)]
    pub skip_preview: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeployParams {
    #[serde(flatten)]
    pub stack_params: StackParams,
    #[serde(default)]
    pub root_dir: Option<PathBuf>,
    #[serde(default)]
    pub skip_refresh: bool,
    #[serde(default)]
    pub skip_preview: bool,
}

impl DeployParams {
    pub fn new(stack_params: StackParams) -> Self {
        Self {
            stack_params,
            ..Default::default()
        }
    }
}
