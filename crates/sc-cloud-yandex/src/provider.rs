//! Yandex Cloud provider implementation

use crate::error::{Result, YandexError};
use crate::yc::{RevisionSpec, Yc};
use async_trait::async_trait;
use sc_api::YandexCredentials;
use sc_provisioner::SessionEnv;
use sc_provisioner::engine::{AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const KIND_BUCKET: &str = "yandex:storage:Bucket";
pub const KIND_CONTAINER: &str = "yandex:serverless:Container";

pub const STORAGE_ENDPOINT: &str = "https://storage.yandexcloud.net";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInputs {
    pub name: String,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub public_read: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInputs {
    pub name: String,
    pub image: String,
    pub service_account_id: String,
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub cores: Option<String>,
    #[serde(default)]
    pub concurrency: Option<u32>,
}

impl ContainerInputs {
    fn revision(&self) -> RevisionSpec {
        RevisionSpec {
            container: self.name.clone(),
            image: self.image.clone(),
            service_account_id: self.service_account_id.clone(),
            env: self
                .env
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Value::String(s) => s.clone(),
                        Value::Null => String::new(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            memory: self.memory.clone(),
            cores: self.cores.clone(),
            concurrency: self.concurrency,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(request: &ResourceRequest) -> Result<T> {
    Ok(serde_json::from_value(request.inputs.clone())?)
}

fn bucket_outputs(name: &str) -> ResourceOutputs {
    ResourceOutputs::new()
        .with("name", name)
        .with("url", format!("{}/{}", STORAGE_ENDPOINT, name))
}

fn container_outputs(container: &Value, revision: Option<&Value>) -> ResourceOutputs {
    let mut outputs = ResourceOutputs::new()
        .with("id", container.get("id").cloned().unwrap_or_default())
        .with("url", container.get("url").cloned().unwrap_or_default());
    if let Some(revision_id) = revision.and_then(|r| r.get("id")) {
        outputs = outputs.with("revision", revision_id.clone());
    }
    outputs
}

/// Yandex Cloud provider
pub struct YandexProvider {
    yc: Yc,
}

impl YandexProvider {
    pub fn new(credentials: &YandexCredentials, session_env: &SessionEnv) -> Result<Self> {
        Ok(Self {
            yc: Yc::new(credentials, session_env)?,
        })
    }

    async fn deploy_container(&self, inputs: &ContainerInputs) -> Result<ResourceOutputs> {
        let container = match self.yc.get_container(&inputs.name).await? {
            Some(container) => container,
            None => {
                let created = self.yc.create_container(&inputs.name).await?;
                self.yc.allow_unauthenticated(&inputs.name).await?;
                created
            }
        };
        let revision = self.yc.deploy_revision(&inputs.revision()).await?;
        Ok(container_outputs(&container, Some(&revision)))
    }

    async fn create_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.yc
                    .create_bucket(&inputs.name, inputs.max_size, inputs.public_read)
                    .await?;
                Ok(bucket_outputs(&inputs.name))
            }
            KIND_CONTAINER => {
                let inputs: ContainerInputs = decode(request)?;
                self.deploy_container(&inputs).await
            }
            other => Err(YandexError::UnsupportedKind(other.to_string())),
        }
    }

    async fn read_resource(&self, request: &ResourceRequest) -> Result<Option<ResourceOutputs>> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                let found = self.yc.get_bucket(&inputs.name).await?;
                Ok(found.map(|_| bucket_outputs(&inputs.name)))
            }
            KIND_CONTAINER => {
                let inputs: ContainerInputs = decode(request)?;
                let found = self.yc.get_container(&inputs.name).await?;
                Ok(found.map(|container| {
                    let mut outputs = container_outputs(&container, None);
                    if let Some(revision) = request.outputs.get("revision") {
                        outputs = outputs.with("revision", revision.clone());
                    }
                    outputs
                }))
            }
            other => Err(YandexError::UnsupportedKind(other.to_string())),
        }
    }

    async fn update_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.yc
                    .update_bucket(&inputs.name, inputs.max_size, inputs.public_read)
                    .await?;
                Ok(bucket_outputs(&inputs.name))
            }
            KIND_CONTAINER => {
                let inputs: ContainerInputs = decode(request)?;
                self.deploy_container(&inputs).await
            }
            other => Err(YandexError::UnsupportedKind(other.to_string())),
        }
    }

    async fn delete_resource(&self, request: &ResourceRequest) -> Result<()> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.yc.delete_bucket(&inputs.name).await
            }
            KIND_CONTAINER => {
                let inputs: ContainerInputs = decode(request)?;
                self.yc.delete_container(&inputs.name).await
            }
            other => Err(YandexError::UnsupportedKind(other.to_string())),
        }
    }
}

#[async_trait]
impl CloudProvider for YandexProvider {
    fn name(&self) -> &str {
        sc_api::PROVIDER_YANDEX
    }

    async fn check_auth(&self) -> sc_provisioner::Result<AuthStatus> {
        match self.yc.check_auth().await {
            Ok(account) => Ok(AuthStatus::ok(account)),
            Err(YandexError::YcNotFound) => Ok(AuthStatus::failed(
                "yc not found. Please install the Yandex Cloud CLI",
            )),
            Err(YandexError::CommandFailed(stderr)) => Ok(AuthStatus::failed(stderr)),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Creating Yandex Cloud resource");
        Ok(self.create_resource(request).await?)
    }

    async fn read(
        &self,
        request: &ResourceRequest,
    ) -> sc_provisioner::Result<Option<ResourceOutputs>> {
        Ok(self.read_resource(request).await?)
    }

    async fn update(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Updating Yandex Cloud resource");
        Ok(self.update_resource(request).await?)
    }

    async fn delete(&self, request: &ResourceRequest) -> sc_provisioner::Result<()> {
        tracing::info!(kind = %request.kind, name = %request.name, "Deleting Yandex Cloud resource");
        Ok(self.delete_resource(request).await?)
    }
}
