//! Google Cloud provider implementation

use crate::error::{GcpError, Result};
use crate::gcloud::{Gcloud, ServiceSpec};
use async_trait::async_trait;
use sc_api::GcpCredentials;
use sc_provisioner::SessionEnv;
use sc_provisioner::engine::{AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest};
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;

pub const KIND_BUCKET: &str = "gcp:storage:Bucket";
pub const KIND_CLUSTER: &str = "gcp:container:Cluster";
pub const KIND_REPOSITORY: &str = "gcp:artifactregistry:Repository";
pub const KIND_CRYPTO_KEY: &str = "gcp:kms:CryptoKey";
pub const KIND_SERVICE: &str = "gcp:cloudrun:Service";
pub const KIND_DOMAIN_MAPPING: &str = "gcp:cloudrun:DomainMapping";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInputs {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInputs {
    pub name: String,
    pub location: String,
    #[serde(default)]
    pub min_version: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryInputs {
    pub name: String,
    pub location: String,
    pub format: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CryptoKeyInputs {
    pub key_ring: String,
    pub name: String,
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInputs {
    pub name: String,
    pub region: String,
    pub image: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
    #[serde(default)]
    pub cpu: Option<String>,
    #[serde(default)]
    pub memory: Option<String>,
    #[serde(default)]
    pub min_instances: Option<u32>,
    #[serde(default)]
    pub max_instances: Option<u32>,
}

impl ServiceInputs {
    fn spec(&self) -> ServiceSpec {
        ServiceSpec {
            name: self.name.clone(),
            region: self.region.clone(),
            image: self.image.clone(),
            port: self.port,
            env: self
                .env
                .iter()
                .map(|(k, v)| (k.clone(), env_value(v)))
                .collect(),
            cpu: self.cpu.clone(),
            memory: self.memory.clone(),
            min_instances: self.min_instances,
            max_instances: self.max_instances,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainMappingInputs {
    pub domain: String,
    pub service: String,
    pub region: String,
}

/// Environment values are passed as strings; anything else is rendered as JSON
fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn service_outputs(name: &str, description: &Value) -> ResourceOutputs {
    let url = description
        .pointer("/status/url")
        .and_then(Value::as_str)
        .unwrap_or_default();
    ResourceOutputs::new().with("name", name).with("url", url)
}

fn cluster_outputs(name: &str, description: &Value) -> ResourceOutputs {
    let endpoint = description
        .get("endpoint")
        .and_then(Value::as_str)
        .unwrap_or_default();
    ResourceOutputs::new()
        .with("name", name)
        .with_secret("endpoint", endpoint)
}

/// Google Cloud provider
pub struct GcpProvider {
    gcloud: Gcloud,
}

impl GcpProvider {
    pub fn new(credentials: &GcpCredentials, session_env: &SessionEnv) -> Result<Self> {
        if credentials.project_id.is_empty() {
            return Err(GcpError::InvalidConfig("projectId is required".to_string()));
        }
        Ok(Self {
            gcloud: Gcloud::new(
                &credentials.project_id,
                &credentials.credentials,
                session_env,
            )?,
        })
    }

    pub fn gcloud(&self) -> &Gcloud {
        &self.gcloud
    }

    fn repository_url(&self, inputs: &RepositoryInputs) -> String {
        format!(
            "{}-{}.pkg.dev/{}/{}",
            inputs.location,
            inputs.format,
            self.gcloud.project(),
            inputs.name
        )
    }

    async fn create_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.gcloud
                    .create_bucket(
                        &inputs.name,
                        inputs.location.as_deref(),
                        inputs.storage_class.as_deref(),
                    )
                    .await?;
                Ok(ResourceOutputs::new()
                    .with("name", inputs.name.as_str())
                    .with("url", format!("gs://{}", inputs.name)))
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                self.gcloud
                    .create_autopilot_cluster(
                        &inputs.name,
                        &inputs.location,
                        inputs.min_version.as_deref(),
                    )
                    .await?;
                let description = self
                    .gcloud
                    .describe_cluster(&inputs.name, &inputs.location)
                    .await?
                    .unwrap_or_default();
                Ok(cluster_outputs(&inputs.name, &description))
            }
            KIND_REPOSITORY => {
                let inputs: RepositoryInputs = decode(request)?;
                self.gcloud
                    .create_repository(&inputs.name, &inputs.location, &inputs.format)
                    .await?;
                Ok(ResourceOutputs::new()
                    .with("name", inputs.name.as_str())
                    .with("url", self.repository_url(&inputs)))
            }
            KIND_CRYPTO_KEY => {
                let inputs: CryptoKeyInputs = decode(request)?;
                self.gcloud
                    .create_crypto_key(&inputs.key_ring, &inputs.name, &inputs.location)
                    .await?;
                Ok(ResourceOutputs::new().with(
                    "id",
                    format!(
                        "projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
                        self.gcloud.project(),
                        inputs.location,
                        inputs.key_ring,
                        inputs.name
                    ),
                ))
            }
            KIND_SERVICE => {
                let inputs: ServiceInputs = decode(request)?;
                let description = self.gcloud.deploy_service(&inputs.spec()).await?;
                Ok(service_outputs(&inputs.name, &description))
            }
            KIND_DOMAIN_MAPPING => {
                let inputs: DomainMappingInputs = decode(request)?;
                self.gcloud
                    .create_domain_mapping(&inputs.service, &inputs.domain, &inputs.region)
                    .await?;
                Ok(ResourceOutputs::new().with("domain", inputs.domain.as_str()))
            }
            other => Err(GcpError::UnsupportedKind(other.to_string())),
        }
    }

    async fn read_resource(&self, request: &ResourceRequest) -> Result<Option<ResourceOutputs>> {
        let recorded = || ResourceOutputs {
            values: request.outputs.clone(),
            secrets: Default::default(),
        };
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                let found = self.gcloud.describe_bucket(&inputs.name).await?;
                Ok(found.map(|_| recorded()))
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                let found = self
                    .gcloud
                    .describe_cluster(&inputs.name, &inputs.location)
                    .await?;
                Ok(found.map(|d| cluster_outputs(&inputs.name, &d)))
            }
            KIND_REPOSITORY => {
                let inputs: RepositoryInputs = decode(request)?;
                let found = self
                    .gcloud
                    .describe_repository(&inputs.name, &inputs.location)
                    .await?;
                Ok(found.map(|_| recorded()))
            }
            KIND_CRYPTO_KEY => {
                let inputs: CryptoKeyInputs = decode(request)?;
                let found = self
                    .gcloud
                    .describe_crypto_key(&inputs.key_ring, &inputs.name, &inputs.location)
                    .await?;
                Ok(found.map(|_| recorded()))
            }
            KIND_SERVICE => {
                let inputs: ServiceInputs = decode(request)?;
                let found = self
                    .gcloud
                    .describe_service(&inputs.name, &inputs.region)
                    .await?;
                Ok(found.map(|d| service_outputs(&inputs.name, &d)))
            }
            KIND_DOMAIN_MAPPING => {
                let inputs: DomainMappingInputs = decode(request)?;
                let found = self
                    .gcloud
                    .describe_domain_mapping(&inputs.domain, &inputs.region)
                    .await?;
                Ok(found.map(|_| recorded()))
            }
            other => Err(GcpError::UnsupportedKind(other.to_string())),
        }
    }

    async fn update_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        let recorded = ResourceOutputs {
            values: request.outputs.clone(),
            secrets: Default::default(),
        };
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                if let Some(ref class) = inputs.storage_class {
                    self.gcloud.update_bucket_class(&inputs.name, class).await?;
                }
                Ok(recorded)
            }
            KIND_SERVICE => self.create_resource(request).await,
            // remaining kinds replace on every input that gcloud cannot update
            _ => Ok(recorded),
        }
    }

    async fn delete_resource(&self, request: &ResourceRequest) -> Result<()> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.gcloud.delete_bucket(&inputs.name).await
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                self.gcloud
                    .delete_cluster(&inputs.name, &inputs.location)
                    .await
            }
            KIND_REPOSITORY => {
                let inputs: RepositoryInputs = decode(request)?;
                self.gcloud
                    .delete_repository(&inputs.name, &inputs.location)
                    .await
            }
            KIND_CRYPTO_KEY => {
                let inputs: CryptoKeyInputs = decode(request)?;
                tracing::warn!(
                    key = %inputs.name,
                    key_ring = %inputs.key_ring,
                    "KMS keys cannot be deleted, leaving the key in place"
                );
                Ok(())
            }
            KIND_SERVICE => {
                let inputs: ServiceInputs = decode(request)?;
                self.gcloud
                    .delete_service(&inputs.name, &inputs.region)
                    .await
            }
            KIND_DOMAIN_MAPPING => {
                let inputs: DomainMappingInputs = decode(request)?;
                self.gcloud
                    .delete_domain_mapping(&inputs.domain, &inputs.region)
                    .await
            }
            other => Err(GcpError::UnsupportedKind(other.to_string())),
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(request: &ResourceRequest) -> Result<T> {
    Ok(serde_json::from_value(request.inputs.clone())?)
}

#[async_trait]
impl CloudProvider for GcpProvider {
    fn name(&self) -> &str {
        sc_api::PROVIDER_GCP
    }

    async fn check_auth(&self) -> sc_provisioner::Result<AuthStatus> {
        match self.gcloud.check_auth().await {
            Ok(Some(account)) => Ok(AuthStatus::ok(account)),
            Ok(None) => Ok(AuthStatus::failed("No active gcloud account")),
            Err(GcpError::GcloudNotFound) => Ok(AuthStatus::failed(
                "gcloud not found. Please install the Google Cloud SDK",
            )),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Creating GCP resource");
        Ok(self.create_resource(request).await?)
    }

    async fn read(
        &self,
        request: &ResourceRequest,
    ) -> sc_provisioner::Result<Option<ResourceOutputs>> {
        Ok(self.read_resource(request).await?)
    }

    async fn update(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Updating GCP resource");
        Ok(self.update_resource(request).await?)
    }

    async fn delete(&self, request: &ResourceRequest) -> sc_provisioner::Result<()> {
        tracing::info!(kind = %request.kind, name = %request.name, "Deleting GCP resource");
        Ok(self.delete_resource(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn provider() -> GcpProvider {
        GcpProvider::new(
            &GcpCredentials {
                project_id: "acme-test".to_string(),
                credentials: String::new(),
            },
            &SessionEnv::new(),
        )
        .unwrap()
    }

    #[test]
    fn test_requires_project() {
        let err = GcpProvider::new(&GcpCredentials::default(), &SessionEnv::new())
            .err()
            .unwrap();
        assert!(matches!(err, GcpError::InvalidConfig(_)));
    }

    #[test]
    fn test_service_inputs_render_env() {
        let request = ResourceRequest {
            kind: KIND_SERVICE.to_string(),
            name: "web".to_string(),
            inputs: json!({
                "name": "web",
                "region": "europe-west1",
                "image": "registry.example/web:1",
                "env": {"PORT": 8080, "BUCKET": "gs://assets", "EMPTY": null},
                "minInstances": 1,
            }),
            ..Default::default()
        };
        let inputs: ServiceInputs = decode(&request).unwrap();
        let spec = inputs.spec();
        assert_eq!(spec.env["PORT"], "8080");
        assert_eq!(spec.env["BUCKET"], "gs://assets");
        assert_eq!(spec.env["EMPTY"], "");
        assert_eq!(spec.min_instances, Some(1));
        assert_eq!(spec.max_instances, None);
    }

    #[test]
    fn test_repository_url() {
        let inputs = RepositoryInputs {
            name: "images".to_string(),
            location: "europe-west1".to_string(),
            format: "docker".to_string(),
        };
        assert_eq!(
            provider().repository_url(&inputs),
            "europe-west1-docker.pkg.dev/acme-test/images"
        );
    }

    #[test]
    fn test_service_outputs() {
        let outputs = service_outputs("web", &json!({"status": {"url": "https://web-xyz.run.app"}}));
        assert_eq!(outputs.get_str("url"), Some("https://web-xyz.run.app"));
        let outputs = cluster_outputs("gke", &json!({"endpoint": "10.0.0.1"}));
        assert!(outputs.secrets.contains("endpoint"));
    }

    #[tokio::test]
    async fn test_unsupported_kind() {
        let request = ResourceRequest {
            kind: "gcp:pubsub:Topic".to_string(),
            inputs: json!({}),
            ..Default::default()
        };
        let err = provider().create_resource(&request).await.unwrap_err();
        assert!(matches!(err, GcpError::UnsupportedKind(ref k) if k == "gcp:pubsub:Topic"));
    }
}
