//! Resource and template descriptors
//!
//! Resource configs are decoded once, when the descriptor is read, into a
//! closed set of variants keyed by the descriptor's `type`. Types nobody
//! knows about are kept as [`ResourceConfig::Unknown`] so the registry can
//! report them by name at dispatch time.

use super::auth::{
    Auth, AwsCredentials, CloudflareCredentials, GcpCredentials, MongodbCredentials,
    YandexCredentials,
};
use super::client::StackClientDescriptor;
use super::{RawTyped, decode_config};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const RESOURCE_GCP_BUCKET: &str = "gcp-bucket";
pub const RESOURCE_GKE_AUTOPILOT: &str = "gcp-gke-autopilot-cluster";
pub const RESOURCE_GCP_ARTIFACT_REGISTRY: &str = "gcp-artifact-registry";
pub const RESOURCE_S3_BUCKET: &str = "s3-bucket";
pub const RESOURCE_YC_BUCKET: &str = "yc-bucket";
pub const RESOURCE_R2_BUCKET: &str = "cloudflare-r2-bucket";
pub const RESOURCE_MONGODB_ATLAS: &str = "mongodb-atlas";

pub const TEMPLATE_CLOUDRUN: &str = "cloudrun";
pub const TEMPLATE_ECS_FARGATE: &str = "ecs-fargate";
pub const TEMPLATE_AWS_LAMBDA: &str = "aws-lambda";
pub const TEMPLATE_YC_SERVERLESS_CONTAINER: &str = "yc-serverless-container";

/// Deployment template types a child stack can be deployed as
pub const TEMPLATE_TYPES: &[&str] = &[
    TEMPLATE_CLOUDRUN,
    TEMPLATE_ECS_FARGATE,
    TEMPLATE_AWS_LAMBDA,
    TEMPLATE_YC_SERVERLESS_CONTAINER,
];

// ============ Resource configs ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpBucketConfig {
    #[serde(flatten)]
    pub credentials: GcpCredentials,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub storage_class: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GkeAutopilotConfig {
    #[serde(flatten)]
    pub credentials: GcpCredentials,
    pub location: String,
    #[serde(default)]
    pub gke_min_version: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactRegistryConfig {
    #[serde(flatten)]
    pub credentials: GcpCredentials,
    pub location: String,
    #[serde(default = "default_registry_format")]
    pub format: String,
}

fn default_registry_format() -> String {
    "docker".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketConfig {
    #[serde(flatten)]
    pub credentials: AwsCredentials,
    #[serde(default)]
    pub allow_only_https: bool,
    #[serde(default)]
    pub versioning: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YandexBucketConfig {
    #[serde(flatten)]
    pub credentials: YandexCredentials,
    #[serde(default)]
    pub max_size: Option<u64>,
    #[serde(default)]
    pub public_read: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R2BucketConfig {
    #[serde(flatten)]
    pub credentials: CloudflareCredentials,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MongodbAtlasConfig {
    #[serde(flatten)]
    pub credentials: MongodbCredentials,
    #[serde(default = "default_instance_size")]
    pub instance_size: String,
    pub region: String,
    #[serde(default = "default_atlas_cloud_provider")]
    pub cloud_provider: String,
    #[serde(default)]
    pub project_name: Option<String>,
}

fn default_instance_size() -> String {
    "M10".to_string()
}

fn default_atlas_cloud_provider() -> String {
    "AWS".to_string()
}

/// Concrete deployment of a child stack, synthesized from the parent's
/// exported template and the child's client descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackDeployConfig {
    pub template: StackDescriptor,
    pub client: StackClientDescriptor,
    pub parent_ref: String,
    pub parent_env: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ResourceConfig {
    GcpBucket(GcpBucketConfig),
    GkeAutopilot(GkeAutopilotConfig),
    ArtifactRegistry(ArtifactRegistryConfig),
    S3Bucket(S3BucketConfig),
    YandexBucket(YandexBucketConfig),
    R2Bucket(R2BucketConfig),
    MongodbAtlas(MongodbAtlasConfig),
    Deploy(Box<StackDeployConfig>),
    Unknown(Value),
}

impl ResourceConfig {
    pub fn decode(type_: &str, config: Value) -> Result<Self, serde_json::Error> {
        Ok(match type_ {
            RESOURCE_GCP_BUCKET => ResourceConfig::GcpBucket(decode_config(config)?),
            RESOURCE_GKE_AUTOPILOT => ResourceConfig::GkeAutopilot(decode_config(config)?),
            RESOURCE_GCP_ARTIFACT_REGISTRY => {
                ResourceConfig::ArtifactRegistry(decode_config(config)?)
            }
            RESOURCE_S3_BUCKET => ResourceConfig::S3Bucket(decode_config(config)?),
            RESOURCE_YC_BUCKET => ResourceConfig::YandexBucket(decode_config(config)?),
            RESOURCE_R2_BUCKET => ResourceConfig::R2Bucket(decode_config(config)?),
            RESOURCE_MONGODB_ATLAS => ResourceConfig::MongodbAtlas(decode_config(config)?),
            t if TEMPLATE_TYPES.contains(&t) => {
                ResourceConfig::Deploy(Box::new(decode_config(config)?))
            }
            _ => ResourceConfig::Unknown(config),
        })
    }

    pub fn auth(&self) -> Option<Auth> {
        match self {
            ResourceConfig::GcpBucket(c) => Some(Auth::Gcp(c.credentials.clone())),
            ResourceConfig::GkeAutopilot(c) => Some(Auth::Gcp(c.credentials.clone())),
            ResourceConfig::ArtifactRegistry(c) => Some(Auth::Gcp(c.credentials.clone())),
            ResourceConfig::S3Bucket(c) => Some(Auth::Aws(c.credentials.clone())),
            ResourceConfig::YandexBucket(c) => Some(Auth::Yandex(c.credentials.clone())),
            ResourceConfig::R2Bucket(c) => Some(Auth::Cloudflare(c.credentials.clone())),
            ResourceConfig::MongodbAtlas(c) => Some(Auth::Mongodb(c.credentials.clone())),
            ResourceConfig::Deploy(c) => c.template.config.auth(),
            ResourceConfig::Unknown(_) => None,
        }
    }
}

/// One provisionable unit declared under `resources.resources.<env>.resources`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTyped", into = "RawTyped")]
pub struct ResourceDescriptor {
    pub type_: String,
    pub name: Option<String>,
    pub config: ResourceConfig,
}

impl ResourceDescriptor {
    pub fn new(type_: impl Into<String>, config: ResourceConfig) -> Self {
        Self {
            type_: type_.into(),
            name: None,
            config,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl TryFrom<RawTyped> for ResourceDescriptor {
    type Error = serde_json::Error;

    fn try_from(raw: RawTyped) -> Result<Self, Self::Error> {
        let config = ResourceConfig::decode(&raw.type_, raw.config)?;
        Ok(Self {
            type_: raw.type_,
            name: raw.name,
            config,
        })
    }
}

impl From<ResourceDescriptor> for RawTyped {
    fn from(descriptor: ResourceDescriptor) -> Self {
        let mut raw = RawTyped::encode(descriptor.type_, &descriptor.config);
        raw.name = descriptor.name;
        raw
    }
}

// ============ Templates ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudRunTemplate {
    #[serde(flatten)]
    pub credentials: GcpCredentials,
    pub location: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EcsFargateTemplate {
    #[serde(flatten)]
    pub credentials: AwsCredentials,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub execution_role_arn: String,
    #[serde(default)]
    pub assign_public_ip: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsLambdaTemplate {
    #[serde(flatten)]
    pub credentials: AwsCredentials,
    pub role_arn: String,
    #[serde(default = "default_lambda_timeout")]
    pub timeout: u32,
}

fn default_lambda_timeout() -> u32 {
    30
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YcServerlessContainerTemplate {
    #[serde(flatten)]
    pub credentials: YandexCredentials,
    pub service_account_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TemplateConfig {
    CloudRun(CloudRunTemplate),
    EcsFargate(EcsFargateTemplate),
    AwsLambda(AwsLambdaTemplate),
    YcServerlessContainer(YcServerlessContainerTemplate),
    Unknown(Value),
}

impl TemplateConfig {
    pub fn decode(type_: &str, config: Value) -> Result<Self, serde_json::Error> {
        Ok(match type_ {
            TEMPLATE_CLOUDRUN => TemplateConfig::CloudRun(decode_config(config)?),
            TEMPLATE_ECS_FARGATE => TemplateConfig::EcsFargate(decode_config(config)?),
            TEMPLATE_AWS_LAMBDA => TemplateConfig::AwsLambda(decode_config(config)?),
            TEMPLATE_YC_SERVERLESS_CONTAINER => {
                TemplateConfig::YcServerlessContainer(decode_config(config)?)
            }
            _ => TemplateConfig::Unknown(config),
        })
    }

    pub fn auth(&self) -> Option<Auth> {
        match self {
            TemplateConfig::CloudRun(c) => Some(Auth::Gcp(c.credentials.clone())),
            TemplateConfig::EcsFargate(c) => Some(Auth::Aws(c.credentials.clone())),
            TemplateConfig::AwsLambda(c) => Some(Auth::Aws(c.credentials.clone())),
            TemplateConfig::YcServerlessContainer(c) => Some(Auth::Yandex(c.credentials.clone())),
            TemplateConfig::Unknown(_) => None,
        }
    }
}

/// Template declared by a parent stack under `templates:`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawTyped", into = "RawTyped")]
pub struct StackDescriptor {
    pub type_: String,
    pub config: TemplateConfig,
}

impl TryFrom<RawTyped> for StackDescriptor {
    type Error = serde_json::Error;

    fn try_from(raw: RawTyped) -> Result<Self, Self::Error> {
        let config = TemplateConfig::decode(&raw.type_, raw.config)?;
        Ok(Self {
            type_: raw.type_,
            config,
        })
    }
}

impl From<StackDescriptor> for RawTyped {
    fn from(descriptor: StackDescriptor) -> Self {
        RawTyped::encode(descriptor.type_, &descriptor.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_known_resource() {
        let yaml = r#"
type: gcp-bucket
config:
  projectId: acme
  credentials: "{}"
  location: EU
"#;
        let descriptor: ResourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.type_, "gcp-bucket");
        assert!(descriptor.name.is_none());
        match &descriptor.config {
            ResourceConfig::GcpBucket(c) => {
                assert_eq!(c.credentials.project_id, "acme");
                assert_eq!(c.location.as_deref(), Some("EU"));
            }
            other => panic!("unexpected config: {:?}", other),
        }
        assert_eq!(descriptor.config.auth().unwrap().provider_type(), "gcp");
    }

    #[test]
    fn test_decode_unknown_resource_keeps_type() {
        let yaml = "type: quantum-bucket\nname: qb\nconfig:\n  size: 3\n";
        let descriptor: ResourceDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.type_, "quantum-bucket");
        assert_eq!(descriptor.name.as_deref(), Some("qb"));
        assert!(matches!(descriptor.config, ResourceConfig::Unknown(_)));
        assert!(descriptor.config.auth().is_none());
    }

    #[test]
    fn test_malformed_known_resource_fails() {
        let yaml = "type: gcp-gke-autopilot-cluster\nconfig:\n  projectId: acme\n";
        let result: Result<ResourceDescriptor, _> = serde_yaml::from_str(yaml);
        assert!(result.is_err(), "location is required");
    }

    #[test]
    fn test_template_survives_json_export() {
        let yaml = r#"
type: cloudrun
config:
  projectId: acme
  credentials: "{\"type\":\"service_account\"}"
  location: europe-west1
"#;
        let template: StackDescriptor = serde_yaml::from_str(yaml).unwrap();
        let exported = serde_json::to_string(&template).unwrap();
        let imported: StackDescriptor = serde_json::from_str(&exported).unwrap();
        assert_eq!(imported, template);
        assert_eq!(imported.config.auth().unwrap().provider_type(), "gcp");
    }
}
