//! server.yaml model: provisioner, templates and per-environment resources

use super::auth::{Auth, AwsCredentials, CloudflareCredentials, GcpCredentials};
use super::resource::{ResourceDescriptor, StackDescriptor};
use super::{RawTyped, decode_config};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const PROVISIONER_PULUMI: &str = "pulumi";

pub const STATE_STORAGE_FS: &str = "fs";
pub const STATE_STORAGE_GCP_BUCKET: &str = "gcp-bucket";
pub const STATE_STORAGE_S3_BUCKET: &str = "s3-bucket";
pub const STATE_STORAGE_PULUMI_CLOUD: &str = "pulumi-cloud";

pub const SECRETS_PROVIDER_PASSPHRASE: &str = "passphrase";
pub const SECRETS_PROVIDER_GCP_KMS: &str = "gcp-kms";
pub const SECRETS_PROVIDER_AWS_KMS: &str = "aws-kms";

pub const REGISTRAR_CLOUDFLARE: &str = "cloudflare";

pub const DEFAULT_PULUMI_CLOUD_URL: &str = "https://api.pulumi.com";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    #[serde(default)]
    pub schema_version: String,
    #[serde(default)]
    pub provisioner: ProvisionerDescriptor,
    #[serde(default)]
    pub templates: BTreeMap<String, StackDescriptor>,
    #[serde(default)]
    pub resources: PerStackResourcesDescriptor,
}

/// Provisioner section; only the `pulumi` type carries a known config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTyped", into = "RawTyped")]
pub enum ProvisionerDescriptor {
    Pulumi(ProvisionerConfig),
    Unknown { type_: String, config: Value },
}

impl Default for ProvisionerDescriptor {
    fn default() -> Self {
        ProvisionerDescriptor::Unknown {
            type_: String::new(),
            config: Value::Null,
        }
    }
}

impl ProvisionerDescriptor {
    pub fn type_name(&self) -> &str {
        match self {
            ProvisionerDescriptor::Pulumi(_) => PROVISIONER_PULUMI,
            ProvisionerDescriptor::Unknown { type_, .. } => type_,
        }
    }

    pub fn config(&self) -> Option<&ProvisionerConfig> {
        match self {
            ProvisionerDescriptor::Pulumi(config) => Some(config),
            ProvisionerDescriptor::Unknown { .. } => None,
        }
    }
}

impl TryFrom<RawTyped> for ProvisionerDescriptor {
    type Error = serde_json::Error;

    fn try_from(raw: RawTyped) -> Result<Self, Self::Error> {
        Ok(match raw.type_.as_str() {
            PROVISIONER_PULUMI => ProvisionerDescriptor::Pulumi(decode_config(raw.config)?),
            _ => ProvisionerDescriptor::Unknown {
                type_: raw.type_,
                config: raw.config,
            },
        })
    }
}

impl From<ProvisionerDescriptor> for RawTyped {
    fn from(descriptor: ProvisionerDescriptor) -> Self {
        match descriptor {
            ProvisionerDescriptor::Pulumi(config) => RawTyped::encode(PROVISIONER_PULUMI, &config),
            ProvisionerDescriptor::Unknown { type_, config } => RawTyped::new(type_, config),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProvisionerConfig {
    pub organization: String,
    pub state_storage: StateStorageConfig,
    pub secrets_provider: SecretsProviderConfig,
}

// ============ State storage ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FsStateStorage {
    pub path: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpBucketStateStorage {
    #[serde(flatten)]
    pub credentials: GcpCredentials,
    pub bucket_name: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub provision: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct S3BucketStateStorage {
    #[serde(flatten)]
    pub credentials: AwsCredentials,
    pub bucket_name: String,
    #[serde(default)]
    pub provision: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PulumiCloudStateStorage {
    #[serde(default = "default_pulumi_cloud_url")]
    pub url: String,
    #[serde(default)]
    pub access_token: String,
}

fn default_pulumi_cloud_url() -> String {
    DEFAULT_PULUMI_CLOUD_URL.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTyped", into = "RawTyped")]
pub enum StateStorageConfig {
    Fs(FsStateStorage),
    GcpBucket(GcpBucketStateStorage),
    S3Bucket(S3BucketStateStorage),
    PulumiCloud(PulumiCloudStateStorage),
    Unknown { type_: String, config: Value },
}

impl StateStorageConfig {
    pub fn type_name(&self) -> &str {
        match self {
            StateStorageConfig::Fs(_) => STATE_STORAGE_FS,
            StateStorageConfig::GcpBucket(_) => STATE_STORAGE_GCP_BUCKET,
            StateStorageConfig::S3Bucket(_) => STATE_STORAGE_S3_BUCKET,
            StateStorageConfig::PulumiCloud(_) => STATE_STORAGE_PULUMI_CLOUD,
            StateStorageConfig::Unknown { type_, .. } => type_,
        }
    }

    pub fn auth(&self) -> Option<Auth> {
        match self {
            StateStorageConfig::GcpBucket(c) => Some(Auth::Gcp(c.credentials.clone())),
            StateStorageConfig::S3Bucket(c) => Some(Auth::Aws(c.credentials.clone())),
            _ => None,
        }
    }

    /// Credentials needed to talk to the backend.
    ///
    /// `None` for storages that need none (local filesystem); `Some("")` when
    /// the storage needs credentials but none were configured.
    pub fn credentials(&self) -> Option<String> {
        match self {
            StateStorageConfig::Fs(_) => None,
            StateStorageConfig::PulumiCloud(c) => Some(c.access_token.clone()),
            StateStorageConfig::GcpBucket(_) | StateStorageConfig::S3Bucket(_) => {
                self.auth().map(|a| a.credentials_value())
            }
            StateStorageConfig::Unknown { .. } => Some(String::new()),
        }
    }

    pub fn storage_url(&self) -> String {
        match self {
            StateStorageConfig::Fs(c) => format!("file://{}", c.path),
            StateStorageConfig::GcpBucket(c) => format!("gs://{}", c.bucket_name),
            StateStorageConfig::S3Bucket(c) => format!("s3://{}", c.bucket_name),
            StateStorageConfig::PulumiCloud(c) => c.url.clone(),
            StateStorageConfig::Unknown { type_, .. } => format!("{}://", type_),
        }
    }

    pub fn is_provision_enabled(&self) -> bool {
        match self {
            StateStorageConfig::GcpBucket(c) => c.provision,
            StateStorageConfig::S3Bucket(c) => c.provision,
            _ => false,
        }
    }
}

impl TryFrom<RawTyped> for StateStorageConfig {
    type Error = serde_json::Error;

    fn try_from(raw: RawTyped) -> Result<Self, Self::Error> {
        Ok(match raw.type_.as_str() {
            STATE_STORAGE_FS => StateStorageConfig::Fs(decode_config(raw.config)?),
            STATE_STORAGE_GCP_BUCKET => StateStorageConfig::GcpBucket(decode_config(raw.config)?),
            STATE_STORAGE_S3_BUCKET => StateStorageConfig::S3Bucket(decode_config(raw.config)?),
            STATE_STORAGE_PULUMI_CLOUD => {
                StateStorageConfig::PulumiCloud(decode_config(raw.config)?)
            }
            _ => StateStorageConfig::Unknown {
                type_: raw.type_,
                config: raw.config,
            },
        })
    }
}

impl From<StateStorageConfig> for RawTyped {
    fn from(config: StateStorageConfig) -> Self {
        match config {
            StateStorageConfig::Fs(c) => RawTyped::encode(STATE_STORAGE_FS, &c),
            StateStorageConfig::GcpBucket(c) => RawTyped::encode(STATE_STORAGE_GCP_BUCKET, &c),
            StateStorageConfig::S3Bucket(c) => RawTyped::encode(STATE_STORAGE_S3_BUCKET, &c),
            StateStorageConfig::PulumiCloud(c) => {
                RawTyped::encode(STATE_STORAGE_PULUMI_CLOUD, &c)
            }
            StateStorageConfig::Unknown { type_, config } => RawTyped::new(type_, config),
        }
    }
}

// ============ Secrets provider ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PassphraseSecretsProvider {
    #[serde(default)]
    pub passphrase: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GcpKmsSecretsProvider {
    #[serde(flatten)]
    pub credentials: GcpCredentials,
    pub key_name: String,
    #[serde(default = "default_kms_location")]
    pub key_location: String,
    #[serde(default)]
    pub provision: bool,
}

fn default_kms_location() -> String {
    "global".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsKmsSecretsProvider {
    #[serde(flatten)]
    pub credentials: AwsCredentials,
    pub key_name: String,
    #[serde(default)]
    pub provision: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTyped", into = "RawTyped")]
pub enum SecretsProviderConfig {
    Passphrase(PassphraseSecretsProvider),
    GcpKms(GcpKmsSecretsProvider),
    AwsKms(AwsKmsSecretsProvider),
    Unknown { type_: String, config: Value },
}

impl SecretsProviderConfig {
    pub fn type_name(&self) -> &str {
        match self {
            SecretsProviderConfig::Passphrase(_) => SECRETS_PROVIDER_PASSPHRASE,
            SecretsProviderConfig::GcpKms(_) => SECRETS_PROVIDER_GCP_KMS,
            SecretsProviderConfig::AwsKms(_) => SECRETS_PROVIDER_AWS_KMS,
            SecretsProviderConfig::Unknown { type_, .. } => type_,
        }
    }

    pub fn auth(&self) -> Option<Auth> {
        match self {
            SecretsProviderConfig::GcpKms(c) => Some(Auth::Gcp(c.credentials.clone())),
            SecretsProviderConfig::AwsKms(c) => Some(Auth::Aws(c.credentials.clone())),
            _ => None,
        }
    }

    /// Whether the engine has to create the backing key before use
    pub fn is_provision_enabled(&self) -> bool {
        match self {
            SecretsProviderConfig::GcpKms(c) => c.provision,
            SecretsProviderConfig::AwsKms(c) => c.provision,
            _ => false,
        }
    }

    pub fn key_url(&self) -> String {
        match self {
            SecretsProviderConfig::Passphrase(_) => SECRETS_PROVIDER_PASSPHRASE.to_string(),
            SecretsProviderConfig::GcpKms(c) => format!(
                "gcpkms://projects/{}/locations/{}/keyRings/{}/cryptoKeys/{}",
                c.credentials.project_id, c.key_location, c.key_name, c.key_name
            ),
            SecretsProviderConfig::AwsKms(c) => format!(
                "awskms://alias/{}?region={}",
                c.key_name, c.credentials.region
            ),
            SecretsProviderConfig::Unknown { type_, .. } => format!("{}://", type_),
        }
    }
}

impl TryFrom<RawTyped> for SecretsProviderConfig {
    type Error = serde_json::Error;

    fn try_from(raw: RawTyped) -> Result<Self, Self::Error> {
        Ok(match raw.type_.as_str() {
            SECRETS_PROVIDER_PASSPHRASE => {
                SecretsProviderConfig::Passphrase(decode_config(raw.config)?)
            }
            SECRETS_PROVIDER_GCP_KMS => SecretsProviderConfig::GcpKms(decode_config(raw.config)?),
            SECRETS_PROVIDER_AWS_KMS => SecretsProviderConfig::AwsKms(decode_config(raw.config)?),
            _ => SecretsProviderConfig::Unknown {
                type_: raw.type_,
                config: raw.config,
            },
        })
    }
}

impl From<SecretsProviderConfig> for RawTyped {
    fn from(config: SecretsProviderConfig) -> Self {
        match config {
            SecretsProviderConfig::Passphrase(c) => {
                RawTyped::encode(SECRETS_PROVIDER_PASSPHRASE, &c)
            }
            SecretsProviderConfig::GcpKms(c) => RawTyped::encode(SECRETS_PROVIDER_GCP_KMS, &c),
            SecretsProviderConfig::AwsKms(c) => RawTyped::encode(SECRETS_PROVIDER_AWS_KMS, &c),
            SecretsProviderConfig::Unknown { type_, config } => RawTyped::new(type_, config),
        }
    }
}

// ============ Resources ============

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerStackResourcesDescriptor {
    /// Resources keyed by environment name, in declaration order
    #[serde(default)]
    pub resources: IndexMap<String, PerEnvResourcesDescriptor>,
    #[serde(default)]
    pub registrar: Option<RegistrarConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerEnvResourcesDescriptor {
    /// Template child stacks of this environment deploy with
    #[serde(default)]
    pub template: Option<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDescriptor>,
}

// ============ Registrar ============

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub name: String,
    #[serde(rename = "type", default = "default_record_type")]
    pub record_type: String,
    pub value: String,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default)]
    pub ttl: Option<u32>,
}

fn default_record_type() -> String {
    "A".to_string()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudflareRegistrarConfig {
    #[serde(flatten)]
    pub credentials: CloudflareCredentials,
    pub zone_name: String,
    #[serde(default)]
    pub records: Vec<DnsRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawTyped", into = "RawTyped")]
pub enum RegistrarConfig {
    Cloudflare(CloudflareRegistrarConfig),
    Unknown { type_: String, config: Value },
}

impl RegistrarConfig {
    pub fn type_name(&self) -> &str {
        match self {
            RegistrarConfig::Cloudflare(_) => REGISTRAR_CLOUDFLARE,
            RegistrarConfig::Unknown { type_, .. } => type_,
        }
    }

    pub fn auth(&self) -> Option<Auth> {
        match self {
            RegistrarConfig::Cloudflare(c) => Some(Auth::Cloudflare(c.credentials.clone())),
            RegistrarConfig::Unknown { .. } => None,
        }
    }

    pub fn zone_name(&self) -> Option<&str> {
        match self {
            RegistrarConfig::Cloudflare(c) => Some(&c.zone_name),
            RegistrarConfig::Unknown { .. } => None,
        }
    }

    pub fn records(&self) -> &[DnsRecord] {
        match self {
            RegistrarConfig::Cloudflare(c) => &c.records,
            RegistrarConfig::Unknown { .. } => &[],
        }
    }
}

impl TryFrom<RawTyped> for RegistrarConfig {
    type Error = serde_json::Error;

    fn try_from(raw: RawTyped) -> Result<Self, Self::Error> {
        Ok(match raw.type_.as_str() {
            REGISTRAR_CLOUDFLARE => RegistrarConfig::Cloudflare(decode_config(raw.config)?),
            _ => RegistrarConfig::Unknown {
                type_: raw.type_,
                config: raw.config,
            },
        })
    }
}

impl From<RegistrarConfig> for RawTyped {
    fn from(config: RegistrarConfig) -> Self {
        match config {
            RegistrarConfig::Cloudflare(c) => RawTyped::encode(REGISTRAR_CLOUDFLARE, &c),
            RegistrarConfig::Unknown { type_, config } => RawTyped::new(type_, config),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_provisioner_config() {
        let yaml = r#"
type: pulumi
config:
  organization: acme
  stateStorage:
    type: gcp-bucket
    config:
      projectId: acme-prod
      credentials: "{}"
      bucketName: acme-state
  secretsProvider:
    type: gcp-kms
    config:
      projectId: acme-prod
      credentials: "{}"
      keyName: acme-key
      provision: true
"#;
        let descriptor: ProvisionerDescriptor = serde_yaml::from_str(yaml).unwrap();
        let config = descriptor.config().expect("pulumi config");
        assert_eq!(config.organization, "acme");
        assert_eq!(config.state_storage.storage_url(), "gs://acme-state");
        assert_eq!(config.state_storage.credentials().as_deref(), Some("{}"));
        assert!(config.secrets_provider.is_provision_enabled());
        assert_eq!(
            config.secrets_provider.key_url(),
            "gcpkms://projects/acme-prod/locations/global/keyRings/acme-key/cryptoKeys/acme-key"
        );
    }

    #[test]
    fn test_unknown_provisioner_type_is_preserved() {
        let yaml = "type: terraform\nconfig: {}\n";
        let descriptor: ProvisionerDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.type_name(), "terraform");
        assert!(descriptor.config().is_none());
    }

    #[test]
    fn test_fs_storage_needs_no_credentials() {
        let storage: StateStorageConfig =
            serde_yaml::from_str("type: fs\nconfig:\n  path: /tmp/state\n").unwrap();
        assert_eq!(storage.credentials(), None);
        assert_eq!(storage.storage_url(), "file:///tmp/state");
    }

    #[test]
    fn test_registrar_records() {
        let yaml = r#"
type: cloudflare
config:
  apiToken: token
  accountId: acc
  zoneName: example.com
  records:
    - name: "@"
      type: TXT
      value: "v=spf1 -all"
"#;
        let registrar: RegistrarConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(registrar.zone_name(), Some("example.com"));
        assert_eq!(registrar.records().len(), 1);
        assert_eq!(registrar.records()[0].record_type, "TXT");
    }

    #[test]
    fn test_environments_keep_declaration_order() {
        let yaml = r#"
resources:
  prod:
    resources: {}
  staging:
    resources: {}
  dev:
    resources: {}
"#;
        let descriptor: PerStackResourcesDescriptor = serde_yaml::from_str(yaml).unwrap();
        let environments: Vec<&str> = descriptor.resources.keys().map(String::as_str).collect();
        assert_eq!(environments, vec!["prod", "staging", "dev"]);
    }
}
