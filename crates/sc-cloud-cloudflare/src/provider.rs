//! Cloudflare provider implementation

use crate::api::{CloudflareApi, DnsRecordInfo, ORIGIN_PHASE, RuleInfo, fqdn};
use crate::error::{CloudflareError, Result};
use crate::wrangler::Wrangler;
use async_trait::async_trait;
use sc_api::CloudflareCredentials;
use sc_provisioner::SessionEnv;
use sc_provisioner::engine::{AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest};
use serde::Deserialize;

pub const KIND_R2_BUCKET: &str = "cloudflare:r2:Bucket";
pub const KIND_DNS_RECORD: &str = "cloudflare:dns:Record";
pub const KIND_RULE: &str = "cloudflare:ruleset:Rule";

/// TTL value the API reads as "automatic"
const AUTO_TTL: u32 = 1;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct R2BucketInputs {
    pub name: String,
    #[serde(default)]
    pub location: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DnsRecordInputs {
    pub zone_name: String,
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: String,
    pub value: String,
    #[serde(default)]
    pub proxied: bool,
    #[serde(default)]
    pub ttl: Option<u32>,
}

impl DnsRecordInputs {
    fn record(&self) -> DnsRecordInfo {
        DnsRecordInfo {
            id: String::new(),
            name: fqdn(&self.name, &self.zone_name),
            record_type: self.record_type.clone(),
            content: self.value.clone(),
            // proxied records must use automatic TTL
            ttl: if self.proxied {
                AUTO_TTL
            } else {
                self.ttl.unwrap_or(AUTO_TTL)
            },
            proxied: self.proxied,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleInputs {
    pub zone_name: String,
    pub name: String,
    pub hostname: String,
    pub host_header: String,
}

impl RuleInputs {
    fn rule(&self) -> RuleInfo {
        RuleInfo::host_header_override(&self.name, &self.hostname, &self.host_header)
    }
}

fn decode<T: serde::de::DeserializeOwned>(request: &ResourceRequest) -> Result<T> {
    Ok(serde_json::from_value(request.inputs.clone())?)
}

fn record_outputs(zone_id: &str, record: &DnsRecordInfo) -> ResourceOutputs {
    ResourceOutputs::new()
        .with("id", record.id.as_str())
        .with("zoneId", zone_id)
        .with("hostname", record.name.as_str())
        .with("content", record.content.as_str())
}

/// Cloudflare provider
pub struct CloudflareProvider {
    api: CloudflareApi,
    wrangler: Wrangler,
}

impl CloudflareProvider {
    pub fn new(credentials: &CloudflareCredentials, session_env: &SessionEnv) -> Result<Self> {
        if credentials.api_token.is_empty() {
            return Err(CloudflareError::InvalidConfig(
                "apiToken is required for Cloudflare".to_string(),
            ));
        }
        Ok(Self {
            api: CloudflareApi::new(&credentials.api_token),
            wrangler: Wrangler::new(credentials, session_env),
        })
    }

    fn bucket_outputs(&self, name: &str) -> ResourceOutputs {
        ResourceOutputs::new()
            .with("name", name)
            .with("endpoint", self.wrangler.r2_endpoint())
    }

    /// Zone id recorded by an earlier apply, else looked up by name
    async fn zone_id(&self, request: &ResourceRequest, zone_name: &str) -> Result<String> {
        match request.output_str("zoneId") {
            Some(id) => Ok(id.to_string()),
            None => self.api.zone_id(zone_name).await,
        }
    }

    async fn apply_record(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        let inputs: DnsRecordInputs = decode(request)?;
        let zone_id = self.zone_id(request, &inputs.zone_name).await?;
        let record = self.api.ensure_record(&zone_id, &inputs.record()).await?;
        Ok(record_outputs(&zone_id, &record))
    }

    async fn create_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_R2_BUCKET => {
                let inputs: R2BucketInputs = decode(request)?;
                if !self.wrangler.r2_bucket_exists(&inputs.name).await? {
                    self.wrangler
                        .create_r2_bucket(&inputs.name, inputs.location.as_deref())
                        .await?;
                }
                Ok(self.bucket_outputs(&inputs.name))
            }
            KIND_DNS_RECORD => self.apply_record(request).await,
            KIND_RULE => {
                let inputs: RuleInputs = decode(request)?;
                let zone_id = self.api.zone_id(&inputs.zone_name).await?;
                let (ruleset_id, rule) = self
                    .api
                    .add_rule(&zone_id, ORIGIN_PHASE, &inputs.rule())
                    .await?;
                Ok(ResourceOutputs::new()
                    .with("id", rule.id)
                    .with("rulesetId", ruleset_id)
                    .with("zoneId", zone_id))
            }
            other => Err(CloudflareError::UnsupportedKind(other.to_string())),
        }
    }

    async fn read_resource(&self, request: &ResourceRequest) -> Result<Option<ResourceOutputs>> {
        match request.kind.as_str() {
            KIND_R2_BUCKET => {
                let inputs: R2BucketInputs = decode(request)?;
                let exists = self.wrangler.r2_bucket_exists(&inputs.name).await?;
                Ok(exists.then(|| self.bucket_outputs(&inputs.name)))
            }
            KIND_DNS_RECORD => {
                let (Some(zone_id), Some(id)) =
                    (request.output_str("zoneId"), request.output_str("id"))
                else {
                    return Ok(None);
                };
                let record = self.api.get_record(zone_id, id).await?;
                Ok(record.map(|r| record_outputs(zone_id, &r)))
            }
            KIND_RULE => {
                let (Some(zone_id), Some(id)) =
                    (request.output_str("zoneId"), request.output_str("id"))
                else {
                    return Ok(None);
                };
                let ruleset = self.api.entrypoint_ruleset(zone_id, ORIGIN_PHASE).await?;
                Ok(ruleset.and_then(|ruleset| {
                    ruleset.rules.iter().any(|r| r.id == id).then(|| {
                        ResourceOutputs::new()
                            .with("id", id)
                            .with("rulesetId", ruleset.id.as_str())
                            .with("zoneId", zone_id)
                    })
                }))
            }
            other => Err(CloudflareError::UnsupportedKind(other.to_string())),
        }
    }

    async fn update_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_DNS_RECORD => self.apply_record(request).await,
            KIND_RULE => {
                let inputs: RuleInputs = decode(request)?;
                let (Some(zone_id), Some(ruleset_id), Some(id)) = (
                    request.output_str("zoneId"),
                    request.output_str("rulesetId"),
                    request.output_str("id"),
                ) else {
                    return self.create_resource(request).await;
                };
                self.api
                    .update_rule(zone_id, ruleset_id, id, &inputs.rule())
                    .await?;
                Ok(ResourceOutputs::new()
                    .with("id", id)
                    .with("rulesetId", ruleset_id)
                    .with("zoneId", zone_id))
            }
            _ => self.create_resource(request).await,
        }
    }

    async fn delete_resource(&self, request: &ResourceRequest) -> Result<()> {
        match request.kind.as_str() {
            KIND_R2_BUCKET => {
                let inputs: R2BucketInputs = decode(request)?;
                self.wrangler.delete_r2_bucket(&inputs.name).await
            }
            KIND_DNS_RECORD => {
                let (Some(zone_id), Some(id)) =
                    (request.output_str("zoneId"), request.output_str("id"))
                else {
                    tracing::debug!(name = %request.name, "DNS record was never created");
                    return Ok(());
                };
                self.api.delete_record(zone_id, id).await
            }
            KIND_RULE => {
                let (Some(zone_id), Some(ruleset_id), Some(id)) = (
                    request.output_str("zoneId"),
                    request.output_str("rulesetId"),
                    request.output_str("id"),
                ) else {
                    return Ok(());
                };
                self.api.delete_rule(zone_id, ruleset_id, id).await
            }
            other => Err(CloudflareError::UnsupportedKind(other.to_string())),
        }
    }
}

#[async_trait]
impl CloudProvider for CloudflareProvider {
    fn name(&self) -> &str {
        sc_api::PROVIDER_CLOUDFLARE
    }

    async fn check_auth(&self) -> sc_provisioner::Result<AuthStatus> {
        match self.api.verify_token().await {
            Ok(status) if status == "active" => Ok(AuthStatus::ok(format!(
                "API token active for account {}",
                self.wrangler.account_id()
            ))),
            Ok(status) => Ok(AuthStatus::failed(format!("API token is {}", status))),
            Err(CloudflareError::ApiError(message)) => Ok(AuthStatus::failed(message)),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Creating Cloudflare resource");
        Ok(self.create_resource(request).await?)
    }

    async fn read(
        &self,
        request: &ResourceRequest,
    ) -> sc_provisioner::Result<Option<ResourceOutputs>> {
        Ok(self.read_resource(request).await?)
    }

    async fn update(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Updating Cloudflare resource");
        Ok(self.update_resource(request).await?)
    }

    async fn delete(&self, request: &ResourceRequest) -> sc_provisioner::Result<()> {
        tracing::info!(kind = %request.kind, name = %request.name, "Deleting Cloudflare resource");
        Ok(self.delete_resource(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_requires_token() {
        assert!(matches!(
            CloudflareProvider::new(&CloudflareCredentials::default(), &SessionEnv::new()),
            Err(CloudflareError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_proxied_record_uses_auto_ttl() {
        let inputs: DnsRecordInputs = serde_json::from_value(json!({
            "zoneName": "example.com",
            "name": "www",
            "type": "A",
            "value": "203.0.113.10",
            "proxied": true,
            "ttl": 300,
        }))
        .unwrap();
        let record = inputs.record();
        assert_eq!(record.name, "www.example.com");
        assert_eq!(record.ttl, AUTO_TTL);
    }

    #[test]
    fn test_record_ttl() {
        let inputs: DnsRecordInputs = serde_json::from_value(json!({
            "zoneName": "example.com",
            "name": "api.example.com",
            "type": "CNAME",
            "value": "ghs.googlehosted.com",
            "ttl": 300,
        }))
        .unwrap();
        assert_eq!(inputs.record().ttl, 300);
    }
}
