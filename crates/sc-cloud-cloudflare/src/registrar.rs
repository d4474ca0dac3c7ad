//! Cloudflare DNS registrar

use crate::provider::{CloudflareProvider, KIND_DNS_RECORD, KIND_RULE};
use sc_api::{CloudflareRegistrarConfig, DnsRecord, REGISTRAR_CLOUDFLARE, RegistrarConfig};
use sc_provisioner::engine::{ProgramContext, ProviderRef, ResourceArgs, ResourceRef};
use sc_provisioner::{OverrideHeaderRule, ProvisionerError, Registrar, Result, SessionEnv};
use serde_json::json;
use std::sync::Arc;

const PROVIDER_KEY: &str = "cloudflare-registrar";

/// Registers DNS records and host header rules of one zone
pub struct CloudflareRegistrar {
    config: CloudflareRegistrarConfig,
    provider: Arc<CloudflareProvider>,
}

impl CloudflareRegistrar {
    pub fn new(config: CloudflareRegistrarConfig, session_env: &SessionEnv) -> Result<Self> {
        if config.zone_name.is_empty() {
            return Err(ProvisionerError::Precondition(
                "zoneName is required for the cloudflare registrar".to_string(),
            ));
        }
        let provider = CloudflareProvider::new(&config.credentials, session_env)?;
        Ok(Self {
            config,
            provider: Arc::new(provider),
        })
    }

    fn provider_ref(&self, ctx: &ProgramContext) -> ProviderRef {
        ctx.register_provider(PROVIDER_KEY, self.provider.clone())
    }

    /// Resource name of a record, unique per name and type
    fn record_name(&self, record: &DnsRecord) -> String {
        format!(
            "{}-{}",
            crate::api::fqdn(&record.name, &self.config.zone_name),
            record.record_type.to_lowercase()
        )
    }
}

impl Registrar for CloudflareRegistrar {
    fn provision_records(&self, ctx: &ProgramContext) -> Result<Vec<ResourceRef>> {
        self.config
            .records
            .iter()
            .map(|record| self.new_record(ctx, record))
            .collect()
    }

    fn new_record(&self, ctx: &ProgramContext, record: &DnsRecord) -> Result<ResourceRef> {
        let provider = self.provider_ref(ctx);
        ctx.register_resource(
            ResourceArgs::new(KIND_DNS_RECORD, &self.record_name(record), &provider)
                .inputs(json!({
                    "zoneName": self.config.zone_name,
                    "name": record.name,
                    "type": record.record_type,
                    "value": record.value,
                    "proxied": record.proxied,
                    "ttl": record.ttl,
                }))
                .replace_on_changes(["zoneName", "name", "type"]),
        )
    }

    fn new_override_header_rule(
        &self,
        ctx: &ProgramContext,
        rule: &OverrideHeaderRule,
    ) -> Result<ResourceRef> {
        let provider = self.provider_ref(ctx);
        ctx.register_resource(
            ResourceArgs::new(KIND_RULE, &rule.name, &provider)
                .inputs(json!({
                    "zoneName": self.config.zone_name,
                    "name": rule.name,
                    "hostname": rule.hostname,
                    "hostHeader": rule.host_header,
                }))
                .replace_on_changes(["zoneName"]),
        )
    }
}

/// Builds the `cloudflare` registrar
pub fn registrar(config: &RegistrarConfig, env: &SessionEnv) -> Result<Arc<dyn Registrar>> {
    let RegistrarConfig::Cloudflare(cloudflare) = config else {
        return Err(ProvisionerError::Config {
            expected: REGISTRAR_CLOUDFLARE,
            type_name: config.type_name().to_string(),
        });
    };
    Ok(Arc::new(CloudflareRegistrar::new(cloudflare.clone(), env)?))
}
