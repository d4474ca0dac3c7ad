//! DNS registrar abstraction

use crate::engine::{ProgramContext, ResourceRef};
use crate::error::{ProvisionerError, Result};
use sc_api::DnsRecord;
use serde_json::Value;

/// Rewrites the `Host` header of requests to `hostname`
#[derive(Debug, Clone, PartialEq)]
pub struct OverrideHeaderRule {
    pub name: String,
    pub hostname: String,
    /// Header value; may be an output reference
    pub host_header: Value,
}

/// Registers DNS resources into a program
pub trait Registrar: Send + Sync {
    /// Base records of the zone, registered once per parent provisioning
    fn provision_records(&self, ctx: &ProgramContext) -> Result<Vec<ResourceRef>>;

    fn new_record(&self, ctx: &ProgramContext, record: &DnsRecord) -> Result<ResourceRef>;

    fn new_override_header_rule(
        &self,
        ctx: &ProgramContext,
        rule: &OverrideHeaderRule,
    ) -> Result<ResourceRef>;
}

/// Registrar used when the stack declares none.
///
/// Every operation fails with [`ProvisionerError::RegistrarNotConfigured`];
/// callers check [`ProvisionerError::is_not_configured`].
#[derive(Debug, Clone, Copy, Default)]
pub struct NotConfigured;

impl Registrar for NotConfigured {
    fn provision_records(&self, _: &ProgramContext) -> Result<Vec<ResourceRef>> {
        Err(ProvisionerError::RegistrarNotConfigured)
    }

    fn new_record(&self, _: &ProgramContext, _: &DnsRecord) -> Result<ResourceRef> {
        Err(ProvisionerError::RegistrarNotConfigured)
    }

    fn new_override_header_rule(
        &self,
        _: &ProgramContext,
        _: &OverrideHeaderRule,
    ) -> Result<ResourceRef> {
        Err(ProvisionerError::RegistrarNotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StateBackend;
    use crate::engine::store::LocalObjectStore;
    use crate::secrets::PassphraseSecretsProvider;
    use crate::stackref::StackReference;
    use serde_json::json;
    use std::sync::Arc;

    fn context() -> ProgramContext {
        ProgramContext::new(
            StackReference::new("acme", "infra", "infra"),
            StateBackend::new(Arc::new(LocalObjectStore::new("/nonexistent"))),
            Arc::new(PassphraseSecretsProvider::new("pw").unwrap()),
        )
    }

    #[test]
    fn test_not_configured_rejects_every_operation() {
        let ctx = context();
        let registrar = NotConfigured;
        let record = DnsRecord {
            name: "www".to_string(),
            record_type: "CNAME".to_string(),
            value: "ghs.googlehosted.com".to_string(),
            ..Default::default()
        };
        let rule = OverrideHeaderRule {
            name: "web-app".to_string(),
            hostname: "web-app.example.com".to_string(),
            host_header: json!("web-app-xyz.run.app"),
        };

        let errors = [
            registrar.provision_records(&ctx).unwrap_err(),
            registrar.new_record(&ctx, &record).unwrap_err(),
            registrar.new_override_header_rule(&ctx, &rule).unwrap_err(),
        ];
        for err in errors {
            assert!(matches!(err, ProvisionerError::RegistrarNotConfigured));
            assert!(err.is_not_configured());
        }
        assert!(ctx.into_registrations().resources.is_empty());
    }
}
