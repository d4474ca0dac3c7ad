use sc_api::{DnsRecord, GcpCredentials, ResourceDescriptor};
use sc_cloud_gcp::GcpProvider;
use sc_provisioner::engine::{
    ProgramContext, ProviderRef, Registrations, ResourceArgs, ResourceRef, StateBackend,
};
use sc_provisioner::engine::LocalObjectStore;
use sc_provisioner::{
    ComputeContextCollector, NotConfigured, OverrideHeaderRule, PassphraseSecretsProvider,
    ProvisionInput, ProvisionOutput, Registrar, SessionEnv, StackReference,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

pub fn credentials() -> GcpCredentials {
    GcpCredentials {
        project_id: "acme-test".to_string(),
        credentials: String::new(),
    }
}

/// Program context over a state directory that is never written
pub fn context() -> ProgramContext {
    let backend = StateBackend::new(Arc::new(LocalObjectStore::new("/nonexistent")));
    ProgramContext::new(
        StackReference::new("acme", "infra", "infra"),
        backend,
        Arc::new(PassphraseSecretsProvider::new("test-pass").unwrap()),
    )
}

pub fn provider(ctx: &ProgramContext) -> ProviderRef {
    let gcp = GcpProvider::new(&credentials(), &SessionEnv::new()).unwrap();
    ctx.register_provider("gcp", Arc::new(gcp))
}

/// Registrar that registers nothing but remembers the records asked for
#[derive(Default)]
pub struct RecordingRegistrar {
    pub records: Mutex<Vec<DnsRecord>>,
}

impl Registrar for RecordingRegistrar {
    fn provision_records(&self, _: &ProgramContext) -> sc_provisioner::Result<Vec<ResourceRef>> {
        Ok(Vec::new())
    }

    fn new_record(
        &self,
        ctx: &ProgramContext,
        record: &DnsRecord,
    ) -> sc_provisioner::Result<ResourceRef> {
        self.records.lock().unwrap().push(record.clone());
        let provider = provider(ctx);
        ctx.register_resource(ResourceArgs::new("test:dns:Record", &record.name, &provider))
    }

    fn new_override_header_rule(
        &self,
        _: &ProgramContext,
        _: &OverrideHeaderRule,
    ) -> sc_provisioner::Result<ResourceRef> {
        unreachable!("not used by the GCP resources")
    }
}

/// Runs one provisioning function the way the program dispatch does
pub fn run<F>(
    f: F,
    resource_name: &str,
    descriptor: &ResourceDescriptor,
    collector: &ComputeContextCollector,
    registrar: Option<&dyn Registrar>,
) -> sc_provisioner::Result<(ProvisionOutput, Registrations)>
where
    F: Fn(&ProvisionInput<'_>) -> sc_provisioner::Result<ProvisionOutput>,
{
    let ctx = context();
    let provider = provider(&ctx);
    let mut base_env = BTreeMap::new();
    base_env.insert("SIMPLE_CONTAINER_STACK".to_string(), "web-app".to_string());
    base_env.insert("SIMPLE_CONTAINER_ENV".to_string(), "test".to_string());
    let session_env = SessionEnv::new();
    let output = f(&ProvisionInput {
        ctx: &ctx,
        stack_name: "infra",
        environment: "test",
        resource_name,
        descriptor,
        provider: Some(provider),
        collector,
        base_env: &base_env,
        helpers_image: "simplecontainer/gcp-cloud-helpers:test",
        registrar: registrar.unwrap_or(&NotConfigured),
        session_env: &session_env,
    })?;
    Ok((output, ctx.into_registrations()))
}
