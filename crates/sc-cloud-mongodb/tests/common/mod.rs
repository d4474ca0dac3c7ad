use sc_api::{MongodbCredentials, ResourceDescriptor};
use sc_cloud_mongodb::MongodbProvider;
use sc_provisioner::engine::{LocalObjectStore, ProgramContext, Registrations, StateBackend};
use sc_provisioner::{
    ComputeContextCollector, NotConfigured, PassphraseSecretsProvider, ProvisionInput,
    ProvisionOutput, SessionEnv, StackReference,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn credentials() -> MongodbCredentials {
    MongodbCredentials {
        org_id: "5f1a2b".to_string(),
        public_key: "pub".to_string(),
        private_key: "priv".to_string(),
    }
}

pub fn run(
    resource_name: &str,
    descriptor: &ResourceDescriptor,
    collector: &ComputeContextCollector,
) -> sc_provisioner::Result<(ProvisionOutput, Registrations)> {
    let ctx = ProgramContext::new(
        StackReference::new("acme", "infra", "infra"),
        StateBackend::new(Arc::new(LocalObjectStore::new("/nonexistent"))),
        Arc::new(PassphraseSecretsProvider::new("test-pass").unwrap()),
    );
    let mongodb = MongodbProvider::new(&credentials(), &SessionEnv::new()).unwrap();
    let provider = ctx.register_provider("mongodb", Arc::new(mongodb));
    let base_env = BTreeMap::new();
    let session_env = SessionEnv::new();
    let output = sc_cloud_mongodb::resources::mongodb_atlas(&ProvisionInput {
        ctx: &ctx,
        stack_name: "infra",
        environment: "prod",
        resource_name,
        descriptor,
        provider: Some(provider),
        collector,
        base_env: &base_env,
        helpers_image: "simplecontainer/cloud-helpers:test",
        registrar: &NotConfigured,
        session_env: &session_env,
    })?;
    Ok((output, ctx.into_registrations()))
}
