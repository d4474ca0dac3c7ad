use sc_api::{AwsCredentials, ResourceDescriptor};
use sc_cloud_aws::AwsProvider;
use sc_provisioner::engine::{LocalObjectStore, ProgramContext, Registrations, StateBackend};
use sc_provisioner::{
    ComputeContextCollector, NotConfigured, PassphraseSecretsProvider, ProvisionInput,
    ProvisionOutput, SessionEnv, StackReference,
};
use std::collections::BTreeMap;
use std::sync::Arc;

pub fn credentials() -> AwsCredentials {
    AwsCredentials {
        account: "123456789012".to_string(),
        access_key: "AKIATEST".to_string(),
        secret_access_key: "secret".to_string(),
        region: "eu-central-1".to_string(),
    }
}

/// Runs one provisioning function against a fresh program context
pub fn run<F>(
    f: F,
    resource_name: &str,
    descriptor: &ResourceDescriptor,
    collector: &ComputeContextCollector,
) -> sc_provisioner::Result<(ProvisionOutput, Registrations)>
where
    F: Fn(&ProvisionInput<'_>) -> sc_provisioner::Result<ProvisionOutput>,
{
    let ctx = ProgramContext::new(
        StackReference::new("acme", "infra", "infra"),
        StateBackend::new(Arc::new(LocalObjectStore::new("/nonexistent"))),
        Arc::new(PassphraseSecretsProvider::new("test-pass").unwrap()),
    );
    let aws = AwsProvider::new(&credentials(), &SessionEnv::new()).unwrap();
    let provider = ctx.register_provider("aws", Arc::new(aws));
    let base_env = BTreeMap::from([
        ("SIMPLE_CONTAINER_STACK".to_string(), "web-app".to_string()),
        ("SIMPLE_CONTAINER_ENV".to_string(), "test".to_string()),
    ]);
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
        helpers_image: "simplecontainer/aws-cloud-helpers:test",
        registrar: &NotConfigured,
        session_env: &session_env,
    })?;
    Ok((output, ctx.into_registrations()))
}
