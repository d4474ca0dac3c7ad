mod common;

use common::{context, credentials};
use sc_api::{R2BucketConfig, ResourceConfig, ResourceDescriptor};
use sc_cloud_cloudflare::{CloudflareProvider, resources};
use sc_provisioner::{
    ComputeContextCollector, NotConfigured, ProvisionInput, ProvisionerError, SessionEnv,
};
use std::collections::BTreeMap;
use std::sync::Arc;

fn provision(
    descriptor: &ResourceDescriptor,
    collector: &ComputeContextCollector,
) -> sc_provisioner::Result<sc_provisioner::engine::Registrations> {
    let ctx = context();
    let provider = CloudflareProvider::new(&credentials(), &SessionEnv::new()).unwrap();
    let provider = ctx.register_provider("cloudflare", Arc::new(provider));
    let base_env = BTreeMap::new();
    let session_env = SessionEnv::new();
    resources::r2_bucket(&ProvisionInput {
        ctx: &ctx,
        stack_name: "infra",
        environment: "prod",
        resource_name: "media",
        descriptor,
        provider: Some(provider),
        collector,
        base_env: &base_env,
        helpers_image: "simplecontainer/cloud-helpers:test",
        registrar: &NotConfigured,
        session_env: &session_env,
    })?;
    Ok(ctx.into_registrations())
}

#[test]
fn test_r2_bucket() {
    let collector = ComputeContextCollector::new("infra", "prod");
    let descriptor = ResourceDescriptor::new(
        "cloudflare-r2-bucket",
        ResourceConfig::R2Bucket(R2BucketConfig {
            credentials: credentials(),
            location: Some("weur".to_string()),
        }),
    );

    let registrations = provision(&descriptor, &collector).unwrap();

    let bucket = &registrations.resources[0];
    assert_eq!(bucket.kind, "cloudflare:r2:Bucket");
    assert_eq!(bucket.inputs["name"], "media-prod");
    assert_eq!(bucket.inputs["location"], "weur");
    let context = collector.resource_context("media").unwrap();
    assert_eq!(context.env["MEDIA_ACCOUNT_ID"], "abc123");
    assert!(context.env.contains_key("MEDIA_ENDPOINT"));
}

#[test]
fn test_r2_bucket_requires_account() {
    let collector = ComputeContextCollector::new("infra", "prod");
    let mut config = R2BucketConfig {
        credentials: credentials(),
        location: None,
    };
    config.credentials.account_id.clear();
    let descriptor = ResourceDescriptor::new("cloudflare-r2-bucket", ResourceConfig::R2Bucket(config));
    let err = provision(&descriptor, &collector).unwrap_err();
    assert!(matches!(err, ProvisionerError::Precondition(ref m) if m.contains("accountId")));
}
