//! Provisioning functions for the GCP resource and template types

use crate::provider::{
    KIND_BUCKET, KIND_CLUSTER, KIND_CRYPTO_KEY, KIND_DOMAIN_MAPPING, KIND_REPOSITORY,
    KIND_SERVICE,
};
use sc_api::{
    DnsRecord, RESOURCE_GCP_ARTIFACT_REGISTRY, RESOURCE_GCP_BUCKET, RESOURCE_GKE_AUTOPILOT,
    ResourceConfig, SECRETS_PROVIDER_GCP_KMS, SecretsProviderConfig, TEMPLATE_CLOUDRUN,
    TemplateConfig,
};
use sc_provisioner::engine::{ProgramContext, ProviderRef, ResourceArgs, ResourceRef};
use sc_provisioner::{ProvisionInput, ProvisionOutput, ProvisionerError, Result, env_name};
use serde_json::json;

/// Cloud Run serves custom domains through this host
pub const CLOUD_RUN_DOMAIN_TARGET: &str = "ghs.googlehosted.com";

fn config_error(expected: &'static str, input: &ProvisionInput<'_>) -> ProvisionerError {
    ProvisionerError::Config {
        expected,
        type_name: input.descriptor.type_.clone(),
    }
}

/// Physical name of a per-environment resource
fn physical_name(input: &ProvisionInput<'_>) -> String {
    format!("{}-{}", input.resource_name, input.environment)
}

pub fn bucket(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::GcpBucket(config) = &input.descriptor.config else {
        return Err(config_error(RESOURCE_GCP_BUCKET, input));
    };
    let provider = input.require_provider()?;
    let name = physical_name(input);

    let bucket = input.ctx.register_resource(
        ResourceArgs::new(KIND_BUCKET, &name, provider)
            .inputs(json!({
                "name": name,
                "location": config.location,
                "storageClass": config.storage_class,
            }))
            .replace_on_changes(["name", "location"]),
    )?;

    let resource = input.resource_name;
    input
        .collector
        .add_env_variable(resource, &env_name(resource, "bucket"), bucket.output("name"));
    input
        .collector
        .add_env_variable(resource, &env_name(resource, "url"), bucket.output("url"));
    input.collector.add_output(resource, "name", bucket.output("name"));
    Ok(ProvisionOutput::single(bucket))
}

pub fn gke_autopilot(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::GkeAutopilot(config) = &input.descriptor.config else {
        return Err(config_error(RESOURCE_GKE_AUTOPILOT, input));
    };
    if config.location.is_empty() {
        return Err(ProvisionerError::Precondition(format!(
            "location is required for GKE autopilot cluster {}",
            input.resource_name
        )));
    }
    let provider = input.require_provider()?;
    let name = physical_name(input);

    let cluster = input.ctx.register_resource(
        ResourceArgs::new(KIND_CLUSTER, &name, provider)
            .inputs(json!({
                "name": name,
                "location": config.location,
                "minVersion": config.gke_min_version,
            }))
            .replace_on_changes(["name", "location", "minVersion"]),
    )?;

    let resource = input.resource_name;
    input.collector.add_output(resource, "name", cluster.output("name"));
    input.collector.add_secret_env_variable(
        resource,
        &env_name(resource, "endpoint"),
        cluster.output("endpoint"),
    );
    Ok(ProvisionOutput::single(cluster))
}

pub fn artifact_registry(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::ArtifactRegistry(config) = &input.descriptor.config else {
        return Err(config_error(RESOURCE_GCP_ARTIFACT_REGISTRY, input));
    };
    let provider = input.require_provider()?;
    let name = physical_name(input);

    let repository = input.ctx.register_resource(
        ResourceArgs::new(KIND_REPOSITORY, &name, provider)
            .inputs(json!({
                "name": name,
                "location": config.location,
                "format": config.format,
            }))
            .replace_on_changes(["name", "location", "format"]),
    )?;

    let resource = input.resource_name;
    input
        .collector
        .add_env_variable(resource, &env_name(resource, "registry"), repository.output("url"));
    input.collector.add_output(resource, "url", repository.output("url"));
    Ok(ProvisionOutput::single(repository))
}

/// Cloud Run deployment of a child stack.
///
/// The service gets the base variables, the client's own variables and
/// secrets, and the context of every parent resource the client uses.
pub fn cloudrun(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::Deploy(deploy) = &input.descriptor.config else {
        return Err(config_error(TEMPLATE_CLOUDRUN, input));
    };
    let TemplateConfig::CloudRun(template) = &deploy.template.config else {
        return Err(ProvisionerError::Config {
            expected: TEMPLATE_CLOUDRUN,
            type_name: deploy.template.type_.clone(),
        });
    };
    let client = &deploy.client.config;
    let image = client.image.as_deref().ok_or_else(|| {
        ProvisionerError::Precondition(format!(
            "image is required to deploy {} to Cloud Run",
            input.resource_name
        ))
    })?;
    let provider = input.require_provider()?;

    let env = input.workload_env(client);
    let scale = client.scale.unwrap_or_default();
    let mut args = ResourceArgs::new(KIND_SERVICE, input.resource_name, provider)
        .inputs(json!({
            "name": input.resource_name,
            "region": template.location,
            "image": image,
            "port": client.port,
            "env": env,
            "cpu": client.cpu,
            "memory": client.memory,
            "minInstances": scale.min,
            "maxInstances": scale.max,
        }))
        .replace_on_changes(["name", "region"]);
    for dependency in input.collector.dependencies() {
        args = args.depends_on(&dependency);
    }
    let service = input.ctx.register_resource(args)?;
    let mut output = ProvisionOutput::single(service.clone());

    if let Some(domain) = client.domain.as_deref() {
        let record = DnsRecord {
            name: domain.to_string(),
            record_type: "CNAME".to_string(),
            value: CLOUD_RUN_DOMAIN_TARGET.to_string(),
            proxied: false,
            ttl: None,
        };
        match input.registrar.new_record(input.ctx, &record) {
            Ok(dns) => output.resources.push(dns),
            Err(e) if e.is_not_configured() => {
                tracing::warn!(domain, "Registrar is not configured, skipping DNS record");
            }
            Err(e) => return Err(e),
        }
        let mapping = input.ctx.register_resource(
            ResourceArgs::new(KIND_DOMAIN_MAPPING, domain, provider)
                .inputs(json!({
                    "domain": domain,
                    "service": service.output("name"),
                    "region": template.location,
                }))
                .replace_on_changes(["domain", "service", "region"]),
        )?;
        output.resources.push(mapping);
    }

    input
        .collector
        .add_output(input.resource_name, "url", service.output("url"));
    Ok(output)
}

/// KMS key behind the `gcp-kms` secrets provider
pub fn kms_key(
    ctx: &ProgramContext,
    config: &SecretsProviderConfig,
    provider: &ProviderRef,
) -> Result<ResourceRef> {
    let SecretsProviderConfig::GcpKms(kms) = config else {
        return Err(ProvisionerError::Config {
            expected: SECRETS_PROVIDER_GCP_KMS,
            type_name: config.type_name().to_string(),
        });
    };
    ctx.register_resource(
        ResourceArgs::new(KIND_CRYPTO_KEY, &kms.key_name, provider)
            .inputs(json!({
                "keyRing": kms.key_name,
                "name": kms.key_name,
                "location": kms.key_location,
            }))
            .replace_on_changes(["keyRing", "name", "location"]),
    )
}
