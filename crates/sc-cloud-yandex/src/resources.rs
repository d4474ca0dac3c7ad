//! Provisioning functions for the Yandex Cloud resource and template types

use crate::provider::{KIND_BUCKET, KIND_CONTAINER};
use sc_api::{RESOURCE_YC_BUCKET, ResourceConfig, TEMPLATE_YC_SERVERLESS_CONTAINER, TemplateConfig};
use sc_provisioner::engine::ResourceArgs;
use sc_provisioner::{ProvisionInput, ProvisionOutput, ProvisionerError, Result, env_name};
use serde_json::json;

/// yc expects memory with a unit, so bare numbers are megabytes
fn container_memory(memory: &str) -> String {
    let memory = memory.trim();
    if memory.chars().all(|c| c.is_ascii_digit()) {
        return format!("{}MB", memory);
    }
    match memory.strip_suffix('i') {
        Some(binary) => format!("{}B", binary.to_uppercase()),
        None => memory.to_uppercase(),
    }
}

pub fn yc_bucket(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::YandexBucket(config) = &input.descriptor.config else {
        return Err(ProvisionerError::Config {
            expected: RESOURCE_YC_BUCKET,
            type_name: input.descriptor.type_.clone(),
        });
    };
    let provider = input.require_provider()?;
    let name = format!("{}-{}", input.resource_name, input.environment);

    let bucket = input.ctx.register_resource(
        ResourceArgs::new(KIND_BUCKET, &name, provider)
            .inputs(json!({
                "name": name,
                "maxSize": config.max_size,
                "publicRead": config.public_read,
            }))
            .replace_on_changes(["name"]),
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

/// Serverless container running the client image with one revision per deploy
pub fn yc_serverless_container(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let deploy = match &input.descriptor.config {
        ResourceConfig::Deploy(deploy) => deploy,
        _ => {
            return Err(ProvisionerError::Config {
                expected: TEMPLATE_YC_SERVERLESS_CONTAINER,
                type_name: input.descriptor.type_.clone(),
            });
        }
    };
    let TemplateConfig::YcServerlessContainer(template) = &deploy.template.config else {
        return Err(ProvisionerError::Config {
            expected: TEMPLATE_YC_SERVERLESS_CONTAINER,
            type_name: deploy.template.type_.clone(),
        });
    };
    let client = &deploy.client.config;
    let image = client.image.as_deref().ok_or_else(|| {
        ProvisionerError::Precondition(format!(
            "image is required to deploy {}",
            input.resource_name
        ))
    })?;
    if template.service_account_id.is_empty() {
        return Err(ProvisionerError::Precondition(format!(
            "serviceAccountId is required to deploy {} as a serverless container",
            input.resource_name
        )));
    }
    let provider = input.require_provider()?;
    let name = format!("{}-{}", input.resource_name, input.environment);

    let mut container = ResourceArgs::new(KIND_CONTAINER, &name, provider)
        .inputs(json!({
            "name": name,
            "image": image,
            "serviceAccountId": template.service_account_id,
            "env": input.workload_env(client),
            "memory": client.memory.as_deref().map(container_memory),
            "cores": client.cpu,
            "concurrency": client.scale.map(|s| s.max),
        }))
        .replace_on_changes(["name"]);
    for dependency in input.collector.dependencies() {
        container = container.depends_on(&dependency);
    }
    let container = input.ctx.register_resource(container)?;

    input
        .collector
        .add_output(input.resource_name, "url", container.output("url"));
    Ok(ProvisionOutput::single(container))
}
