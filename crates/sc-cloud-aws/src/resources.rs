//! Provisioning functions for the AWS resource and template types

use crate::provider::{
    KIND_BUCKET, KIND_CLUSTER, KIND_FUNCTION, KIND_KMS_KEY, KIND_SERVICE, KIND_TASK_DEFINITION,
};
use sc_api::{
    ClientConfig, RESOURCE_S3_BUCKET, ResourceConfig, SECRETS_PROVIDER_AWS_KMS,
    SecretsProviderConfig, StackDeployConfig, TEMPLATE_AWS_LAMBDA, TEMPLATE_ECS_FARGATE,
    TemplateConfig,
};
use sc_provisioner::engine::{ProgramContext, ProviderRef, ResourceArgs, ResourceRef};
use sc_provisioner::{ProvisionInput, ProvisionOutput, ProvisionerError, Result, env_name};
use serde_json::json;

const DEFAULT_TASK_CPU: &str = "256";
const DEFAULT_TASK_MEMORY: &str = "512";

fn config_error(expected: &'static str, type_name: &str) -> ProvisionerError {
    ProvisionerError::Config {
        expected,
        type_name: type_name.to_string(),
    }
}

fn physical_name(input: &ProvisionInput<'_>) -> String {
    format!("{}-{}", input.resource_name, input.environment)
}

fn deploy_config<'a>(
    input: &'a ProvisionInput<'_>,
    expected: &'static str,
) -> Result<&'a StackDeployConfig> {
    match &input.descriptor.config {
        ResourceConfig::Deploy(deploy) => Ok(deploy),
        _ => Err(config_error(expected, &input.descriptor.type_)),
    }
}

fn require_image<'a>(input: &ProvisionInput<'_>, client: &'a ClientConfig) -> Result<&'a str> {
    client.image.as_deref().ok_or_else(|| {
        ProvisionerError::Precondition(format!(
            "image is required to deploy {}",
            input.resource_name
        ))
    })
}

/// Megabytes of a memory setting such as `512`, `512Mi` or `1Gi`
pub fn memory_mb(memory: &str) -> Option<u32> {
    let digits: String = memory.chars().take_while(char::is_ascii_digit).collect();
    let value: u32 = digits.parse().ok()?;
    match memory[digits.len()..].trim() {
        "" | "M" | "Mi" | "MB" => Some(value),
        "G" | "Gi" | "GB" => Some(value * 1024),
        _ => None,
    }
}

pub fn s3_bucket(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::S3Bucket(config) = &input.descriptor.config else {
        return Err(config_error(RESOURCE_S3_BUCKET, &input.descriptor.type_));
    };
    let provider = input.require_provider()?;
    let name = physical_name(input);

    let bucket = input.ctx.register_resource(
        ResourceArgs::new(KIND_BUCKET, &name, provider)
            .inputs(json!({
                "name": name,
                "versioning": config.versioning,
                "allowOnlyHttps": config.allow_only_https,
            }))
            .replace_on_changes(["name"]),
    )?;

    let resource = input.resource_name;
    let collector = input.collector;
    collector.add_env_variable(resource, &env_name(resource, "bucket"), bucket.output("name"));
    collector.add_env_variable(resource, &env_name(resource, "region"), bucket.output("region"));
    collector.add_secret_env_variable(
        resource,
        &env_name(resource, "access_key"),
        config.credentials.access_key.as_str(),
    );
    collector.add_secret_env_variable(
        resource,
        &env_name(resource, "secret_key"),
        config.credentials.secret_access_key.as_str(),
    );
    collector.add_output(resource, "arn", bucket.output("arn"));
    Ok(ProvisionOutput::single(bucket))
}

/// ECS Fargate deployment: a cluster per stack and environment, a task
/// definition revision and the service running it
pub fn ecs_fargate(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let deploy = deploy_config(input, TEMPLATE_ECS_FARGATE)?;
    let TemplateConfig::EcsFargate(template) = &deploy.template.config else {
        return Err(config_error(TEMPLATE_ECS_FARGATE, &deploy.template.type_));
    };
    let client = &deploy.client.config;
    let image = require_image(input, client)?;
    if template.subnets.is_empty() {
        return Err(ProvisionerError::Precondition(format!(
            "ecs-fargate template of {} declares no subnets",
            input.resource_name
        )));
    }
    let provider = input.require_provider()?;
    let name = physical_name(input);

    let cluster = input.ctx.register_resource(
        ResourceArgs::new(KIND_CLUSTER, &name, provider)
            .inputs(json!({"name": name}))
            .replace_on_changes(["name"]),
    )?;

    let mut task = ResourceArgs::new(KIND_TASK_DEFINITION, input.resource_name, provider).inputs(
        json!({
            "family": input.resource_name,
            "image": image,
            "cpu": client.cpu.as_deref().unwrap_or(DEFAULT_TASK_CPU),
            "memory": client
                .memory
                .as_deref()
                .and_then(memory_mb)
                .map(|mb| mb.to_string())
                .unwrap_or_else(|| DEFAULT_TASK_MEMORY.to_string()),
            "port": client.port,
            "env": input.workload_env(client),
            "executionRoleArn": template.execution_role_arn,
        }),
    );
    for dependency in input.collector.dependencies() {
        task = task.depends_on(&dependency);
    }
    let task = input.ctx.register_resource(task)?;

    let scale = client.scale.unwrap_or_default();
    let service = input.ctx.register_resource(
        ResourceArgs::new(KIND_SERVICE, input.resource_name, provider)
            .inputs(json!({
                "name": input.resource_name,
                "cluster": cluster.output("name"),
                "taskDefinition": task.output("arn"),
                "desiredCount": scale.min,
                "subnets": template.subnets,
                "securityGroups": template.security_groups,
                "assignPublicIp": template.assign_public_ip,
            }))
            .replace_on_changes(["name", "cluster"]),
    )?;

    input
        .collector
        .add_output(input.resource_name, "cluster", cluster.output("name"));
    input
        .collector
        .add_output(input.resource_name, "service", service.output("arn"));
    Ok(ProvisionOutput {
        resources: vec![cluster, task, service],
    })
}

/// Lambda function running the client image, exposed through a function URL
pub fn aws_lambda(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let deploy = deploy_config(input, TEMPLATE_AWS_LAMBDA)?;
    let TemplateConfig::AwsLambda(template) = &deploy.template.config else {
        return Err(config_error(TEMPLATE_AWS_LAMBDA, &deploy.template.type_));
    };
    let client = &deploy.client.config;
    let image = require_image(input, client)?;
    if template.role_arn.is_empty() {
        return Err(ProvisionerError::Precondition(format!(
            "roleArn is required to deploy {} to Lambda",
            input.resource_name
        )));
    }
    let provider = input.require_provider()?;
    let name = physical_name(input);

    let mut function = ResourceArgs::new(KIND_FUNCTION, &name, provider)
        .inputs(json!({
            "name": name,
            "image": image,
            "roleArn": template.role_arn,
            "timeout": template.timeout,
            "memory": client.memory.as_deref().and_then(memory_mb),
            "env": input.workload_env(client),
        }))
        .replace_on_changes(["name"]);
    for dependency in input.collector.dependencies() {
        function = function.depends_on(&dependency);
    }
    let function = input.ctx.register_resource(function)?;

    input
        .collector
        .add_output(input.resource_name, "url", function.output("url"));
    input
        .collector
        .add_output(input.resource_name, "arn", function.output("arn"));
    Ok(ProvisionOutput::single(function))
}

/// KMS key behind the `aws-kms` secrets provider
pub fn kms_key(
    ctx: &ProgramContext,
    config: &SecretsProviderConfig,
    provider: &ProviderRef,
) -> Result<ResourceRef> {
    let SecretsProviderConfig::AwsKms(kms) = config else {
        return Err(config_error(SECRETS_PROVIDER_AWS_KMS, config.type_name()));
    };
    ctx.register_resource(
        ResourceArgs::new(KIND_KMS_KEY, &kms.key_name, provider)
            .inputs(json!({"alias": kms.key_name}))
            .replace_on_changes(["alias"]),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_mb() {
        assert_eq!(memory_mb("512"), Some(512));
        assert_eq!(memory_mb("512Mi"), Some(512));
        assert_eq!(memory_mb("2Gi"), Some(2048));
        assert_eq!(memory_mb("lots"), None);
        assert_eq!(memory_mb("1Ti"), None);
    }
}
