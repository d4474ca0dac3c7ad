//! Provisioning function for `mongodb-atlas`

use crate::provider::{KIND_CLUSTER, KIND_DATABASE_USER, KIND_PROJECT};
use sc_api::{RESOURCE_MONGODB_ATLAS, ResourceConfig};
use sc_provisioner::engine::ResourceArgs;
use sc_provisioner::{ProvisionInput, ProvisionOutput, ProvisionerError, Result, env_name};
use serde_json::json;

const DEFAULT_ROLE: &str = "readWriteAnyDatabase";

/// Atlas project, a dedicated cluster and a database user whose
/// credentials reach the workloads as secret environment variables
pub fn mongodb_atlas(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::MongodbAtlas(config) = &input.descriptor.config else {
        return Err(ProvisionerError::Config {
            expected: RESOURCE_MONGODB_ATLAS,
            type_name: input.descriptor.type_.clone(),
        });
    };
    if config.region.is_empty() {
        return Err(ProvisionerError::Precondition(format!(
            "region is required for MongoDB Atlas cluster {}",
            input.resource_name
        )));
    }
    let provider = input.require_provider()?;
    let resource = input.resource_name;
    let name = format!("{}-{}", resource, input.environment);
    let project_name = config
        .project_name
        .clone()
        .unwrap_or_else(|| format!("{}-{}", input.stack_name, input.environment));

    let project = input.ctx.register_resource(
        ResourceArgs::new(KIND_PROJECT, &project_name, provider)
            .inputs(json!({"name": project_name}))
            .replace_on_changes(["name"]),
    )?;

    let cluster = input.ctx.register_resource(
        ResourceArgs::new(KIND_CLUSTER, &name, provider)
            .inputs(json!({
                "projectId": project.output("id"),
                "name": name,
                "provider": config.cloud_provider,
                "region": config.region,
                "tier": config.instance_size,
            }))
            .replace_on_changes(["projectId", "name", "provider", "region"]),
    )?;

    let user = input.ctx.register_resource(
        ResourceArgs::new(KIND_DATABASE_USER, &name, provider)
            .inputs(json!({
                "projectId": project.output("id"),
                "username": name,
                "database": resource,
                "role": DEFAULT_ROLE,
                "connectionString": cluster.output("connectionString"),
            }))
            .replace_on_changes(["projectId", "username"]),
    )?;

    let collector = input.collector;
    collector.add_env_variable(resource, &env_name(resource, "database"), resource);
    collector.add_env_variable(resource, &env_name(resource, "user"), user.output("username"));
    collector.add_secret_env_variable(resource, &env_name(resource, "password"), user.output("password"));
    collector.add_secret_env_variable(resource, &env_name(resource, "uri"), user.output("uri"));
    collector.add_output(resource, "cluster", cluster.output("name"));
    collector.add_output(resource, "projectId", project.output("id"));
    Ok(ProvisionOutput {
        resources: vec![project, cluster, user],
    })
}
