//! Provisioning function for `cloudflare-r2-bucket`

use crate::provider::KIND_R2_BUCKET;
use sc_api::{RESOURCE_R2_BUCKET, ResourceConfig};
use sc_provisioner::engine::ResourceArgs;
use sc_provisioner::{ProvisionInput, ProvisionOutput, ProvisionerError, Result, env_name};
use serde_json::json;

pub fn r2_bucket(input: &ProvisionInput<'_>) -> Result<ProvisionOutput> {
    let ResourceConfig::R2Bucket(config) = &input.descriptor.config else {
        return Err(ProvisionerError::Config {
            expected: RESOURCE_R2_BUCKET,
            type_name: input.descriptor.type_.clone(),
        });
    };
    if config.credentials.account_id.is_empty() {
        return Err(ProvisionerError::Precondition(format!(
            "accountId is required for R2 bucket {}",
            input.resource_name
        )));
    }
    let provider = input.require_provider()?;
    let name = format!("{}-{}", input.resource_name, input.environment);

    let bucket = input.ctx.register_resource(
        ResourceArgs::new(KIND_R2_BUCKET, &name, provider)
            .inputs(json!({
                "name": name,
                "location": config.location,
            }))
            .replace_on_changes(["name", "location"]),
    )?;

    let resource = input.resource_name;
    let collector = input.collector;
    collector.add_env_variable(resource, &env_name(resource, "bucket"), bucket.output("name"));
    collector.add_env_variable(resource, &env_name(resource, "endpoint"), bucket.output("endpoint"));
    collector.add_env_variable(
        resource,
        &env_name(resource, "account_id"),
        config.credentials.account_id.as_str(),
    );
    collector.add_output(resource, "name", bucket.output("name"));
    Ok(ProvisionOutput::single(bucket))
}
