//! AWS provider for simple-container
//!
//! Implements the `CloudProvider` trait on top of the `aws` CLI and registers
//! S3 buckets, the ECS Fargate and Lambda deploy templates, the `s3-bucket`
//! state storage and the `aws-kms` secrets provider.
//!
//! # Requirements
//!
//! - `aws` CLI v2 must be installed
//! - Access keys and region come from the stack descriptors

pub mod aws;
pub mod error;
pub mod kms;
pub mod provider;
pub mod resources;
pub mod state;

pub use aws::Aws;
pub use error::{AwsError, Result};
pub use kms::AwsKmsSecretsProvider;
pub use provider::AwsProvider;
pub use state::S3ObjectStore;

use sc_api::{
    Auth, PROVIDER_AWS, RESOURCE_S3_BUCKET, SECRETS_PROVIDER_AWS_KMS, STATE_STORAGE_S3_BUCKET,
    TEMPLATE_AWS_LAMBDA, TEMPLATE_ECS_FARGATE,
};
use sc_provisioner::engine::CloudProvider;
use sc_provisioner::{ProviderInput, ProvisionerError, RegistryBuilder};
use std::sync::Arc;

fn provider(input: &ProviderInput<'_>) -> sc_provisioner::Result<Arc<dyn CloudProvider>> {
    let Auth::Aws(credentials) = input.auth else {
        return Err(ProvisionerError::Config {
            expected: PROVIDER_AWS,
            type_name: input.auth.provider_type().to_string(),
        });
    };
    Ok(Arc::new(AwsProvider::new(credentials, input.session_env)?))
}

/// Registers everything this package contributes
pub fn register(builder: &mut RegistryBuilder) {
    builder
        .register_provider(PROVIDER_AWS, provider)
        .register_resource(RESOURCE_S3_BUCKET, resources::s3_bucket)
        .register_resource(TEMPLATE_ECS_FARGATE, resources::ecs_fargate)
        .register_resource(TEMPLATE_AWS_LAMBDA, resources::aws_lambda)
        .register_state_store(STATE_STORAGE_S3_BUCKET, state::state_store)
        .register_secrets_provider(SECRETS_PROVIDER_AWS_KMS, kms::secrets_provider)
        .register_secrets_provisioner(SECRETS_PROVIDER_AWS_KMS, resources::kms_key);
}
