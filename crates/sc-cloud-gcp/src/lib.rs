//! Google Cloud provider for simple-container
//!
//! Implements the `CloudProvider` trait on top of the `gcloud` CLI and
//! registers the GCP resource types, the Cloud Run deploy template, the
//! `gcp-bucket` state storage and the `gcp-kms` secrets provider.
//!
//! # Requirements
//!
//! - `gcloud` CLI must be installed
//! - Credentials come from the stack descriptors (service account key JSON)
//!
//! # Example
//!
//! ```ignore
//! let mut builder = RegistryBuilder::new();
//! sc_cloud_gcp::register(&mut builder);
//! ```

pub mod error;
pub mod gcloud;
pub mod kms;
pub mod provider;
pub mod resources;
pub mod state;

pub use error::{GcpError, Result};
pub use gcloud::Gcloud;
pub use kms::GcpKmsSecretsProvider;
pub use provider::GcpProvider;
pub use state::GcsObjectStore;

use sc_api::{
    Auth, PROVIDER_GCP, RESOURCE_GCP_ARTIFACT_REGISTRY, RESOURCE_GCP_BUCKET,
    RESOURCE_GKE_AUTOPILOT, SECRETS_PROVIDER_GCP_KMS, STATE_STORAGE_GCP_BUCKET,
    TEMPLATE_CLOUDRUN,
};
use sc_provisioner::engine::CloudProvider;
use sc_provisioner::{ProviderInput, ProvisionerError, RegistryBuilder};
use std::sync::Arc;

fn provider(input: &ProviderInput<'_>) -> sc_provisioner::Result<Arc<dyn CloudProvider>> {
    let Auth::Gcp(credentials) = input.auth else {
        return Err(ProvisionerError::Config {
            expected: PROVIDER_GCP,
            type_name: input.auth.provider_type().to_string(),
        });
    };
    Ok(Arc::new(GcpProvider::new(credentials, input.session_env)?))
}

/// Registers everything this package contributes
pub fn register(builder: &mut RegistryBuilder) {
    builder
        .register_provider(PROVIDER_GCP, provider)
        .register_resource(RESOURCE_GCP_BUCKET, resources::bucket)
        .register_resource(RESOURCE_GKE_AUTOPILOT, resources::gke_autopilot)
        .register_resource(RESOURCE_GCP_ARTIFACT_REGISTRY, resources::artifact_registry)
        .register_resource(TEMPLATE_CLOUDRUN, resources::cloudrun)
        .register_state_store(STATE_STORAGE_GCP_BUCKET, state::state_store)
        .register_state_store_initializer(PROVIDER_GCP, state::initialize_session)
        .register_secrets_provider(SECRETS_PROVIDER_GCP_KMS, kms::secrets_provider)
        .register_secrets_provisioner(SECRETS_PROVIDER_GCP_KMS, resources::kms_key);
}
