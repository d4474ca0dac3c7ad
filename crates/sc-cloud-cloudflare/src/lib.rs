//! Cloudflare provider for simple-container
//!
//! DNS records and host header override rules go through the Cloudflare
//! HTTP API; R2 buckets through `wrangler`. The `cloudflare` registrar hands
//! DNS resources to every provisioning function that needs a domain.

pub mod api;
pub mod error;
pub mod provider;
pub mod registrar;
pub mod resources;
pub mod wrangler;

pub use api::CloudflareApi;
pub use error::{CloudflareError, Result};
pub use provider::CloudflareProvider;
pub use registrar::CloudflareRegistrar;
pub use wrangler::Wrangler;

use sc_api::{Auth, PROVIDER_CLOUDFLARE, REGISTRAR_CLOUDFLARE, RESOURCE_R2_BUCKET};
use sc_provisioner::engine::CloudProvider;
use sc_provisioner::{ProviderInput, ProvisionerError, RegistryBuilder};
use std::sync::Arc;

fn provider(input: &ProviderInput<'_>) -> sc_provisioner::Result<Arc<dyn CloudProvider>> {
    let Auth::Cloudflare(credentials) = input.auth else {
        return Err(ProvisionerError::Config {
            expected: PROVIDER_CLOUDFLARE,
            type_name: input.auth.provider_type().to_string(),
        });
    };
    Ok(Arc::new(CloudflareProvider::new(credentials, input.session_env)?))
}

/// Registers everything this package contributes
pub fn register(builder: &mut RegistryBuilder) {
    builder
        .register_provider(PROVIDER_CLOUDFLARE, provider)
        .register_resource(RESOURCE_R2_BUCKET, resources::r2_bucket)
        .register_registrar(REGISTRAR_CLOUDFLARE, registrar::registrar);
}
