//! Yandex Cloud provider for simple-container
//!
//! Wraps the `yc` CLI. Object storage buckets and serverless containers are
//! the only resource kinds; authentication uses an authorized key of a
//! service account, written to a private temp file for the CLI.

pub mod error;
pub mod provider;
pub mod resources;
pub mod yc;

pub use error::{Result, YandexError};
pub use provider::YandexProvider;
pub use yc::Yc;

use sc_api::{Auth, PROVIDER_YANDEX, RESOURCE_YC_BUCKET, TEMPLATE_YC_SERVERLESS_CONTAINER};
use sc_provisioner::engine::CloudProvider;
use sc_provisioner::{ProviderInput, ProvisionerError, RegistryBuilder};
use std::sync::Arc;

fn provider(input: &ProviderInput<'_>) -> sc_provisioner::Result<Arc<dyn CloudProvider>> {
    let Auth::Yandex(credentials) = input.auth else {
        return Err(ProvisionerError::Config {
            expected: PROVIDER_YANDEX,
            type_name: input.auth.provider_type().to_string(),
        });
    };
    Ok(Arc::new(YandexProvider::new(credentials, input.session_env)?))
}

pub fn register(builder: &mut RegistryBuilder) {
    builder
        .register_provider(PROVIDER_YANDEX, provider)
        .register_resource(RESOURCE_YC_BUCKET, resources::yc_bucket)
        .register_resource(
            TEMPLATE_YC_SERVERLESS_CONTAINER,
            resources::yc_serverless_container,
        );
}
