//! MongoDB Atlas provider for simple-container
//!
//! Wraps the `atlas` CLI. A `mongodb-atlas` resource becomes a project, a
//! dedicated cluster and a database user; programmatic API keys of the
//! organization authenticate every call.

pub mod atlas;
pub mod error;
pub mod provider;
pub mod resources;

pub use atlas::Atlas;
pub use error::{MongodbError, Result};
pub use provider::MongodbProvider;

use sc_api::{Auth, PROVIDER_MONGODB, RESOURCE_MONGODB_ATLAS};
use sc_provisioner::engine::CloudProvider;
use sc_provisioner::{ProviderInput, ProvisionerError, RegistryBuilder};
use std::sync::Arc;

fn provider(input: &ProviderInput<'_>) -> sc_provisioner::Result<Arc<dyn CloudProvider>> {
    let Auth::Mongodb(credentials) = input.auth else {
        return Err(ProvisionerError::Config {
            expected: PROVIDER_MONGODB,
            type_name: input.auth.provider_type().to_string(),
        });
    };
    Ok(Arc::new(MongodbProvider::new(credentials, input.session_env)?))
}

pub fn register(builder: &mut RegistryBuilder) {
    builder
        .register_provider(PROVIDER_MONGODB, provider)
        .register_resource(RESOURCE_MONGODB_ATLAS, resources::mongodb_atlas);
}
