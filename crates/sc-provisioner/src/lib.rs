//! simple-container provisioning engine
//!
//! Materializes the stacks described by `sc-api` descriptors:
//!
//! - [`registry`]: resource types, providers, state stores, secrets
//!   providers and registrars contributed by the `sc-cloud-*` packages
//! - [`session`]: login to the backend selected by a stack's state storage
//! - [`program`]: parent provisioning and child deployment programs
//! - [`engine`]: plan/apply over a persisted stack state
//! - [`provisioner`]: the lifecycle facade used by the CLI
//!
//! # Example
//!
//! ```ignore
//! let mut builder = RegistryBuilder::new();
//! sc_cloud_gcp::register(&mut builder);
//! let provisioner = Provisioner::new(Arc::new(builder.build()));
//! let result = provisioner.provision_stack(&stack, &ProvisionParams::default()).await?;
//! println!("{}", result.summary);
//! ```

pub mod collector;
pub mod engine;
pub mod error;
pub mod events;
pub mod program;
pub mod provisioner;
pub mod registrar;
pub mod registry;
pub mod secrets;
pub mod session;
pub mod stackref;

pub use collector::{ComputeContextCollector, ResourceContext, env_name};
pub use error::{ProvisionerError, Result};
pub use events::{Action, EventWatcher};
pub use program::{DeployProgram, ProviderCache, ProvisionProgram, SecretsProviderProgram};
pub use provisioner::Provisioner;
pub use registrar::{NotConfigured, OverrideHeaderRule, Registrar};
pub use registry::{ProviderInput, ProvisionInput, ProvisionOutput, Registry, RegistryBuilder};
pub use secrets::{PassphraseSecretsProvider, SecretsProvider, SecretsProviderOutput};
pub use session::{Session, SessionEnv, login};
pub use stackref::{
    StackReference, child_stack_name, collapse_stack_reference, expand_stack_reference,
    stack_name_in_env,
};
