//! simple-container configuration API
//!
//! Typed model of the stack descriptors consumed by the provisioner:
//!
//! - `server.yaml`: provisioner (state storage, secrets provider), templates,
//!   per-environment resources, registrar
//! - `client.yaml`: per-environment deployment of an application stack into a
//!   parent stack
//! - `secrets.yaml`: values referenced by `${secret:name}` placeholders
//!
//! # Example
//!
//! ```ignore
//! use sc_api::read_stack;
//!
//! let stack = read_stack(Path::new("."), "infra")?;
//! let provisioner = stack.provisioner_config().expect("pulumi provisioner");
//! println!("state: {}", provisioner.state_storage.storage_url());
//! ```

pub mod cryptor;
pub mod error;
pub mod loader;
pub mod model;
pub mod placeholder;

pub use cryptor::Cryptor;
pub use error::{ApiError, Result};
pub use loader::{read_stack, read_stacks, stacks_dir};
pub use model::*;
