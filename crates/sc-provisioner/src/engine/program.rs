//! Programs and the context they register resources into
//!
//! A program never talks to a cloud. It declares providers, resources and
//! stack outputs; the engine diffs the declaration against recorded state and
//! applies the difference.

use super::output::{OutputRef, collect_refs};
use super::provider::CloudProvider;
use super::state::StateBackend;
use super::stack::read_stack_outputs;
use crate::error::{ProvisionerError, Result};
use crate::secrets::SecretsProvider;
use crate::stackref::StackReference;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

#[async_trait]
pub trait Program: Send + Sync {
    /// Program name, used in logs and recorded with the operation
    fn name(&self) -> &str;

    async fn run(&self, ctx: &ProgramContext) -> Result<()>;
}

/// Handle to a registered cloud provider
#[derive(Clone)]
pub struct ProviderRef {
    pub urn: String,
    pub handle: Arc<dyn CloudProvider>,
}

impl fmt::Debug for ProviderRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRef")
            .field("urn", &self.urn)
            .field("provider", &self.handle.name())
            .finish()
    }
}

/// Handle to a registered resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRef {
    pub urn: String,
    pub kind: String,
    pub name: String,
}

impl ResourceRef {
    /// Reference to one of the resource's outputs, resolved at apply time
    pub fn output(&self, key: &str) -> Value {
        OutputRef::new(&self.urn, key).to_value()
    }
}

/// Arguments of [`ProgramContext::register_resource`]
#[derive(Debug, Clone)]
pub struct ResourceArgs {
    pub kind: String,
    pub name: String,
    pub provider: ProviderRef,
    pub inputs: Value,
    pub depends_on: Vec<String>,
    /// Input properties whose change forces delete-and-recreate
    pub replace_on_changes: Vec<String>,
}

impl ResourceArgs {
    pub fn new(kind: impl Into<String>, name: impl Into<String>, provider: &ProviderRef) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
            provider: provider.clone(),
            inputs: Value::Object(Default::default()),
            depends_on: Vec::new(),
            replace_on_changes: Vec::new(),
        }
    }

    pub fn inputs(mut self, inputs: Value) -> Self {
        self.inputs = inputs;
        self
    }

    pub fn depends_on(mut self, resource: &ResourceRef) -> Self {
        self.depends_on.push(resource.urn.clone());
        self
    }

    pub fn replace_on_changes<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replace_on_changes
            .extend(properties.into_iter().map(Into::into));
        self
    }
}

/// A resource as declared by a program
#[derive(Debug, Clone)]
pub struct DesiredResource {
    pub urn: String,
    pub kind: String,
    pub name: String,
    pub provider: ProviderRef,
    pub inputs: Value,
    pub depends_on: Vec<String>,
    pub replace_on_changes: Vec<String>,
}

impl DesiredResource {
    /// Explicit dependencies plus resources referenced from the inputs
    pub fn dependencies(&self) -> Vec<String> {
        let mut deps = self.depends_on.clone();
        for reference in collect_refs(&self.inputs) {
            if !deps.contains(&reference.urn) {
                deps.push(reference.urn);
            }
        }
        deps
    }

    pub fn forces_replacement(&self, path: &str) -> bool {
        self.replace_on_changes.iter().any(|p| {
            path == p
                || path
                    .strip_prefix(p.as_str())
                    .is_some_and(|rest| rest.starts_with('.'))
        })
    }
}

/// A stack output declared by a program
#[derive(Debug, Clone)]
pub struct Export {
    pub value: Value,
    pub secret: bool,
}

/// Everything a program run declared
#[derive(Debug, Clone, Default)]
pub struct Registrations {
    pub providers: BTreeMap<String, ProviderRef>,
    pub resources: Vec<DesiredResource>,
    pub exports: BTreeMap<String, Export>,
}

impl Registrations {
    pub fn resource(&self, urn: &str) -> Option<&DesiredResource> {
        self.resources.iter().find(|r| r.urn == urn)
    }
}

/// Outputs of another stack, secrets decrypted
pub type StackOutputs = BTreeMap<String, Value>;

pub struct ProgramContext {
    stack: StackReference,
    backend: StateBackend,
    secrets: Arc<dyn SecretsProvider>,
    registrations: Mutex<Registrations>,
}

impl ProgramContext {
    pub fn new(
        stack: StackReference,
        backend: StateBackend,
        secrets: Arc<dyn SecretsProvider>,
    ) -> Self {
        Self {
            stack,
            backend,
            secrets,
            registrations: Mutex::new(Registrations::default()),
        }
    }

    pub fn stack(&self) -> &StackReference {
        &self.stack
    }

    pub fn urn(&self, kind: &str, name: &str) -> String {
        format!("urn:sc:{}::{}::{}", self.stack.stack, kind, name)
    }

    /// Registers a provider under `key`; a second registration with the same
    /// key returns the first handle.
    pub fn register_provider(&self, key: &str, handle: Arc<dyn CloudProvider>) -> ProviderRef {
        let urn = self.urn("provider", key);
        let mut registrations = self.registrations.lock();
        registrations
            .providers
            .entry(urn.clone())
            .or_insert(ProviderRef { urn, handle })
            .clone()
    }

    pub fn register_resource(&self, args: ResourceArgs) -> Result<ResourceRef> {
        let urn = self.urn(&args.kind, &args.name);
        let mut registrations = self.registrations.lock();
        if registrations.resource(&urn).is_some() {
            return Err(ProvisionerError::DuplicateResource(urn));
        }
        registrations
            .providers
            .entry(args.provider.urn.clone())
            .or_insert_with(|| args.provider.clone());

        tracing::debug!(urn = %urn, "Resource registered");
        registrations.resources.push(DesiredResource {
            urn: urn.clone(),
            kind: args.kind.clone(),
            name: args.name.clone(),
            provider: args.provider,
            inputs: args.inputs,
            depends_on: args.depends_on,
            replace_on_changes: args.replace_on_changes,
        });
        Ok(ResourceRef {
            urn,
            kind: args.kind,
            name: args.name,
        })
    }

    pub fn export(&self, name: impl Into<String>, value: Value) {
        self.registrations.lock().exports.insert(
            name.into(),
            Export {
                value,
                secret: false,
            },
        );
    }

    pub fn export_secret(&self, name: impl Into<String>, value: Value) {
        self.registrations
            .lock()
            .exports
            .insert(name.into(), Export { value, secret: true });
    }

    /// Reads the outputs of another stack in the same backend
    pub async fn stack_reference(&self, reference: &StackReference) -> Result<StackOutputs> {
        read_stack_outputs(&self.backend, self.secrets.as_ref(), reference).await
    }

    pub fn into_registrations(self) -> Registrations {
        self.registrations.into_inner()
    }
}
