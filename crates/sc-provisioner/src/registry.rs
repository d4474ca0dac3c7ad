//! Type-dispatched registry of provisioning functions
//!
//! Provider packages add their functions through [`RegistryBuilder`] once at
//! startup; the composition root then freezes the builder into a [`Registry`]
//! that is shared read-only by every operation.

use crate::collector::ComputeContextCollector;
use crate::engine::{
    CloudProvider, HttpObjectStore, LocalObjectStore, ObjectStore, Policy, ProgramContext,
    ProviderRef, ResourceRef,
};
use crate::error::{ProvisionerError, Result};
use crate::registrar::Registrar;
use crate::secrets::{PassphraseSecretsProvider, SecretsProvider};
use crate::session::{ENV_ACCESS_TOKEN, ENV_CONFIG_PASSPHRASE, SessionEnv};
use sc_api::{
    Auth, ClientConfig, RegistrarConfig, ResourceDescriptor, SECRETS_PROVIDER_PASSPHRASE,
    STATE_STORAGE_FS, STATE_STORAGE_PULUMI_CLOUD, SecretsProviderConfig, StateStorageConfig,
};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Everything a resource provisioning function gets to work with
pub struct ProvisionInput<'a> {
    pub ctx: &'a ProgramContext,
    pub stack_name: &'a str,
    pub environment: &'a str,
    pub resource_name: &'a str,
    pub descriptor: &'a ResourceDescriptor,
    /// Provider resolved for the descriptor's auth; `None` for types without one
    pub provider: Option<ProviderRef>,
    pub collector: &'a ComputeContextCollector,
    /// `SIMPLE_CONTAINER_*` variables every workload gets
    pub base_env: &'a BTreeMap<String, String>,
    pub helpers_image: &'a str,
    pub registrar: &'a dyn Registrar,
    pub session_env: &'a SessionEnv,
}

impl ProvisionInput<'_> {
    pub fn require_provider(&self) -> Result<&ProviderRef> {
        self.provider.as_ref().ok_or_else(|| {
            ProvisionerError::Precondition(format!(
                "resource {} of type {} has no cloud credentials",
                self.resource_name, self.descriptor.type_
            ))
        })
    }

    /// Environment of a deployed workload: the base variables, the client's
    /// own variables and secrets, then the context of every used resource
    pub fn workload_env(&self, client: &ClientConfig) -> Map<String, Value> {
        let mut env = Map::new();
        for (name, value) in self.base_env {
            env.insert(name.clone(), Value::String(value.clone()));
        }
        for (name, value) in client.env.iter().chain(client.secrets.iter()) {
            env.insert(name.clone(), Value::String(value.clone()));
        }
        env.extend(self.collector.env_variables());
        env.extend(self.collector.secret_env_variables());
        env
    }
}

#[derive(Debug, Clone, Default)]
pub struct ProvisionOutput {
    pub resources: Vec<ResourceRef>,
}

impl ProvisionOutput {
    pub fn single(resource: ResourceRef) -> Self {
        Self {
            resources: vec![resource],
        }
    }
}

/// Arguments of a provider-construction function
pub struct ProviderInput<'a> {
    pub auth: &'a Auth,
    pub stack_name: &'a str,
    pub environment: &'a str,
    pub resource_name: &'a str,
    pub session_env: &'a SessionEnv,
}

pub type ResourceFn = Arc<dyn Fn(&ProvisionInput<'_>) -> Result<ProvisionOutput> + Send + Sync>;
pub type ProviderFn =
    Arc<dyn Fn(&ProviderInput<'_>) -> Result<Arc<dyn CloudProvider>> + Send + Sync>;
pub type StateStoreFn =
    Arc<dyn Fn(&StateStorageConfig, &SessionEnv) -> Result<Arc<dyn ObjectStore>> + Send + Sync>;
pub type StateStoreInitFn = Arc<dyn Fn(&Auth, &mut SessionEnv) -> Result<()> + Send + Sync>;
pub type SecretsProviderFn = Arc<
    dyn Fn(&SecretsProviderConfig, &SessionEnv) -> Result<Arc<dyn SecretsProvider>> + Send + Sync,
>;
pub type SecretsProvisionFn = Arc<
    dyn Fn(&ProgramContext, &SecretsProviderConfig, &ProviderRef) -> Result<ResourceRef>
        + Send
        + Sync,
>;
pub type RegistrarFn =
    Arc<dyn Fn(&RegistrarConfig, &SessionEnv) -> Result<Arc<dyn Registrar>> + Send + Sync>;

/// Mutable registry used during startup
pub struct RegistryBuilder {
    resources: HashMap<String, ResourceFn>,
    providers: HashMap<String, ProviderFn>,
    state_stores: HashMap<String, StateStoreFn>,
    state_store_initializers: HashMap<String, StateStoreInitFn>,
    secrets_providers: HashMap<String, SecretsProviderFn>,
    secrets_provisioners: HashMap<String, SecretsProvisionFn>,
    registrars: HashMap<String, RegistrarFn>,
    policies: Vec<Arc<dyn Policy>>,
}

impl Default for RegistryBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RegistryBuilder {
    /// Builder with the built-in filesystem and hosted state stores and the
    /// passphrase secrets provider
    pub fn new() -> Self {
        let mut builder = Self::empty();
        builder
            .register_state_store(STATE_STORAGE_FS, fs_state_store)
            .register_state_store(STATE_STORAGE_PULUMI_CLOUD, hosted_state_store)
            .register_secrets_provider(SECRETS_PROVIDER_PASSPHRASE, passphrase_secrets_provider);
        builder
    }

    /// Builder without any built-in
    pub fn empty() -> Self {
        Self {
            resources: HashMap::new(),
            providers: HashMap::new(),
            state_stores: HashMap::new(),
            state_store_initializers: HashMap::new(),
            secrets_providers: HashMap::new(),
            secrets_provisioners: HashMap::new(),
            registrars: HashMap::new(),
            policies: Vec::new(),
        }
    }

    pub fn register_resource<F>(&mut self, type_name: &str, f: F) -> &mut Self
    where
        F: Fn(&ProvisionInput<'_>) -> Result<ProvisionOutput> + Send + Sync + 'static,
    {
        self.trace_registration("resource", type_name);
        self.resources.insert(type_name.to_string(), Arc::new(f));
        self
    }

    pub fn register_provider<F>(&mut self, provider_type: &str, f: F) -> &mut Self
    where
        F: Fn(&ProviderInput<'_>) -> Result<Arc<dyn CloudProvider>> + Send + Sync + 'static,
    {
        self.trace_registration("provider", provider_type);
        self.providers.insert(provider_type.to_string(), Arc::new(f));
        self
    }

    pub fn register_state_store<F>(&mut self, storage_type: &str, f: F) -> &mut Self
    where
        F: Fn(&StateStorageConfig, &SessionEnv) -> Result<Arc<dyn ObjectStore>>
            + Send
            + Sync
            + 'static,
    {
        self.trace_registration("state storage", storage_type);
        self.state_stores.insert(storage_type.to_string(), Arc::new(f));
        self
    }

    /// One-time session setup run before any backend call, keyed by the
    /// state storage's auth provider type
    pub fn register_state_store_initializer<F>(&mut self, provider_type: &str, f: F) -> &mut Self
    where
        F: Fn(&Auth, &mut SessionEnv) -> Result<()> + Send + Sync + 'static,
    {
        self.trace_registration("state store initializer", provider_type);
        self.state_store_initializers
            .insert(provider_type.to_string(), Arc::new(f));
        self
    }

    pub fn register_secrets_provider<F>(&mut self, provider_type: &str, f: F) -> &mut Self
    where
        F: Fn(&SecretsProviderConfig, &SessionEnv) -> Result<Arc<dyn SecretsProvider>>
            + Send
            + Sync
            + 'static,
    {
        self.trace_registration("secrets provider", provider_type);
        self.secrets_providers
            .insert(provider_type.to_string(), Arc::new(f));
        self
    }

    /// Registers the function creating the cloud resource behind a secrets
    /// provider (e.g. a KMS key)
    pub fn register_secrets_provisioner<F>(&mut self, provider_type: &str, f: F) -> &mut Self
    where
        F: Fn(&ProgramContext, &SecretsProviderConfig, &ProviderRef) -> Result<ResourceRef>
            + Send
            + Sync
            + 'static,
    {
        self.trace_registration("secrets provisioner", provider_type);
        self.secrets_provisioners
            .insert(provider_type.to_string(), Arc::new(f));
        self
    }

    pub fn register_registrar<F>(&mut self, registrar_type: &str, f: F) -> &mut Self
    where
        F: Fn(&RegistrarConfig, &SessionEnv) -> Result<Arc<dyn Registrar>> + Send + Sync + 'static,
    {
        self.trace_registration("registrar", registrar_type);
        self.registrars.insert(registrar_type.to_string(), Arc::new(f));
        self
    }

    pub fn register_policy(&mut self, policy: Arc<dyn Policy>) -> &mut Self {
        self.policies.push(policy);
        self
    }

    fn trace_registration(&self, kind: &str, type_name: &str) {
        tracing::trace!(kind, type_name, "Registering");
    }

    pub fn build(self) -> Registry {
        Registry {
            resources: self.resources,
            providers: self.providers,
            state_stores: self.state_stores,
            state_store_initializers: self.state_store_initializers,
            secrets_providers: self.secrets_providers,
            secrets_provisioners: self.secrets_provisioners,
            registrars: self.registrars,
            policies: self.policies,
        }
    }
}

/// Frozen registry
pub struct Registry {
    resources: HashMap<String, ResourceFn>,
    providers: HashMap<String, ProviderFn>,
    state_stores: HashMap<String, StateStoreFn>,
    state_store_initializers: HashMap<String, StateStoreInitFn>,
    secrets_providers: HashMap<String, SecretsProviderFn>,
    secrets_provisioners: HashMap<String, SecretsProvisionFn>,
    registrars: HashMap<String, RegistrarFn>,
    policies: Vec<Arc<dyn Policy>>,
}

fn lookup<'a, T>(map: &'a HashMap<String, T>, kind: &'static str, type_name: &str) -> Result<&'a T> {
    map.get(type_name)
        .ok_or_else(|| ProvisionerError::UnknownType {
            kind,
            type_name: type_name.to_string(),
        })
}

impl Registry {
    pub fn resource(&self, type_name: &str) -> Result<&ResourceFn> {
        lookup(&self.resources, "resource", type_name)
    }

    pub fn provider(&self, provider_type: &str) -> Result<&ProviderFn> {
        lookup(&self.providers, "provider", provider_type)
    }

    pub fn state_store(&self, storage_type: &str) -> Result<&StateStoreFn> {
        lookup(&self.state_stores, "state storage", storage_type)
    }

    pub fn state_store_initializer(&self, provider_type: &str) -> Option<&StateStoreInitFn> {
        self.state_store_initializers.get(provider_type)
    }

    pub fn secrets_provider(&self, provider_type: &str) -> Result<&SecretsProviderFn> {
        lookup(&self.secrets_providers, "secrets provider", provider_type)
    }

    pub fn secrets_provisioner(&self, provider_type: &str) -> Result<&SecretsProvisionFn> {
        lookup(&self.secrets_provisioners, "secrets provisioner", provider_type)
    }

    pub fn registrar(&self, registrar_type: &str) -> Result<&RegistrarFn> {
        lookup(&self.registrars, "registrar", registrar_type)
    }

    pub fn policies(&self) -> &[Arc<dyn Policy>] {
        &self.policies
    }

    /// Registered resource types, sorted
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }
}

fn fs_state_store(config: &StateStorageConfig, _: &SessionEnv) -> Result<Arc<dyn ObjectStore>> {
    let StateStorageConfig::Fs(fs) = config else {
        return Err(ProvisionerError::Config {
            expected: STATE_STORAGE_FS,
            type_name: config.type_name().to_string(),
        });
    };
    Ok(Arc::new(LocalObjectStore::from_url(&fs.path)))
}

fn hosted_state_store(
    config: &StateStorageConfig,
    env: &SessionEnv,
) -> Result<Arc<dyn ObjectStore>> {
    let StateStorageConfig::PulumiCloud(hosted) = config else {
        return Err(ProvisionerError::Config {
            expected: STATE_STORAGE_PULUMI_CLOUD,
            type_name: config.type_name().to_string(),
        });
    };
    let token = env
        .get(ENV_ACCESS_TOKEN)
        .unwrap_or(hosted.access_token.as_str());
    if token.is_empty() {
        return Err(ProvisionerError::MissingCredentials(
            "hosted state storage".to_string(),
        ));
    }
    Ok(Arc::new(HttpObjectStore::new(&hosted.url, token)))
}

fn passphrase_secrets_provider(
    config: &SecretsProviderConfig,
    env: &SessionEnv,
) -> Result<Arc<dyn SecretsProvider>> {
    let SecretsProviderConfig::Passphrase(p) = config else {
        return Err(ProvisionerError::Config {
            expected: SECRETS_PROVIDER_PASSPHRASE,
            type_name: config.type_name().to_string(),
        });
    };
    let passphrase = if p.passphrase.is_empty() {
        env.get(ENV_CONFIG_PASSPHRASE).unwrap_or_default()
    } else {
        p.passphrase.as_str()
    };
    Ok(Arc::new(PassphraseSecretsProvider::new(passphrase)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_api::{FsStateStorage, PassphraseSecretsProvider as PassphraseConfig};

    #[test]
    fn test_unknown_types_name_the_type() {
        let registry = RegistryBuilder::new().build();
        match registry.resource("quantum-bucket") {
            Err(ProvisionerError::UnknownType { kind, type_name }) => {
                assert_eq!(kind, "resource");
                assert_eq!(type_name, "quantum-bucket");
            }
            _ => panic!("expected unknown resource type"),
        }
        assert!(registry.registrar("route53").is_err());
        assert!(registry.state_store_initializer("gcp").is_none());
    }

    #[test]
    fn test_builtins() {
        let registry = RegistryBuilder::new().build();
        let env = SessionEnv::new();

        let fs = StateStorageConfig::Fs(FsStateStorage {
            path: "/tmp/state".to_string(),
        });
        let store = (registry.state_store("fs").unwrap())(&fs, &env).unwrap();
        assert_eq!(store.url(), "file:///tmp/state");

        let mut env = SessionEnv::new();
        env.set(ENV_CONFIG_PASSPHRASE, "acme");
        let config = SecretsProviderConfig::Passphrase(PassphraseConfig::default());
        let secrets = (registry.secrets_provider("passphrase").unwrap())(&config, &env).unwrap();
        assert_eq!(secrets.url(), "passphrase");

        let wrong = (registry.state_store("fs").unwrap())(
            &StateStorageConfig::Unknown {
                type_: "etcd".to_string(),
                config: serde_json::Value::Null,
            },
            &env,
        );
        assert!(matches!(wrong, Err(ProvisionerError::Config { .. })));
    }

    #[test]
    fn test_registered_resource_types_are_sorted() {
        let mut builder = RegistryBuilder::empty();
        builder
            .register_resource("s3-bucket", |_| Ok(ProvisionOutput::default()))
            .register_resource("gcp-bucket", |_| Ok(ProvisionOutput::default()));
        let registry = builder.build();
        assert_eq!(registry.resource_types(), vec!["gcp-bucket", "s3-bucket"]);
        assert!(registry.state_store("fs").is_err());
    }
}
