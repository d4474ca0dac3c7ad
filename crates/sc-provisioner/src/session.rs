//! Backend login and the per-operation session

use crate::engine::{
    EngineStack, EventSender, OperationOptions, ResourceRef, StackState, StateBackend,
};
use crate::error::{ProvisionerError, Result};
use crate::program::SecretsProviderProgram;
use crate::registry::Registry;
use crate::secrets::{SecretsProvider, SecretsProviderOutput};
use crate::stackref::StackReference;
use sc_api::{Auth, ProvisionerConfig, Stack};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

pub const ENV_GOOGLE_CREDENTIALS: &str = "GOOGLE_CREDENTIALS";
pub const ENV_GOOGLE_PROJECT: &str = "GOOGLE_PROJECT";
pub const ENV_AWS_ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const ENV_AWS_SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const ENV_AWS_REGION: &str = "AWS_REGION";
pub const ENV_ACCESS_TOKEN: &str = "PULUMI_ACCESS_TOKEN";
pub const ENV_CONFIG_PASSPHRASE: &str = "PULUMI_CONFIG_PASSPHRASE";

/// Environment of one session.
///
/// Handed to CLI wrappers explicitly and never written to the process
/// environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    vars: BTreeMap<String, String>,
}

impl SessionEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Adds the session variables to a command's environment
    pub fn apply(&self, command: &mut tokio::process::Command) {
        command.envs(self.iter());
    }
}

impl fmt::Debug for SessionEnv {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.vars.keys()).finish()
    }
}

/// Sets the credential variables of `auth`
fn credential_env(auth: &Auth, env: &mut SessionEnv) {
    match auth {
        Auth::Gcp(c) => {
            env.set(ENV_GOOGLE_CREDENTIALS, c.credentials.as_str());
            env.set(ENV_GOOGLE_PROJECT, c.project_id.as_str());
        }
        Auth::Aws(c) => {
            env.set(ENV_AWS_ACCESS_KEY_ID, c.access_key.as_str());
            env.set(ENV_AWS_SECRET_ACCESS_KEY, c.secret_access_key.as_str());
            env.set(ENV_AWS_REGION, c.region.as_str());
        }
        _ => {}
    }
}

/// Logs into the backend selected by the stack's state storage.
///
/// `project` names the project the stack lives in and is the default
/// passphrase; `stack_name` is the stack inside it.
pub fn login(
    registry: Arc<Registry>,
    stack: &Stack,
    project: &str,
    stack_name: &str,
) -> Result<Session> {
    let config = stack
        .provisioner_config()
        .ok_or_else(|| ProvisionerError::Config {
            expected: sc_api::PROVISIONER_PULUMI,
            type_name: stack.server.provisioner.type_name().to_string(),
        })?
        .clone();
    let storage = &config.state_storage;
    let open_store = registry.state_store(storage.type_name())?;

    if storage.credentials().is_some_and(|c| c.is_empty()) {
        return Err(ProvisionerError::MissingCredentials(format!(
            "state storage {}",
            storage.type_name()
        )));
    }

    let mut env = SessionEnv::new();
    if let sc_api::StateStorageConfig::PulumiCloud(hosted) = storage {
        env.set(ENV_ACCESS_TOKEN, hosted.access_token.as_str());
    }
    let passphrase = std::env::var(ENV_CONFIG_PASSPHRASE).unwrap_or_else(|_| project.to_string());
    env.set(ENV_CONFIG_PASSPHRASE, passphrase);

    if let Some(auth) = storage.auth() {
        credential_env(&auth, &mut env);
        if let Some(initialize) = registry.state_store_initializer(auth.provider_type()) {
            debug!(provider = auth.provider_type(), "Running state store initializer");
            initialize(&auth, &mut env)?;
        }
    }

    let store = open_store(storage, &env)?;
    let backend = StateBackend::new(store);
    let secrets = (registry.secrets_provider(config.secrets_provider.type_name())?)(
        &config.secrets_provider,
        &env,
    )?;

    let reference = StackReference::new(&config.organization, project, stack_name);
    reference.validate()?;

    info!(
        stack = %reference,
        backend = %backend.url(),
        secrets = %secrets.url(),
        "Logged in"
    );

    Ok(Session {
        registry,
        config,
        reference,
        backend,
        secrets,
        env,
        initial: OnceCell::new(),
    })
}

/// Authenticated session for one operation on one stack
pub struct Session {
    registry: Arc<Registry>,
    config: ProvisionerConfig,
    reference: StackReference,
    backend: StateBackend,
    secrets: Arc<dyn SecretsProvider>,
    env: SessionEnv,
    initial: OnceCell<Option<SecretsProviderOutput>>,
}

impl Session {
    pub fn reference(&self) -> &StackReference {
        &self.reference
    }

    pub fn backend(&self) -> &StateBackend {
        &self.backend
    }

    pub fn secrets(&self) -> &Arc<dyn SecretsProvider> {
        &self.secrets
    }

    pub fn env(&self) -> &SessionEnv {
        &self.env
    }

    pub fn config(&self) -> &ProvisionerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    fn remote(&self, operation: &'static str) -> impl FnOnce(ProvisionerError) -> ProvisionerError {
        let stack = self.reference.to_string();
        move |e| ProvisionerError::remote(operation, stack, e)
    }

    /// Returns the stack record, creating it when absent
    pub async fn select_stack(&self) -> Result<StackState> {
        let existing = self
            .backend
            .get_stack(&self.reference)
            .await
            .map_err(self.remote("select stack"))?;
        if let Some(state) = existing {
            info!(stack = %self.reference, "Stack found, not creating");
            return Ok(state);
        }
        let state = self
            .backend
            .create_stack(&self.reference, &self.secrets.url())
            .await
            .map_err(self.remote("create stack"))?;
        info!(stack = %self.reference, "Stack created");
        Ok(state)
    }

    /// Returns the stack record; fails when it does not exist
    pub async fn require_stack(&self) -> Result<StackState> {
        self.backend
            .require_stack(&self.reference)
            .await
            .map_err(self.remote("select stack"))
    }

    pub async fn remove_stack(&self) -> Result<()> {
        self.backend
            .remove_stack(&self.reference)
            .await
            .map_err(self.remote("remove stack"))
    }

    pub fn engine_stack(&self) -> EngineStack {
        EngineStack::new(
            self.reference.clone(),
            self.backend.clone(),
            self.secrets.clone(),
        )
        .with_policies(self.registry.policies().to_vec())
    }

    /// Creates the resource behind the secrets provider, once per session.
    ///
    /// Skipped when the secrets provider does not ask for provisioning.
    pub async fn initial_provision(
        &self,
        events: Option<EventSender>,
    ) -> Result<Option<SecretsProviderOutput>> {
        self.initial
            .get_or_try_init(|| self.provision_secrets_provider(events))
            .await
            .cloned()
    }

    async fn provision_secrets_provider(
        &self,
        events: Option<EventSender>,
    ) -> Result<Option<SecretsProviderOutput>> {
        let secrets_provider = &self.config.secrets_provider;
        if !secrets_provider.is_provision_enabled() {
            info!(
                provider = secrets_provider.type_name(),
                "Secrets provider provisioning disabled, skipping"
            );
            return Ok(None);
        }

        let program = SecretsProviderProgram::new(
            self.registry.clone(),
            self.config.clone(),
            &self.reference.project,
            self.env.clone(),
        );
        let engine = self.engine_stack();
        let registrations = engine
            .run_program(&program)
            .await
            .map_err(self.remote("provision secrets provider"))?;
        let Some(resource) = registrations.resources.first() else {
            return Ok(None);
        };

        let mut options = OperationOptions::default().with_targets(
            registrations
                .resources
                .iter()
                .map(|r| r.urn.clone())
                .collect(),
        );
        if let Some(events) = events {
            options = options.with_events(events);
        }
        let summary = engine
            .up(&program, &options)
            .await
            .map_err(self.remote("provision secrets provider"))?;
        info!(
            stack = %self.reference,
            provider = secrets_provider.type_name(),
            summary = %summary,
            "Secrets provider provisioned"
        );

        Ok(Some(SecretsProviderOutput {
            provider: self.secrets.clone(),
            resource: ResourceRef {
                urn: resource.urn.clone(),
                kind: resource.kind.clone(),
                name: resource.name.clone(),
            },
        }))
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("reference", &self.reference)
            .field("backend", &self.backend.url())
            .field("secrets", &self.secrets.url())
            .field("env", &self.env)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RegistryBuilder;
    use sc_api::{
        FsStateStorage, GcpBucketStateStorage, GcpCredentials, PassphraseSecretsProvider,
        ProvisionerDescriptor, SecretsProviderConfig, StateStorageConfig,
    };
    use tempfile::tempdir;

    fn stack_with(storage: StateStorageConfig) -> Stack {
        let mut stack = Stack::new("infra");
        stack.server.provisioner = ProvisionerDescriptor::Pulumi(ProvisionerConfig {
            organization: "acme".to_string(),
            state_storage: storage,
            secrets_provider: SecretsProviderConfig::Passphrase(PassphraseSecretsProvider::default()),
        });
        stack
    }

    fn fs_stack(path: &std::path::Path) -> Stack {
        stack_with(StateStorageConfig::Fs(FsStateStorage {
            path: path.display().to_string(),
        }))
    }

    #[test]
    fn test_login_requires_provisioner_config() {
        let registry = Arc::new(RegistryBuilder::new().build());
        let err = login(registry, &Stack::new("infra"), "infra", "infra").unwrap_err();
        assert!(matches!(err, ProvisionerError::Config { .. }));
    }

    #[test]
    fn test_login_rejects_empty_credentials() {
        let registry = Arc::new(RegistryBuilder::new().build());
        let stack = stack_with(StateStorageConfig::GcpBucket(GcpBucketStateStorage {
            credentials: GcpCredentials {
                project_id: "acme".to_string(),
                credentials: String::new(),
            },
            bucket_name: "acme-state".to_string(),
            ..Default::default()
        }));
        let err = login(registry, &stack, "infra", "infra").unwrap_err();
        assert!(matches!(err, ProvisionerError::MissingCredentials(_)));
    }

    #[test]
    fn test_login_runs_state_store_initializer() {
        let mut builder = RegistryBuilder::new();
        builder.register_state_store_initializer("gcp", |_, env| {
            env.set("CLOUDSDK_CORE_PROJECT", "acme");
            Ok(())
        });
        builder.register_state_store("gcp-bucket", |_, env| {
            assert_eq!(env.get("CLOUDSDK_CORE_PROJECT"), Some("acme"));
            assert_eq!(env.get(ENV_GOOGLE_CREDENTIALS), Some("{}"));
            Ok(Arc::new(crate::engine::LocalObjectStore::new("/nonexistent")))
        });
        let stack = stack_with(StateStorageConfig::GcpBucket(GcpBucketStateStorage {
            credentials: GcpCredentials {
                project_id: "acme".to_string(),
                credentials: "{}".to_string(),
            },
            bucket_name: "acme-state".to_string(),
            ..Default::default()
        }));
        let session = login(Arc::new(builder.build()), &stack, "infra", "infra").unwrap();
        assert_eq!(session.reference().to_string(), "acme/infra/infra");
    }

    #[tokio::test]
    async fn test_select_stack_creates_once() {
        let temp_dir = tempdir().unwrap();
        let registry = Arc::new(RegistryBuilder::new().build());
        let stack = fs_stack(temp_dir.path());

        temp_env::async_with_vars([(ENV_CONFIG_PASSPHRASE, None::<&str>)], async {
            let session = login(registry.clone(), &stack, "infra", "infra").unwrap();
            assert_eq!(session.env().get(ENV_CONFIG_PASSPHRASE), Some("infra"));

            let first = session.select_stack().await.unwrap();
            let second = session.select_stack().await.unwrap();
            assert_eq!(first.created_at, second.created_at);
            assert!(matches!(
                session
                    .backend()
                    .create_stack(session.reference(), "passphrase")
                    .await,
                Err(ProvisionerError::StackAlreadyExists(_))
            ));

            let disabled = session.initial_provision(None).await.unwrap();
            assert!(disabled.is_none());
        })
        .await;
    }

    #[tokio::test]
    async fn test_require_stack_wraps_not_found() {
        let temp_dir = tempdir().unwrap();
        let registry = Arc::new(RegistryBuilder::new().build());
        let session = login(registry, &fs_stack(temp_dir.path()), "infra", "infra").unwrap();
        let err = session.require_stack().await.unwrap_err();
        assert!(err.is_stack_not_found());
        assert!(err.to_string().starts_with("select stack failed for stack acme/infra/infra"));
    }

    #[test]
    fn test_session_env_debug_hides_values() {
        let mut env = SessionEnv::new();
        env.set(ENV_ACCESS_TOKEN, "secret-token");
        let rendered = format!("{:?}", env);
        assert!(rendered.contains(ENV_ACCESS_TOKEN));
        assert!(!rendered.contains("secret-token"));
    }
}
