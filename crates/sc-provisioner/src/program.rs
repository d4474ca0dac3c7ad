//! Provisioning programs built from stack descriptors
//!
//! - [`ProvisionProgram`]: every resource of a parent stack plus its
//!   exported templates and resource contexts
//! - [`DeployProgram`]: one child stack deployed with a parent's template
//! - [`SecretsProviderProgram`]: only the resource behind the secrets provider

use crate::collector::{ComputeContextCollector, ResourceContext};
use crate::engine::{CloudProvider, Program, ProgramContext, ProviderRef, ResourceRef};
use crate::error::{ProvisionerError, Result};
use crate::registrar::{NotConfigured, Registrar};
use crate::registry::{ProviderInput, ProvisionInput, ProvisionOutput, Registry};
use crate::session::{Session, SessionEnv};
use crate::stackref::{
    StackReference, collapse_stack_reference, expand_stack_reference, resource_output_name,
    template_output_name,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use sc_api::{
    Auth, ProvisionerConfig, ResourceConfig, ResourceDescriptor, Stack, StackClientDescriptor,
    StackDeployConfig, StackDescriptor, StackParams,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, info_span};

pub const ENV_STACK: &str = "SIMPLE_CONTAINER_STACK";
pub const ENV_ENVIRONMENT: &str = "SIMPLE_CONTAINER_ENV";
pub const ENV_RESOURCE_TYPE: &str = "SIMPLE_CONTAINER_RESOURCE_TYPE";

/// Environment the secrets provider's cloud provider is keyed under
const SECRETS_PROVIDER_ENV: &str = "global";
const SECRETS_PROVIDER_RESOURCE: &str = "secrets-provider";

/// Image of the helper containers a provider type runs alongside workloads
pub fn helpers_image(provider_type: &str) -> String {
    format!(
        "simplecontainer/{}-cloud-helpers:{}",
        provider_type,
        env!("CARGO_PKG_VERSION")
    )
}

/// Cloud providers constructed during one program run
#[derive(Default)]
pub struct ProviderCache {
    providers: Mutex<HashMap<String, Arc<dyn CloudProvider>>>,
}

impl ProviderCache {
    pub fn key(stack_name: &str, provider_type: &str, name: &str, environment: &str) -> String {
        format!(
            "{}--{}--{}--{}--provider",
            stack_name, provider_type, name, environment
        )
    }

    /// Returns the provider cached under `key`, constructing it on first use
    pub fn get_or_try_insert<F>(&self, key: &str, construct: F) -> Result<Arc<dyn CloudProvider>>
    where
        F: FnOnce() -> Result<Arc<dyn CloudProvider>>,
    {
        let mut providers = self.providers.lock();
        if let Some(provider) = providers.get(key) {
            return Ok(provider.clone());
        }
        let provider = construct()?;
        debug!(key, provider = provider.name(), "Provider constructed");
        providers.insert(key.to_string(), provider.clone());
        Ok(provider)
    }

    pub fn len(&self) -> usize {
        self.providers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Resolves providers and runs registered provisioning functions
pub struct Dispatch<'a> {
    pub registry: &'a Registry,
    pub cache: &'a ProviderCache,
    pub ctx: &'a ProgramContext,
    pub registrar: &'a dyn Registrar,
    pub session_env: &'a SessionEnv,
}

impl Dispatch<'_> {
    /// Provider for `auth`, shared by every lookup with the same key
    pub fn provider(
        &self,
        auth: &Auth,
        stack_name: &str,
        environment: &str,
        resource_name: &str,
    ) -> Result<ProviderRef> {
        let provider_type = auth.provider_type();
        let key = ProviderCache::key(stack_name, provider_type, resource_name, environment);
        let handle = self.cache.get_or_try_insert(&key, || {
            let construct = self.registry.provider(provider_type)?;
            construct(&ProviderInput {
                auth,
                stack_name,
                environment,
                resource_name,
                session_env: self.session_env,
            })
        })?;
        Ok(self.ctx.register_provider(&key, handle))
    }

    /// Runs the provisioning function registered for the descriptor's type.
    ///
    /// Unknown types fail before any provider is constructed.
    pub fn provision(
        &self,
        stack_name: &str,
        environment: &str,
        resource_key: &str,
        descriptor: &ResourceDescriptor,
        collector: &ComputeContextCollector,
    ) -> Result<ProvisionOutput> {
        let name = descriptor
            .name
            .clone()
            .unwrap_or_else(|| resource_key.to_string());
        let context = |source: ProvisionerError| ProvisionerError::Resource {
            name: name.clone(),
            type_name: descriptor.type_.clone(),
            environment: environment.to_string(),
            source: Box::new(source),
        };

        let provision = self.registry.resource(&descriptor.type_).map_err(context)?;
        let auth = descriptor.config.auth();
        let provider = auth
            .as_ref()
            .map(|auth| self.provider(auth, stack_name, environment, &name))
            .transpose()
            .map_err(context)?;
        let provider_type = auth.as_ref().map_or("generic", Auth::provider_type);

        let base_env = BTreeMap::from([
            (ENV_STACK.to_string(), stack_name.to_string()),
            (ENV_ENVIRONMENT.to_string(), environment.to_string()),
            (ENV_RESOURCE_TYPE.to_string(), descriptor.type_.clone()),
        ]);
        let image = helpers_image(provider_type);

        let span = info_span!(
            "provision",
            resource = %name,
            type_name = %descriptor.type_,
            environment
        );
        let _entered = span.enter();
        info!("Provisioning resource");

        let output = provision(&ProvisionInput {
            ctx: self.ctx,
            stack_name,
            environment,
            resource_name: &name,
            descriptor,
            provider,
            collector,
            base_env: &base_env,
            helpers_image: &image,
            registrar: self.registrar,
            session_env: self.session_env,
        })
        .map_err(context)?;

        debug!(registered = output.resources.len(), "Resource provisioned");
        Ok(output)
    }
}

fn build_registrar(
    registry: &Registry,
    stack: &Stack,
    env: &SessionEnv,
) -> Result<Arc<dyn Registrar>> {
    match &stack.server.resources.registrar {
        None => Ok(Arc::new(NotConfigured)),
        Some(config) => (registry.registrar(config.type_name())?)(config, env),
    }
}

/// Registers the resource behind the configured secrets provider
fn register_secrets_provider(
    dispatch: &Dispatch<'_>,
    config: &ProvisionerConfig,
    stack_name: &str,
) -> Result<ResourceRef> {
    let secrets_provider = &config.secrets_provider;
    let auth = secrets_provider.auth().ok_or_else(|| {
        ProvisionerError::Precondition(format!(
            "secrets provider {} has no cloud credentials to provision with",
            secrets_provider.type_name()
        ))
    })?;
    let provision = dispatch
        .registry
        .secrets_provisioner(secrets_provider.type_name())?;
    let provider = dispatch.provider(
        &auth,
        stack_name,
        SECRETS_PROVIDER_ENV,
        SECRETS_PROVIDER_RESOURCE,
    )?;
    provision(dispatch.ctx, secrets_provider, &provider)
}

/// Program of a parent stack
pub struct ProvisionProgram {
    registry: Arc<Registry>,
    stack: Stack,
    config: ProvisionerConfig,
    session_env: SessionEnv,
}

impl ProvisionProgram {
    pub fn new(session: &Session, stack: &Stack) -> Self {
        Self {
            registry: session.registry().clone(),
            stack: stack.clone(),
            config: session.config().clone(),
            session_env: session.env().clone(),
        }
    }
}

#[async_trait]
impl Program for ProvisionProgram {
    fn name(&self) -> &str {
        &self.stack.name
    }

    async fn run(&self, ctx: &ProgramContext) -> Result<()> {
        let organization = &self.config.organization;
        let stack_name = &self.stack.name;
        let cache = ProviderCache::default();
        let registrar = build_registrar(&self.registry, &self.stack, &self.session_env)?;
        let dispatch = Dispatch {
            registry: &self.registry,
            cache: &cache,
            ctx,
            registrar: registrar.as_ref(),
            session_env: &self.session_env,
        };

        if self.config.secrets_provider.is_provision_enabled() {
            register_secrets_provider(&dispatch, &self.config, stack_name)?;
        }

        match registrar.provision_records(ctx) {
            Ok(records) => info!(records = records.len(), "Registrar records registered"),
            Err(e) if e.is_not_configured() => debug!("No registrar configured"),
            Err(e) => return Err(e),
        }

        for (environment, per_env) in &self.stack.server.resources.resources {
            let collector = ComputeContextCollector::new(stack_name, environment);
            for (key, descriptor) in &per_env.resources {
                dispatch.provision(stack_name, environment, key, descriptor, &collector)?;

                let name = descriptor.name.as_deref().unwrap_or(key);
                if let Some(context) = collector.resource_context(name) {
                    ctx.export_secret(
                        resource_output_name(organization, stack_name, environment, name),
                        serde_json::to_value(context)?,
                    );
                }
            }
        }

        for (name, template) in &self.stack.server.templates {
            ctx.export_secret(
                template_output_name(organization, stack_name, name),
                serde_json::to_value(template)?,
            );
        }

        info!(
            stack = %stack_name,
            providers = cache.len(),
            "Provisioning program registered"
        );
        Ok(())
    }
}

/// Parent a child stack deploys into, as given by the parameters or client.yaml
pub fn resolve_parent(stack: &Stack, params: &StackParams) -> Result<String> {
    if let Some(parent) = &params.parent_stack {
        return Ok(parent.clone());
    }
    stack
        .client_stack(&params.environment)
        .map(|client| client.parent.clone())
        .ok_or_else(|| {
            ProvisionerError::Precondition(format!(
                "stack {} has no client configuration for environment {}",
                stack.name, params.environment
            ))
        })
}

/// Program of a child stack
pub struct DeployProgram {
    registry: Arc<Registry>,
    params: StackParams,
    client: StackClientDescriptor,
    stack: Stack,
    parent: String,
    parent_env: String,
    config: ProvisionerConfig,
    session_env: SessionEnv,
    name: String,
}

impl DeployProgram {
    pub fn new(session: &Session, stack: &Stack, params: &StackParams) -> Result<Self> {
        let client = stack
            .client_stack(&params.environment)
            .cloned()
            .ok_or_else(|| {
                ProvisionerError::Precondition(format!(
                    "stack {} has no client configuration for environment {}",
                    stack.name, params.environment
                ))
            })?;
        let parent = resolve_parent(stack, params)?;
        let parent_env = client
            .parent_env
            .clone()
            .unwrap_or_else(|| params.environment.clone());

        Ok(Self {
            registry: session.registry().clone(),
            params: params.clone(),
            client,
            stack: stack.clone(),
            name: session.reference().stack.clone(),
            parent,
            parent_env,
            config: session.config().clone(),
            session_env: session.env().clone(),
        })
    }

    pub fn parent_reference(&self) -> Result<StackReference> {
        let project = collapse_stack_reference(&self.parent);
        StackReference::parse(&expand_stack_reference(
            &self.parent,
            &self.config.organization,
            &project,
        ))
    }

    fn template_name(&self) -> Result<String> {
        self.client
            .template
            .clone()
            .or_else(|| {
                self.stack
                    .server
                    .resources
                    .resources
                    .get(&self.parent_env)
                    .and_then(|r| r.template.clone())
            })
            .ok_or_else(|| {
                ProvisionerError::Precondition(format!(
                    "no template configured for environment {} of parent {}",
                    self.parent_env, self.parent
                ))
            })
    }
}

#[async_trait]
impl Program for DeployProgram {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: &ProgramContext) -> Result<()> {
        let organization = &self.config.organization;
        let stack_name = &self.params.stack_name;
        let environment = &self.params.environment;

        let parent_ref = self.parent_reference()?;
        let parent_outputs = ctx
            .stack_reference(&parent_ref)
            .await
            .map_err(|e| ProvisionerError::remote("read parent outputs", parent_ref.to_string(), e))?;

        let template_name = self.template_name()?;
        let template_key = template_output_name(organization, &self.parent, &template_name);
        let template: StackDescriptor = parent_outputs
            .get(&template_key)
            .cloned()
            .map(serde_json::from_value::<StackDescriptor>)
            .transpose()?
            .ok_or_else(|| {
                ProvisionerError::Precondition(format!(
                    "parent stack {} does not export template {}",
                    parent_ref, template_name
                ))
            })?;

        let collector = ComputeContextCollector::new(stack_name, environment);
        for used in &self.client.config.uses {
            let key = resource_output_name(organization, &self.parent, &self.parent_env, used);
            let value = parent_outputs.get(&key).cloned().ok_or_else(|| {
                ProvisionerError::Precondition(format!(
                    "resource {} is not exported by parent stack {} in environment {}",
                    used, parent_ref, self.parent_env
                ))
            })?;
            let context: ResourceContext = serde_json::from_value(value)?;
            collector.inject(used, context);
        }

        let descriptor = ResourceDescriptor::new(
            template.type_.clone(),
            ResourceConfig::Deploy(Box::new(StackDeployConfig {
                template,
                client: self.client.clone(),
                parent_ref: parent_ref.to_string(),
                parent_env: self.parent_env.clone(),
            })),
        )
        .with_name(stack_name.clone());

        let cache = ProviderCache::default();
        let registrar = build_registrar(&self.registry, &self.stack, &self.session_env)?;
        let dispatch = Dispatch {
            registry: &self.registry,
            cache: &cache,
            ctx,
            registrar: registrar.as_ref(),
            session_env: &self.session_env,
        };
        dispatch.provision(stack_name, environment, stack_name, &descriptor, &collector)?;

        if let Some(context) = collector.resource_context(stack_name) {
            for (key, value) in context.outputs {
                ctx.export(key, value);
            }
        }
        Ok(())
    }
}

/// Program registering only the secrets provider's resource
pub struct SecretsProviderProgram {
    registry: Arc<Registry>,
    config: ProvisionerConfig,
    stack_name: String,
    session_env: SessionEnv,
}

impl SecretsProviderProgram {
    pub fn new(
        registry: Arc<Registry>,
        config: ProvisionerConfig,
        stack_name: &str,
        session_env: SessionEnv,
    ) -> Self {
        Self {
            registry,
            config,
            stack_name: stack_name.to_string(),
            session_env,
        }
    }
}

#[async_trait]
impl Program for SecretsProviderProgram {
    fn name(&self) -> &str {
        SECRETS_PROVIDER_RESOURCE
    }

    async fn run(&self, ctx: &ProgramContext) -> Result<()> {
        let cache = ProviderCache::default();
        let dispatch = Dispatch {
            registry: &self.registry,
            cache: &cache,
            ctx,
            registrar: &NotConfigured,
            session_env: &self.session_env,
        };
        register_secrets_provider(&dispatch, &self.config, &self.stack_name)?;
        Ok(())
    }
}
