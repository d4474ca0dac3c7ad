use async_trait::async_trait;
use parking_lot::Mutex;
use sc_api::{
    CloudRunTemplate, GcpBucketConfig, GcpCredentials, PerEnvResourcesDescriptor,
    ProvisionerConfig, ProvisionerDescriptor, ResourceConfig, ResourceDescriptor,
    SecretsProviderConfig, Stack, StackClientDescriptor, StackDescriptor, StateStorageConfig,
    TemplateConfig,
};
use sc_provisioner::engine::{
    AuthStatus, CloudProvider, ResourceArgs, ResourceOutputs, ResourceRequest,
};
use sc_provisioner::{ProvisionOutput, ProvisionerError, Provisioner, Registry, RegistryBuilder};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

pub const ORGANIZATION: &str = "acme";

/// In-memory cloud that records every call
#[derive(Default)]
pub struct FakeCloud {
    pub constructed: AtomicUsize,
    pub creates: AtomicUsize,
    pub deletes: AtomicUsize,
    resources: Mutex<BTreeMap<String, Value>>,
    failing: Mutex<Vec<String>>,
    failing_deletes: Mutex<Vec<String>>,
}

impl FakeCloud {
    pub fn fail_on(&self, name: &str) {
        self.failing.lock().push(name.to_string());
    }

    #[allow(dead_code)]
    pub fn fail_delete_on(&self, name: &str) {
        self.failing_deletes.lock().push(name.to_string());
    }

    pub fn heal(&self) {
        self.failing.lock().clear();
        self.failing_deletes.lock().clear();
    }

    pub fn creates(&self) -> usize {
        self.creates.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    /// Inputs the named resource was last created with
    #[allow(dead_code)]
    pub fn inputs(&self, name: &str) -> Option<Value> {
        self.resources.lock().get(name).cloned()
    }

    pub fn live(&self) -> Vec<String> {
        self.resources.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl CloudProvider for FakeCloud {
    fn name(&self) -> &str {
        "gcp"
    }

    async fn check_auth(&self) -> sc_provisioner::Result<AuthStatus> {
        Ok(AuthStatus::ok("fake"))
    }

    async fn create(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        if self.failing.lock().contains(&request.name) {
            return Err(ProvisionerError::Provider(format!(
                "{} quota exceeded",
                request.name
            )));
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.resources
            .lock()
            .insert(request.name.clone(), request.inputs.clone());
        Ok(ResourceOutputs::new()
            .with("id", request.name.clone())
            .with("url", format!("https://{}.example", request.name)))
    }

    async fn read(
        &self,
        request: &ResourceRequest,
    ) -> sc_provisioner::Result<Option<ResourceOutputs>> {
        if !self.resources.lock().contains_key(&request.name) {
            return Ok(None);
        }
        Ok(Some(ResourceOutputs {
            values: request.outputs.clone(),
            secrets: Default::default(),
        }))
    }

    async fn delete(&self, request: &ResourceRequest) -> sc_provisioner::Result<()> {
        if self.failing_deletes.lock().contains(&request.name) {
            return Err(ProvisionerError::Provider(format!(
                "{} is not empty",
                request.name
            )));
        }
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.resources.lock().remove(&request.name);
        Ok(())
    }
}

/// Registry with the fake cloud behind `gcp`, a bucket type and a Cloud Run template
pub fn registry(cloud: Arc<FakeCloud>) -> Registry {
    let mut builder = RegistryBuilder::new();
    builder
        .register_provider("gcp", move |_| {
            cloud.constructed.fetch_add(1, Ordering::SeqCst);
            Ok(cloud.clone() as Arc<dyn CloudProvider>)
        })
        .register_resource("gcp-bucket", |input| {
            let provider = input.require_provider()?;
            let bucket = input.ctx.register_resource(
                ResourceArgs::new("gcp:storage:Bucket", input.resource_name, provider)
                    .inputs(json!({"env": input.environment})),
            )?;
            input
                .collector
                .add_env_variable(input.resource_name, "BUCKET_URL", bucket.output("url"));
            input
                .collector
                .add_output(input.resource_name, "id", bucket.output("id"));
            Ok(ProvisionOutput::single(bucket))
        })
        .register_resource("cloudrun", |input| {
            let ResourceConfig::Deploy(deploy) = &input.descriptor.config else {
                return Err(ProvisionerError::Config {
                    expected: "cloudrun",
                    type_name: input.descriptor.type_.clone(),
                });
            };
            let provider = input.require_provider()?;
            let service = input.ctx.register_resource(
                ResourceArgs::new("gcp:cloudrun:Service", input.resource_name, provider).inputs(
                    json!({
                        "image": deploy.client.config.image,
                        "env": input.collector.env_variables(),
                        "baseEnv": input.base_env,
                    }),
                ),
            )?;
            input
                .collector
                .add_output(input.resource_name, "url", service.output("url"));
            Ok(ProvisionOutput::single(service))
        });
    builder.build()
}

pub fn provisioner(cloud: &Arc<FakeCloud>) -> Provisioner {
    Provisioner::new(Arc::new(registry(cloud.clone())))
}

fn credentials() -> GcpCredentials {
    GcpCredentials {
        project_id: "acme-test".to_string(),
        credentials: "{}".to_string(),
    }
}

pub fn bucket(type_: &str) -> ResourceDescriptor {
    if type_ != "gcp-bucket" {
        return ResourceDescriptor::new(type_, ResourceConfig::Unknown(json!({})));
    }
    ResourceDescriptor::new(
        "gcp-bucket",
        ResourceConfig::GcpBucket(GcpBucketConfig {
            credentials: credentials(),
            location: Some("europe-west1".to_string()),
            ..Default::default()
        }),
    )
}

/// Parent stack `infra` with filesystem state, a `web` template and the
/// given resources in environment `test`
pub fn parent_stack(state_dir: &Path, resources: &[(&str, ResourceDescriptor)]) -> Stack {
    let mut stack = Stack::new("infra");
    stack.server.provisioner = ProvisionerDescriptor::Pulumi(ProvisionerConfig {
        organization: ORGANIZATION.to_string(),
        state_storage: StateStorageConfig::Fs(sc_api::FsStateStorage {
            path: state_dir.display().to_string(),
        }),
        secrets_provider: SecretsProviderConfig::Passphrase(sc_api::PassphraseSecretsProvider {
            passphrase: "test-pass".to_string(),
        }),
    });
    stack.server.templates.insert(
        "web".to_string(),
        StackDescriptor {
            type_: "cloudrun".to_string(),
            config: TemplateConfig::CloudRun(CloudRunTemplate {
                credentials: credentials(),
                location: "europe-west1".to_string(),
            }),
        },
    );
    stack.server.resources.resources.insert(
        "test".to_string(),
        PerEnvResourcesDescriptor {
            template: Some("web".to_string()),
            resources: resources
                .iter()
                .map(|(name, descriptor)| (name.to_string(), descriptor.clone()))
                .collect(),
        },
    );
    stack
}

/// Child stack `web-app` deploying into `infra`'s `test` environment
pub fn child_stack(parent: &Stack, uses: &[&str]) -> Stack {
    let mut child = Stack::new("web-app");
    let mut client = StackClientDescriptor {
        parent: "infra".to_string(),
        ..Default::default()
    };
    client.config.image = Some("registry.example/web-app:1.0".to_string());
    client.config.uses = uses.iter().map(|u| u.to_string()).collect();
    child.client.stacks.insert("test".to_string(), client);
    child.child_stack(&parent.server)
}
