mod common;

use common::{credentials, run};
use sc_api::{
    ResourceConfig, ResourceDescriptor, Scale, StackClientDescriptor, StackDeployConfig,
    StackDescriptor, TemplateConfig, YandexBucketConfig, YcServerlessContainerTemplate,
};
use sc_cloud_yandex::resources;
use sc_provisioner::{ComputeContextCollector, ProvisionerError, RegistryBuilder};

fn container(service_account_id: &str) -> ResourceDescriptor {
    let mut client = StackClientDescriptor {
        parent: "infra".to_string(),
        ..Default::default()
    };
    client.config.image = Some("cr.yandex/crp123/web-app:1".to_string());
    client.config.memory = Some("512".to_string());
    client.config.scale = Some(Scale { min: 1, max: 4 });
    client
        .config
        .env
        .insert("LOG_LEVEL".to_string(), "debug".to_string());
    ResourceDescriptor::new(
        "yc-serverless-container",
        ResourceConfig::Deploy(Box::new(StackDeployConfig {
            template: StackDescriptor {
                type_: "yc-serverless-container".to_string(),
                config: TemplateConfig::YcServerlessContainer(YcServerlessContainerTemplate {
                    credentials: credentials(),
                    service_account_id: service_account_id.to_string(),
                }),
            },
            client,
            parent_ref: "acme/infra/infra".to_string(),
            parent_env: "test".to_string(),
        })),
    )
    .with_name("web-app")
}

#[test]
fn test_bucket_is_named_per_environment() {
    let collector = ComputeContextCollector::new("infra", "test");
    let descriptor = ResourceDescriptor::new(
        "yc-bucket",
        ResourceConfig::YandexBucket(YandexBucketConfig {
            credentials: credentials(),
            max_size: Some(1 << 30),
            public_read: true,
        }),
    );

    let (output, registrations) = run(resources::yc_bucket, "assets", &descriptor, &collector).unwrap();

    assert_eq!(output.resources.len(), 1);
    let bucket = &registrations.resources[0];
    assert_eq!(bucket.kind, "yandex:storage:Bucket");
    assert_eq!(bucket.inputs["name"], "assets-test");
    assert_eq!(bucket.inputs["publicRead"], true);
    assert!(bucket.forces_replacement("name"));
    let context = collector.resource_context("assets").unwrap();
    assert!(context.env.contains_key("ASSETS_BUCKET"));
    assert!(context.env.contains_key("ASSETS_URL"));
}

#[test]
fn test_bucket_rejects_other_configs() {
    let collector = ComputeContextCollector::new("infra", "test");
    let err = run(resources::yc_bucket, "assets", &container("aje"), &collector).unwrap_err();
    assert!(matches!(err, ProvisionerError::Config { .. }));
}

#[test]
fn test_container_revision_inputs() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let (_, registrations) = run(
        resources::yc_serverless_container,
        "web-app",
        &container("aje123"),
        &collector,
    )
    .unwrap();

    let container = &registrations.resources[0];
    assert_eq!(container.kind, "yandex:serverless:Container");
    assert_eq!(container.inputs["name"], "web-app-test");
    assert_eq!(container.inputs["serviceAccountId"], "aje123");
    assert_eq!(container.inputs["memory"], "512MB");
    assert_eq!(container.inputs["concurrency"], 4);
    assert_eq!(container.inputs["env"]["LOG_LEVEL"], "debug");
    assert_eq!(container.inputs["env"]["SIMPLE_CONTAINER_STACK"], "web-app");
    assert!(collector.resource_context("web-app").unwrap().outputs.contains_key("url"));
}

#[test]
fn test_container_requires_service_account() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let err = run(
        resources::yc_serverless_container,
        "web-app",
        &container(""),
        &collector,
    )
    .unwrap_err();
    assert!(matches!(err, ProvisionerError::Precondition(ref m) if m.contains("serviceAccountId")));
}

#[test]
fn test_register_adds_yandex_types() {
    let mut builder = RegistryBuilder::new();
    sc_cloud_yandex::register(&mut builder);
    let registry = builder.build();
    assert_eq!(
        registry.resource_types(),
        vec!["yc-bucket", "yc-serverless-container"]
    );
}
