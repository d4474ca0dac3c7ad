mod common;

use common::{RecordingRegistrar, credentials, run};
use sc_api::{
    CloudRunTemplate, GcpBucketConfig, GkeAutopilotConfig, ResourceConfig, ResourceDescriptor,
    StackClientDescriptor, StackDeployConfig, StackDescriptor, TemplateConfig,
};
use sc_cloud_gcp::resources;
use sc_provisioner::engine::ResourceArgs;
use sc_provisioner::{ComputeContextCollector, ProvisionerError, ResourceContext};
use serde_json::json;

fn bucket() -> ResourceDescriptor {
    ResourceDescriptor::new(
        "gcp-bucket",
        ResourceConfig::GcpBucket(GcpBucketConfig {
            credentials: credentials(),
            location: Some("EU".to_string()),
            storage_class: None,
        }),
    )
}

fn cloudrun(domain: Option<&str>) -> ResourceDescriptor {
    let mut client = StackClientDescriptor {
        parent: "infra".to_string(),
        ..Default::default()
    };
    client.config.image = Some("registry.example/web-app:1.0".to_string());
    client.config.port = Some(8080);
    client.config.env.insert("LOG_LEVEL".to_string(), "debug".to_string());
    client.config.domain = domain.map(str::to_string);
    ResourceDescriptor::new(
        "cloudrun",
        ResourceConfig::Deploy(Box::new(StackDeployConfig {
            template: StackDescriptor {
                type_: "cloudrun".to_string(),
                config: TemplateConfig::CloudRun(CloudRunTemplate {
                    credentials: credentials(),
                    location: "europe-west1".to_string(),
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
fn test_bucket_registers_per_environment_name() {
    let collector = ComputeContextCollector::new("infra", "test");
    let (output, registrations) =
        run(resources::bucket, "media-assets", &bucket(), &collector, None).unwrap();

    assert_eq!(output.resources.len(), 1);
    let desired = &registrations.resources[0];
    assert_eq!(desired.kind, "gcp:storage:Bucket");
    assert_eq!(desired.inputs["name"], "media-assets-test");
    assert_eq!(desired.inputs["location"], "EU");
    assert!(desired.forces_replacement("location"));

    let context = collector.resource_context("media-assets").unwrap();
    assert!(context.env.contains_key("MEDIA_ASSETS_BUCKET"));
    assert!(context.env.contains_key("MEDIA_ASSETS_URL"));
}

#[test]
fn test_gke_autopilot_requires_location() {
    let collector = ComputeContextCollector::new("infra", "test");
    let descriptor = ResourceDescriptor::new(
        "gcp-gke-autopilot-cluster",
        ResourceConfig::GkeAutopilot(GkeAutopilotConfig {
            credentials: credentials(),
            ..Default::default()
        }),
    );
    let err = run(resources::gke_autopilot, "gke", &descriptor, &collector, None).unwrap_err();
    assert!(matches!(err, ProvisionerError::Precondition(_)));
}

#[test]
fn test_wrong_config_variant_is_a_config_error() {
    let collector = ComputeContextCollector::new("infra", "test");
    let err = run(resources::gke_autopilot, "assets", &bucket(), &collector, None).unwrap_err();
    assert!(matches!(
        err,
        ProvisionerError::Config { expected: "gcp-gke-autopilot-cluster", .. }
    ));
}

#[test]
fn test_cloudrun_merges_environment() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let mut context = ResourceContext::default();
    context
        .env
        .insert("ASSETS_BUCKET".to_string(), json!("assets-test"));
    context
        .secret_env
        .insert("DB_PASSWORD".to_string(), json!("hunter2"));
    collector.inject("assets", context);

    let (output, registrations) =
        run(resources::cloudrun, "web-app", &cloudrun(None), &collector, None).unwrap();

    assert_eq!(output.resources.len(), 1);
    let service = &registrations.resources[0];
    assert_eq!(service.kind, "gcp:cloudrun:Service");
    assert_eq!(service.inputs["image"], "registry.example/web-app:1.0");
    assert_eq!(service.inputs["region"], "europe-west1");
    assert_eq!(service.inputs["port"], 8080);
    let env = &service.inputs["env"];
    assert_eq!(env["SIMPLE_CONTAINER_STACK"], "web-app");
    assert_eq!(env["LOG_LEVEL"], "debug");
    assert_eq!(env["ASSETS_BUCKET"], "assets-test");
    assert_eq!(env["DB_PASSWORD"], "hunter2");
    assert!(collector.resource_context("web-app").unwrap().outputs.contains_key("url"));
}

#[test]
fn test_cloudrun_without_image_fails() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let mut descriptor = cloudrun(None);
    if let ResourceConfig::Deploy(deploy) = &mut descriptor.config {
        deploy.client.config.image = None;
    }
    let err = run(resources::cloudrun, "web-app", &descriptor, &collector, None).unwrap_err();
    assert!(matches!(err, ProvisionerError::Precondition(ref m) if m.contains("image")));
}

#[test]
fn test_cloudrun_domain_registers_cname_and_mapping() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let registrar = RecordingRegistrar::default();
    let (output, registrations) = run(
        resources::cloudrun,
        "web-app",
        &cloudrun(Some("app.example.com")),
        &collector,
        Some(&registrar),
    )
    .unwrap();

    assert_eq!(output.resources.len(), 3);
    let records = registrar.records.lock().unwrap();
    assert_eq!(records[0].name, "app.example.com");
    assert_eq!(records[0].record_type, "CNAME");
    assert_eq!(records[0].value, resources::CLOUD_RUN_DOMAIN_TARGET);

    let mapping = registrations
        .resources
        .iter()
        .find(|r| r.kind == "gcp:cloudrun:DomainMapping")
        .unwrap();
    assert_eq!(mapping.dependencies(), vec![registrations.resources[0].urn.clone()]);
}

#[test]
fn test_cloudrun_domain_without_registrar_still_maps() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let (output, _) = run(
        resources::cloudrun,
        "web-app",
        &cloudrun(Some("app.example.com")),
        &collector,
        None,
    )
    .unwrap();
    assert_eq!(output.resources.len(), 2);
}

#[test]
fn test_cloudrun_depends_on_collected_resources() {
    let ctx = common::context();
    let provider = common::provider(&ctx);
    let bucket = ctx
        .register_resource(ResourceArgs::new("gcp:storage:Bucket", "assets-test", &provider))
        .unwrap();
    let collector = ComputeContextCollector::new("web-app", "test");
    collector.add_dependency(bucket.clone());

    let (_, registrations) =
        run(resources::cloudrun, "web-app", &cloudrun(None), &collector, None).unwrap();
    assert_eq!(registrations.resources[0].depends_on, vec![bucket.urn]);
}

#[test]
fn test_register_adds_gcp_types() {
    let mut builder = sc_provisioner::RegistryBuilder::new();
    sc_cloud_gcp::register(&mut builder);
    let registry = builder.build();
    assert_eq!(
        registry.resource_types(),
        vec![
            "cloudrun",
            "gcp-artifact-registry",
            "gcp-bucket",
            "gcp-gke-autopilot-cluster"
        ]
    );
    assert!(registry.state_store_initializer("gcp").is_some());
    assert!(registry.secrets_provider("gcp-kms").is_ok());
}
