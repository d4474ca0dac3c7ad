mod common;

use common::{credentials, run};
use sc_api::{
    AwsLambdaTemplate, EcsFargateTemplate, ResourceConfig, ResourceDescriptor, S3BucketConfig,
    StackClientDescriptor, StackDeployConfig, StackDescriptor, TemplateConfig,
};
use sc_cloud_aws::resources;
use sc_provisioner::{ComputeContextCollector, ProvisionerError, RegistryBuilder};

fn deploy(type_: &str, template: TemplateConfig) -> ResourceDescriptor {
    let mut client = StackClientDescriptor {
        parent: "infra".to_string(),
        ..Default::default()
    };
    client.config.image = Some("123.dkr.ecr.eu-central-1.amazonaws.com/web-app:1".to_string());
    client.config.port = Some(8080);
    client.config.memory = Some("1Gi".to_string());
    ResourceDescriptor::new(
        type_,
        ResourceConfig::Deploy(Box::new(StackDeployConfig {
            template: StackDescriptor {
                type_: type_.to_string(),
                config: template,
            },
            client,
            parent_ref: "acme/infra/infra".to_string(),
            parent_env: "test".to_string(),
        })),
    )
    .with_name("web-app")
}

fn fargate(subnets: &[&str]) -> ResourceDescriptor {
    deploy(
        "ecs-fargate",
        TemplateConfig::EcsFargate(EcsFargateTemplate {
            credentials: credentials(),
            subnets: subnets.iter().map(|s| s.to_string()).collect(),
            execution_role_arn: "arn:aws:iam::123456789012:role/ecs".to_string(),
            ..Default::default()
        }),
    )
}

#[test]
fn test_s3_bucket_exports_credentials_as_secrets() {
    let collector = ComputeContextCollector::new("infra", "test");
    let descriptor = ResourceDescriptor::new(
        "s3-bucket",
        ResourceConfig::S3Bucket(S3BucketConfig {
            credentials: credentials(),
            allow_only_https: true,
            versioning: false,
        }),
    );

    let (_, registrations) = run(resources::s3_bucket, "uploads", &descriptor, &collector).unwrap();

    let bucket = &registrations.resources[0];
    assert_eq!(bucket.kind, "aws:s3:Bucket");
    assert_eq!(bucket.inputs["name"], "uploads-test");
    assert_eq!(bucket.inputs["allowOnlyHttps"], true);
    let context = collector.resource_context("uploads").unwrap();
    assert!(context.env.contains_key("UPLOADS_BUCKET"));
    assert_eq!(context.secret_env["UPLOADS_ACCESS_KEY"], "AKIATEST");
}

#[test]
fn test_ecs_fargate_wires_cluster_task_and_service() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let (output, registrations) =
        run(resources::ecs_fargate, "web-app", &fargate(&["subnet-1"]), &collector).unwrap();

    assert_eq!(output.resources.len(), 3);
    let kinds: Vec<&str> = registrations.resources.iter().map(|r| r.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec!["aws:ecs:Cluster", "aws:ecs:TaskDefinition", "aws:ecs:Service"]
    );

    let task = &registrations.resources[1];
    assert_eq!(task.inputs["memory"], "1024");
    assert_eq!(task.inputs["cpu"], "256");
    assert_eq!(task.inputs["env"]["SIMPLE_CONTAINER_ENV"], "test");

    let service = &registrations.resources[2];
    let mut dependencies = service.dependencies();
    dependencies.sort();
    let mut expected = vec![
        registrations.resources[0].urn.clone(),
        registrations.resources[1].urn.clone(),
    ];
    expected.sort();
    assert_eq!(dependencies, expected);
    assert_eq!(service.inputs["desiredCount"], 1);
}

#[test]
fn test_ecs_fargate_requires_subnets() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let err = run(resources::ecs_fargate, "web-app", &fargate(&[]), &collector).unwrap_err();
    assert!(matches!(err, ProvisionerError::Precondition(ref m) if m.contains("subnets")));
}

#[test]
fn test_lambda_requires_role() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let descriptor = deploy(
        "aws-lambda",
        TemplateConfig::AwsLambda(AwsLambdaTemplate {
            credentials: credentials(),
            role_arn: String::new(),
            timeout: 30,
        }),
    );
    let err = run(resources::aws_lambda, "web-app", &descriptor, &collector).unwrap_err();
    assert!(matches!(err, ProvisionerError::Precondition(ref m) if m.contains("roleArn")));
}

#[test]
fn test_lambda_function() {
    let collector = ComputeContextCollector::new("web-app", "test");
    let descriptor = deploy(
        "aws-lambda",
        TemplateConfig::AwsLambda(AwsLambdaTemplate {
            credentials: credentials(),
            role_arn: "arn:aws:iam::123456789012:role/lambda".to_string(),
            timeout: 60,
        }),
    );
    let (_, registrations) = run(resources::aws_lambda, "web-app", &descriptor, &collector).unwrap();
    let function = &registrations.resources[0];
    assert_eq!(function.inputs["name"], "web-app-test");
    assert_eq!(function.inputs["memory"], 1024);
    assert_eq!(function.inputs["timeout"], 60);
    assert!(collector.resource_context("web-app").unwrap().outputs.contains_key("url"));
}

#[test]
fn test_register_adds_aws_types() {
    let mut builder = RegistryBuilder::new();
    sc_cloud_aws::register(&mut builder);
    let registry = builder.build();
    assert_eq!(
        registry.resource_types(),
        vec!["aws-lambda", "ecs-fargate", "s3-bucket"]
    );
    assert!(registry.state_store("s3-bucket").is_ok());
    assert!(registry.secrets_provisioner("aws-kms").is_ok());
}
