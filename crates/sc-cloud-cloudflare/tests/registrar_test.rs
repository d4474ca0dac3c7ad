mod common;

use common::{context, registrar_config};
use sc_api::{DnsRecord, RegistrarConfig};
use sc_cloud_cloudflare::CloudflareRegistrar;
use sc_provisioner::{OverrideHeaderRule, ProvisionerError, Registrar, RegistryBuilder, SessionEnv};
use serde_json::json;

fn record(name: &str, record_type: &str, value: &str) -> DnsRecord {
    DnsRecord {
        name: name.to_string(),
        record_type: record_type.to_string(),
        value: value.to_string(),
        proxied: true,
        ttl: None,
    }
}

#[test]
fn test_provision_records_registers_every_record() {
    let registrar = CloudflareRegistrar::new(
        registrar_config(vec![
            record("@", "A", "203.0.113.10"),
            record("www", "CNAME", "example.com"),
        ]),
        &SessionEnv::new(),
    )
    .unwrap();
    let ctx = context();

    let records = registrar.provision_records(&ctx).unwrap();
    assert_eq!(records.len(), 2);

    let registrations = ctx.into_registrations();
    assert_eq!(registrations.providers.len(), 1);
    let names: Vec<&str> = registrations.resources.iter().map(|r| r.name.as_str()).collect();
    assert_eq!(names, vec!["example.com-a", "www.example.com-cname"]);
    let apex = &registrations.resources[0];
    assert_eq!(apex.kind, "cloudflare:dns:Record");
    assert_eq!(apex.inputs["zoneName"], "example.com");
    assert_eq!(apex.inputs["proxied"], true);
    assert!(apex.forces_replacement("type"));
}

#[test]
fn test_same_record_twice_is_a_duplicate() {
    let registrar =
        CloudflareRegistrar::new(registrar_config(Vec::new()), &SessionEnv::new()).unwrap();
    let ctx = context();
    let cname = record("app", "CNAME", "ghs.googlehosted.com");
    registrar.new_record(&ctx, &cname).unwrap();
    let err = registrar.new_record(&ctx, &cname).unwrap_err();
    assert!(matches!(err, ProvisionerError::DuplicateResource(_)));
}

#[test]
fn test_override_header_rule() {
    let registrar =
        CloudflareRegistrar::new(registrar_config(Vec::new()), &SessionEnv::new()).unwrap();
    let ctx = context();
    registrar
        .new_override_header_rule(
            &ctx,
            &OverrideHeaderRule {
                name: "web-app-host".to_string(),
                hostname: "app.example.com".to_string(),
                host_header: json!("web-app-abc.a.run.app"),
            },
        )
        .unwrap();

    let registrations = ctx.into_registrations();
    let rule = &registrations.resources[0];
    assert_eq!(rule.kind, "cloudflare:ruleset:Rule");
    assert_eq!(rule.inputs["hostname"], "app.example.com");
    assert_eq!(rule.inputs["hostHeader"], "web-app-abc.a.run.app");
}

#[test]
fn test_registrar_requires_zone() {
    let mut config = registrar_config(Vec::new());
    config.zone_name.clear();
    assert!(matches!(
        CloudflareRegistrar::new(config, &SessionEnv::new()),
        Err(ProvisionerError::Precondition(_))
    ));
}

#[test]
fn test_registry_builds_cloudflare_registrar() {
    let mut builder = RegistryBuilder::new();
    sc_cloud_cloudflare::register(&mut builder);
    let registry = builder.build();

    let config = RegistrarConfig::Cloudflare(registrar_config(vec![record("@", "A", "203.0.113.10")]));
    let factory = registry.registrar("cloudflare").unwrap();
    let registrar = factory(&config, &SessionEnv::new()).unwrap();
    let ctx = context();
    assert_eq!(registrar.provision_records(&ctx).unwrap().len(), 1);
    assert_eq!(registry.resource_types(), vec!["cloudflare-r2-bucket"]);
}
