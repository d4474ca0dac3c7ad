use sc_api::{CloudflareCredentials, CloudflareRegistrarConfig, DnsRecord};
use sc_provisioner::engine::{LocalObjectStore, ProgramContext, StateBackend};
use sc_provisioner::{PassphraseSecretsProvider, StackReference};
use std::sync::Arc;

pub fn credentials() -> CloudflareCredentials {
    CloudflareCredentials {
        api_token: "cf-token".to_string(),
        account_id: "abc123".to_string(),
    }
}

pub fn registrar_config(records: Vec<DnsRecord>) -> CloudflareRegistrarConfig {
    CloudflareRegistrarConfig {
        credentials: credentials(),
        zone_name: "example.com".to_string(),
        records,
    }
}

pub fn context() -> ProgramContext {
    ProgramContext::new(
        StackReference::new("acme", "infra", "infra"),
        StateBackend::new(Arc::new(LocalObjectStore::new("/nonexistent"))),
        Arc::new(PassphraseSecretsProvider::new("test-pass").unwrap()),
    )
}
