//! `${secret:name}` and `${env:NAME}` placeholder resolution
//!
//! Placeholders are expanded on the raw YAML tree, before typed decoding, so
//! every string field of every descriptor can reference a secret.

use crate::error::{ApiError, Result};
use crate::model::SecretsDescriptor;
use regex::Regex;
use serde_yaml::Value;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{(secret|env):([A-Za-z0-9_.\-]+)\}").expect("valid placeholder regex")
});

/// Expands placeholders in a single string
pub fn resolve_str(input: &str, secrets: &SecretsDescriptor) -> Result<String> {
    let mut out = String::with_capacity(input.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(input) {
        let Some(whole) = caps.get(0) else {
            continue;
        };
        out.push_str(&input[last..whole.start()]);
        let key = &caps[2];
        let value = match &caps[1] {
            "secret" => secrets
                .values
                .get(key)
                .cloned()
                .ok_or_else(|| ApiError::MissingSecret(key.to_string()))?,
            _ => std::env::var(key).map_err(|_| ApiError::MissingEnvVar(key.to_string()))?,
        };
        out.push_str(&value);
        last = whole.end();
    }
    out.push_str(&input[last..]);
    Ok(out)
}

/// Expands placeholders in every string of a YAML tree
pub fn resolve_value(value: &mut Value, secrets: &SecretsDescriptor) -> Result<()> {
    match value {
        Value::String(s) => {
            if s.contains("${") {
                *s = resolve_str(s, secrets)?;
            }
        }
        Value::Sequence(items) => {
            for item in items {
                resolve_value(item, secrets)?;
            }
        }
        Value::Mapping(map) => {
            for (_, item) in map.iter_mut() {
                resolve_value(item, secrets)?;
            }
        }
        Value::Tagged(tagged) => resolve_value(&mut tagged.value, secrets)?,
        Value::Null | Value::Bool(_) | Value::Number(_) => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secrets() -> SecretsDescriptor {
        let mut s = SecretsDescriptor::default();
        s.values.insert("gcp-creds".to_string(), "{\"k\":1}".to_string());
        s.values.insert("token".to_string(), "cf-token".to_string());
        s
    }

    #[test]
    fn test_resolve_secret_placeholder() {
        let resolved = resolve_str("Bearer ${secret:token}", &secrets()).unwrap();
        assert_eq!(resolved, "Bearer cf-token");
    }

    #[test]
    fn test_missing_secret_fails() {
        let err = resolve_str("${secret:nope}", &secrets()).unwrap_err();
        assert!(matches!(err, ApiError::MissingSecret(name) if name == "nope"));
    }

    #[test]
    fn test_env_placeholder() {
        temp_env::with_var("SC_TEST_REGION", Some("europe-west1"), || {
            let resolved = resolve_str("${env:SC_TEST_REGION}-a", &secrets()).unwrap();
            assert_eq!(resolved, "europe-west1-a");
        });
    }

    #[test]
    fn test_resolve_nested_tree() {
        let mut value: Value = serde_yaml::from_str(
            "a:\n  - ${secret:token}\n  - plain\nb:\n  c: ${secret:gcp-creds}\nn: 3\n",
        )
        .unwrap();
        resolve_value(&mut value, &secrets()).unwrap();
        assert_eq!(value["a"][0].as_str(), Some("cf-token"));
        assert_eq!(value["a"][1].as_str(), Some("plain"));
        assert_eq!(value["b"]["c"].as_str(), Some("{\"k\":1}"));
        assert_eq!(value["n"].as_u64(), Some(3));
    }
}
