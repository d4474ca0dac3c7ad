//! References to outputs of other resources
//!
//! A reference is embedded in resource inputs or stack exports as
//! `{"$output": {"urn": ..., "key": ...}}` and replaced by the referenced
//! value once the producing resource has been applied.

use crate::error::{ProvisionerError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

const OUTPUT_MARKER: &str = "$output";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputRef {
    pub urn: String,
    pub key: String,
}

impl OutputRef {
    pub fn new(urn: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            urn: urn.into(),
            key: key.into(),
        }
    }

    pub fn to_value(&self) -> Value {
        json!({ OUTPUT_MARKER: { "urn": self.urn, "key": self.key } })
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if object.len() != 1 {
            return None;
        }
        serde_json::from_value(object.get(OUTPUT_MARKER)?.clone()).ok()
    }
}

impl From<OutputRef> for Value {
    fn from(reference: OutputRef) -> Self {
        reference.to_value()
    }
}

/// Every output reference inside a value
pub fn collect_refs(value: &Value) -> Vec<OutputRef> {
    let mut refs = Vec::new();
    walk(value, &mut refs);
    refs
}

fn walk(value: &Value, refs: &mut Vec<OutputRef>) {
    if let Some(reference) = OutputRef::from_value(value) {
        refs.push(reference);
        return;
    }
    match value {
        Value::Array(items) => items.iter().for_each(|v| walk(v, refs)),
        Value::Object(map) => map.values().for_each(|v| walk(v, refs)),
        _ => {}
    }
}

/// Replaces every output reference using `lookup`
pub fn resolve<F>(value: &Value, lookup: &F) -> Result<Value>
where
    F: Fn(&OutputRef) -> Option<Value>,
{
    if let Some(reference) = OutputRef::from_value(value) {
        return lookup(&reference).ok_or_else(|| {
            ProvisionerError::State(format!(
                "output '{}' of {} is not available",
                reference.key, reference.urn
            ))
        });
    }
    Ok(match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve(v, lookup))
                .collect::<Result<Vec<_>>>()?,
        ),
        Value::Object(map) => {
            let mut resolved = Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k.clone(), resolve(v, lookup)?);
            }
            Value::Object(resolved)
        }
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_and_resolve() {
        let bucket = OutputRef::new("urn:sc:infra::gcp:storage:Bucket::assets", "name");
        let inputs = json!({
            "env": { "BUCKET": bucket.to_value(), "MODE": "prod" },
            "list": [bucket.to_value()],
        });
        assert_eq!(collect_refs(&inputs), vec![bucket.clone(), bucket.clone()]);

        let resolved = resolve(&inputs, &|r: &OutputRef| {
            (r.key == "name").then(|| json!("assets-1234"))
        })
        .unwrap();
        assert_eq!(resolved["env"]["BUCKET"], "assets-1234");
        assert_eq!(resolved["list"][0], "assets-1234");
        assert_eq!(resolved["env"]["MODE"], "prod");
    }

    #[test]
    fn test_unresolvable_reference_fails() {
        let inputs = OutputRef::new("urn:x", "missing").to_value();
        assert!(resolve(&inputs, &|_: &OutputRef| None).is_err());
    }
}
