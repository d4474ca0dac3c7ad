//! Configuration model
//!
//! Descriptors mirror the YAML files under `.sc/stacks/<stack>/`.
//! Every polymorphic `{type, config}` pair is decoded through [`RawTyped`]
//! into a closed enum of known variants.

mod auth;
mod client;
mod resource;
mod results;
mod server;
mod stack;

pub use auth::*;
pub use client::*;
pub use resource::*;
pub use results::*;
pub use server::*;
pub use stack::*;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Wire shape of every `{type, name?, config}` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawTyped {
    #[serde(rename = "type", default)]
    pub type_: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub config: Value,
}

impl RawTyped {
    pub(crate) fn new(type_: impl Into<String>, config: Value) -> Self {
        Self {
            type_: type_.into(),
            name: None,
            config,
        }
    }

    pub(crate) fn encode<T: Serialize>(type_: impl Into<String>, config: &T) -> Self {
        Self::new(
            type_,
            serde_json::to_value(config).unwrap_or(Value::Null),
        )
    }
}

/// Decodes a config payload; an absent payload decodes like an empty map.
pub(crate) fn decode_config<T: DeserializeOwned>(config: Value) -> Result<T, serde_json::Error> {
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config
    };
    serde_json::from_value(config)
}
