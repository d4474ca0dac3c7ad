//! Stack descriptor loader
//!
//! Reads `.sc/stacks/<stack>/{server,client,secrets}.yaml`, expands
//! placeholders and decodes the typed descriptors.

use crate::error::{ApiError, Result};
use crate::model::{ClientDescriptor, SecretsDescriptor, ServerDescriptor, Stack};
use crate::placeholder::resolve_value;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument};

pub const SC_DIR: &str = ".sc";
pub const STACKS_DIR: &str = "stacks";
pub const SERVER_FILE: &str = "server.yaml";
pub const CLIENT_FILE: &str = "client.yaml";
pub const SECRETS_FILE: &str = "secrets.yaml";

/// `<root>/.sc/stacks`
pub fn stacks_dir(root: &Path) -> PathBuf {
    root.join(SC_DIR).join(STACKS_DIR)
}

/// Loads every stack found under `<root>/.sc/stacks`
#[instrument(skip(root), fields(root = %root.display()))]
pub fn read_stacks(root: &Path) -> Result<BTreeMap<String, Stack>> {
    let dir = stacks_dir(root);
    if !dir.is_dir() {
        return Err(ApiError::StacksDirNotFound(dir));
    }

    let mut stacks = BTreeMap::new();
    for entry in std::fs::read_dir(&dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        let stack = read_stack(root, &name)?;
        stacks.insert(name, stack);
    }

    info!(stacks = stacks.len(), "Stacks loaded");
    Ok(stacks)
}

/// Loads one stack. Every file is optional, but at least one must exist.
#[instrument(skip(root), fields(root = %root.display()))]
pub fn read_stack(root: &Path, name: &str) -> Result<Stack> {
    let dir = stacks_dir(root).join(name);
    if !dir.is_dir() {
        return Err(ApiError::StackNotFound(name.to_string()));
    }

    let secrets: SecretsDescriptor =
        read_descriptor(&dir.join(SECRETS_FILE), None)?.unwrap_or_default();
    let server: Option<ServerDescriptor> = read_descriptor(&dir.join(SERVER_FILE), Some(&secrets))?;
    let client: Option<ClientDescriptor> = read_descriptor(&dir.join(CLIENT_FILE), Some(&secrets))?;

    if server.is_none() && client.is_none() {
        return Err(ApiError::InvalidConfig(format!(
            "stack '{}' has neither {} nor {}",
            name, SERVER_FILE, CLIENT_FILE
        )));
    }

    debug!(
        stack = name,
        server = server.is_some(),
        client = client.is_some(),
        secrets = secrets.values.len(),
        "Stack descriptors read"
    );

    Ok(Stack {
        name: name.to_string(),
        client: client.unwrap_or_default(),
        server: server.unwrap_or_default(),
        secrets,
    })
}

/// Reads a YAML descriptor; `Ok(None)` when the file does not exist.
///
/// When `secrets` is given, placeholders are expanded before decoding.
fn read_descriptor<T: DeserializeOwned>(
    path: &Path,
    secrets: Option<&SecretsDescriptor>,
) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }

    let content = std::fs::read_to_string(path).map_err(|e| ApiError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| ApiError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    if let Some(secrets) = secrets {
        resolve_value(&mut value, secrets)?;
    }

    serde_yaml::from_value(value)
        .map(Some)
        .map_err(|e| ApiError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}
