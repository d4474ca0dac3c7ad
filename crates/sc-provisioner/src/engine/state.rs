//! Persisted stack state
//!
//! Every stack is one JSON document at `stacks/<org>/<project>/<stack>.json`
//! in the backend's object store; the previous version is kept next to it as
//! `.json.bak`. Locks live at `locks/<org>/<project>/<stack>.json`.

use crate::error::{ProvisionerError, Result};
use crate::secrets::SecretsProvider;
use crate::stackref::StackReference;
use super::store::ObjectStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

const STATE_VERSION: u32 = 1;
const LOCK_STALE_AFTER_HOURS: i64 = 1;

/// An output value as persisted; secrets are stored encrypted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutputValue {
    Plain { value: Value },
    Secret { ciphertext: String },
}

impl OutputValue {
    pub fn is_secret(&self) -> bool {
        matches!(self, OutputValue::Secret { .. })
    }

    pub async fn seal(value: &Value, secret: bool, secrets: &dyn SecretsProvider) -> Result<Self> {
        if secret {
            let plaintext = serde_json::to_string(value)?;
            Ok(OutputValue::Secret {
                ciphertext: secrets.encrypt(&plaintext).await?,
            })
        } else {
            Ok(OutputValue::Plain {
                value: value.clone(),
            })
        }
    }

    pub async fn open(&self, secrets: &dyn SecretsProvider) -> Result<Value> {
        match self {
            OutputValue::Plain { value } => Ok(value.clone()),
            OutputValue::Secret { ciphertext } => {
                let plaintext = secrets.decrypt(ciphertext).await?;
                Ok(serde_json::from_str(&plaintext)?)
            }
        }
    }
}

/// Seals a map of outputs, encrypting the keys listed in `secret_keys`
pub async fn seal_outputs(
    values: &BTreeMap<String, Value>,
    secret_keys: &BTreeSet<String>,
    secrets: &dyn SecretsProvider,
) -> Result<BTreeMap<String, OutputValue>> {
    let mut sealed = BTreeMap::new();
    for (key, value) in values {
        sealed.insert(
            key.clone(),
            OutputValue::seal(value, secret_keys.contains(key), secrets).await?,
        );
    }
    Ok(sealed)
}

pub async fn open_outputs(
    outputs: &BTreeMap<String, OutputValue>,
    secrets: &dyn SecretsProvider,
) -> Result<BTreeMap<String, Value>> {
    let mut opened = BTreeMap::new();
    for (key, value) in outputs {
        opened.insert(key.clone(), value.open(secrets).await?);
    }
    Ok(opened)
}

/// State of one managed resource
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceState {
    pub urn: String,
    pub kind: String,
    pub name: String,
    /// URN of the provider that manages the resource
    pub provider: String,
    /// Declared inputs; output references are kept unresolved
    pub inputs: Value,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputValue>,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// State document of one stack
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackState {
    pub version: u32,
    pub reference: StackReference,
    pub secrets_provider: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Resources in dependency order
    #[serde(default)]
    pub resources: Vec<ResourceState>,
    #[serde(default)]
    pub outputs: BTreeMap<String, OutputValue>,
}

impl StackState {
    pub fn new(reference: StackReference, secrets_provider: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            version: STATE_VERSION,
            reference,
            secrets_provider: secrets_provider.into(),
            created_at: now,
            updated_at: now,
            resources: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn resource(&self, urn: &str) -> Option<&ResourceState> {
        self.resources.iter().find(|r| r.urn == urn)
    }

    /// Replaces the resource in place or appends it
    pub fn upsert_resource(&mut self, resource: ResourceState) {
        match self.resources.iter_mut().find(|r| r.urn == resource.urn) {
            Some(existing) => *existing = resource,
            None => self.resources.push(resource),
        }
        self.updated_at = Utc::now();
    }

    pub fn remove_resource(&mut self, urn: &str) -> Option<ResourceState> {
        let index = self.resources.iter().position(|r| r.urn == urn)?;
        self.updated_at = Utc::now();
        Some(self.resources.remove(index))
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LockInfo {
    holder: String,
    operation: String,
    acquired_at: DateTime<Utc>,
}

fn locked(reference: &StackReference, info: &LockInfo) -> ProvisionerError {
    ProvisionerError::Locked {
        stack: reference.to_string(),
        holder: format!("{} ({})", info.holder, info.operation),
        since: info.acquired_at.to_rfc3339(),
    }
}

/// Reads and writes stack documents and locks in an object store
#[derive(Clone)]
pub struct StateBackend {
    store: Arc<dyn ObjectStore>,
}

impl StateBackend {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn url(&self) -> String {
        self.store.url()
    }

    fn stack_key(reference: &StackReference) -> String {
        format!(
            "stacks/{}/{}/{}.json",
            reference.organization, reference.project, reference.stack
        )
    }

    fn backup_key(reference: &StackReference) -> String {
        format!("{}.bak", Self::stack_key(reference))
    }

    fn lock_key(reference: &StackReference) -> String {
        format!(
            "locks/{}/{}/{}.json",
            reference.organization, reference.project, reference.stack
        )
    }

    pub async fn get_stack(&self, reference: &StackReference) -> Result<Option<StackState>> {
        let Some(data) = self.store.get(&Self::stack_key(reference)).await? else {
            return Ok(None);
        };
        let state: StackState = serde_json::from_slice(&data)?;
        if state.version > STATE_VERSION {
            return Err(ProvisionerError::State(format!(
                "state of {} has version {}, newer than supported version {}",
                reference, state.version, STATE_VERSION
            )));
        }
        Ok(Some(state))
    }

    pub async fn require_stack(&self, reference: &StackReference) -> Result<StackState> {
        self.get_stack(reference)
            .await?
            .ok_or_else(|| ProvisionerError::StackNotFound(reference.to_string()))
    }

    pub async fn create_stack(
        &self,
        reference: &StackReference,
        secrets_provider: &str,
    ) -> Result<StackState> {
        if self.store.exists(&Self::stack_key(reference)).await? {
            return Err(ProvisionerError::StackAlreadyExists(reference.to_string()));
        }
        let state = StackState::new(reference.clone(), secrets_provider);
        self.write(&state).await?;
        tracing::debug!(stack = %reference, "Created stack record");
        Ok(state)
    }

    /// Writes the stack document, keeping the previous version as a backup
    pub async fn save_stack(&self, state: &StackState) -> Result<()> {
        let key = Self::stack_key(&state.reference);
        if let Some(previous) = self.store.get(&key).await? {
            self.store
                .put(&Self::backup_key(&state.reference), previous)
                .await?;
        }
        self.write(state).await?;
        tracing::debug!(
            stack = %state.reference,
            resources = state.resources.len(),
            "Saved stack state"
        );
        Ok(())
    }

    async fn write(&self, state: &StackState) -> Result<()> {
        let content = serde_json::to_vec_pretty(state)?;
        self.store
            .put(&Self::stack_key(&state.reference), content)
            .await
    }

    pub async fn remove_stack(&self, reference: &StackReference) -> Result<()> {
        self.store.delete(&Self::stack_key(reference)).await?;
        self.store.delete(&Self::backup_key(reference)).await?;
        tracing::debug!(stack = %reference, "Removed stack record");
        Ok(())
    }

    async fn read_lock(&self, key: &str) -> Result<Option<LockInfo>> {
        match self.store.get(key).await? {
            Some(data) => Ok(Some(serde_json::from_slice(&data)?)),
            None => Ok(None),
        }
    }

    /// Acquires the stack lock; locks older than an hour are considered stale.
    ///
    /// The lock is created with [`ObjectStore::put_new`], so it is exclusive
    /// only on stores with a conditional write (the filesystem store). Bucket
    /// and hosted stores check then write.
    pub async fn acquire_lock(
        &self,
        reference: &StackReference,
        operation: &str,
    ) -> Result<StackLock> {
        let key = Self::lock_key(reference);
        if let Some(info) = self.read_lock(&key).await? {
            let age = Utc::now().signed_duration_since(info.acquired_at);
            if age.num_hours() < LOCK_STALE_AFTER_HOURS {
                return Err(locked(reference, &info));
            }
            tracing::warn!(stack = %reference, holder = %info.holder, "Removing stale lock");
            self.store.delete(&key).await?;
        }

        let info = LockInfo {
            holder: std::env::var("HOSTNAME")
                .or_else(|_| std::env::var("HOST"))
                .unwrap_or_else(|_| "unknown".to_string()),
            operation: operation.to_string(),
            acquired_at: Utc::now(),
        };
        if !self
            .store
            .put_new(&key, serde_json::to_vec_pretty(&info)?)
            .await?
        {
            let holder = self.read_lock(&key).await?.unwrap_or(info);
            return Err(locked(reference, &holder));
        }
        tracing::debug!(stack = %reference, operation, "Acquired stack lock");

        Ok(StackLock {
            store: self.store.clone(),
            key,
        })
    }

    /// Removes the lock regardless of its holder; returns whether one existed
    pub async fn force_unlock(&self, reference: &StackReference) -> Result<bool> {
        let key = Self::lock_key(reference);
        let existed = self.store.exists(&key).await?;
        self.store.delete(&key).await?;
        Ok(existed)
    }
}

/// Held stack lock; released explicitly with [`StackLock::release`]
pub struct StackLock {
    store: Arc<dyn ObjectStore>,
    key: String,
}

impl StackLock {
    pub async fn release(self) -> Result<()> {
        self.store.delete(&self.key).await?;
        tracing::debug!(key = %self.key, "Released stack lock");
        Ok(())
    }
}
