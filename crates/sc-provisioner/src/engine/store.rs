//! Object stores backing the state backend
//!
//! State documents are addressed by slash-separated keys. The filesystem
//! store maps keys onto paths under a root directory, the HTTP store onto
//! `{url}/api/state/{key}` of a hosted state service. Bucket stores
//! (`gs://`, `s3://`) are contributed by the provider packages.

use crate::error::{ProvisionerError, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Backend URL, e.g. `file:///var/state` or `gs://acme-state`
    fn url(&self) -> String;

    /// Reads an object; `Ok(None)` when absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()>;

    /// Writes an object only if it does not exist yet; returns whether it was written.
    ///
    /// The default checks then writes and is not exclusive: two writers racing
    /// on the same key can both succeed. Stores with a conditional write
    /// override it.
    async fn put_new(&self, key: &str, data: Vec<u8>) -> Result<bool> {
        if self.exists(key).await? {
            return Ok(false);
        }
        self.put(key, data).await?;
        Ok(true)
    }

    /// Deletes an object; deleting an absent object is not an error
    async fn delete(&self, key: &str) -> Result<()>;

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.get(key).await?.is_some())
    }
}

/// Filesystem object store
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    /// Accepts a plain path or a `file://` URL
    pub fn from_url(url: &str) -> Self {
        Self::new(url.strip_prefix("file://").unwrap_or(url))
    }

    fn path(&self, key: &str) -> PathBuf {
        key.split('/')
            .filter(|s| !s.is_empty() && *s != "..")
            .fold(self.root.clone(), |p, s| p.join(s))
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    fn url(&self) -> String {
        format!("file://{}", self.root.display())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, data).await?;
        tracing::trace!(path = %path.display(), "Object written");
        Ok(())
    }

    /// Exclusive create through `O_EXCL`
    async fn put_new(&self, key: &str, data: Vec<u8>) -> Result<bool> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let path = self.path(key);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Hosted state service reached over HTTPS with a bearer token
pub struct HttpObjectStore {
    base_url: String,
    token: String,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }

    fn object_url(&self, key: &str) -> String {
        format!("{}/api/state/{}", self.base_url, key)
    }

    async fn check(response: reqwest::Response, key: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ProvisionerError::State(format!(
            "state service returned {} for {}: {}",
            status, key, body
        )))
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    fn url(&self) -> String {
        self.base_url.clone()
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let response = self
            .client
            .get(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response, key).await?;
        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        let response = self
            .client
            .put(self.object_url(key))
            .bearer_auth(&self.token)
            .header("Content-Type", "application/json")
            .body(data)
            .send()
            .await?;
        Self::check(response, key).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let response = self
            .client
            .delete(self.object_url(key))
            .bearer_auth(&self.token)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::check(response, key).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_local_store_roundtrip() {
        let temp_dir = tempdir().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());

        assert!(store.get("stacks/acme/infra.json").await.unwrap().is_none());
        store
            .put("stacks/acme/infra.json", b"{}".to_vec())
            .await
            .unwrap();
        assert!(store.exists("stacks/acme/infra.json").await.unwrap());
        assert!(temp_dir.path().join("stacks/acme/infra.json").exists());

        store.delete("stacks/acme/infra.json").await.unwrap();
        store.delete("stacks/acme/infra.json").await.unwrap();
        assert!(!store.exists("stacks/acme/infra.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_local_store_put_new_is_exclusive() {
        let temp_dir = tempdir().unwrap();
        let store = LocalObjectStore::new(temp_dir.path());

        assert!(store.put_new("locks/acme/infra.json", b"first".to_vec()).await.unwrap());
        assert!(!store.put_new("locks/acme/infra.json", b"second".to_vec()).await.unwrap());
        assert_eq!(
            store.get("locks/acme/infra.json").await.unwrap(),
            Some(b"first".to_vec())
        );
    }

    #[test]
    fn test_local_store_from_url() {
        let store = LocalObjectStore::from_url("file:///var/lib/sc");
        assert_eq!(store.url(), "file:///var/lib/sc");
        assert_eq!(store.path("../etc/passwd"), PathBuf::from("/var/lib/sc/etc/passwd"));
    }
}
