//! yc CLI wrapper

use crate::error::{Result, YandexError};
use sc_api::YandexCredentials;
use sc_provisioner::SessionEnv;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

pub const ENV_KEY_FILE: &str = "YC_SERVICE_ACCOUNT_KEY_FILE";

/// Writes an authorized key to a file named after its digest
fn key_file(key: &str) -> Result<PathBuf> {
    let digest = Sha256::digest(key.as_bytes());
    let name: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    let path = std::env::temp_dir().join(format!("sc-yc-{}.json", name));
    if !path.exists() {
        std::fs::write(&path, key)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(path)
}

pub fn is_not_found(err: &YandexError) -> bool {
    match err {
        YandexError::CommandFailed(stderr) => {
            stderr.contains("NotFound") || stderr.contains("not found")
        }
        _ => false,
    }
}

/// Revision of a serverless container
#[derive(Debug, Clone, Default)]
pub struct RevisionSpec {
    pub container: String,
    pub image: String,
    pub service_account_id: String,
    pub env: BTreeMap<String, String>,
    pub memory: Option<String>,
    pub cores: Option<String>,
    pub concurrency: Option<u32>,
}

/// yc CLI wrapper bound to one folder
#[derive(Debug, Clone)]
pub struct Yc {
    cloud_id: String,
    folder_id: String,
    env: SessionEnv,
}

impl Yc {
    pub fn new(credentials: &YandexCredentials, session_env: &SessionEnv) -> Result<Self> {
        if credentials.folder_id.is_empty() {
            return Err(YandexError::InvalidConfig("folderId is required".to_string()));
        }
        let mut env = session_env.clone();
        if !credentials.service_account_key.is_empty() {
            let path = key_file(&credentials.service_account_key)?;
            env.set(ENV_KEY_FILE, path.display().to_string());
        }
        Ok(Self {
            cloud_id: credentials.cloud_id.clone(),
            folder_id: credentials.folder_id.clone(),
            env,
        })
    }

    pub fn folder_id(&self) -> &str {
        &self.folder_id
    }

    /// Check if yc is installed and return the active cloud
    pub async fn check_auth(&self) -> Result<String> {
        let which = Command::new("which").arg("yc").output().await?;
        if !which.status.success() {
            return Err(YandexError::YcNotFound);
        }
        self.run_json(&["resource-manager", "folder", "get", self.folder_id.as_str()])
            .await?;
        Ok(format!("folder {} in cloud {}", self.folder_id, self.cloud_id))
    }

    /// Run a yc command and return stdout
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        tracing::debug!("Running: yc {}", args.join(" "));
        let mut cmd = Command::new("yc");
        cmd.args(args);
        cmd.arg("--folder-id").arg(&self.folder_id);
        if !self.cloud_id.is_empty() {
            cmd.arg("--cloud-id").arg(&self.cloud_id);
        }
        cmd.arg("--no-user-output");
        cmd.envs(self.env.iter());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(YandexError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn run_json(&self, args: &[&str]) -> Result<Value> {
        let mut args = args.to_vec();
        args.extend(["--format", "json"]);
        let output = self.run_command(&args).await?;
        if output.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&output)?)
    }

    async fn describe(&self, args: &[&str]) -> Result<Option<Value>> {
        match self.run_json(args).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn delete(&self, args: &[&str]) -> Result<()> {
        match self.run_command(args).await {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    // ========== Object Storage ==========

    pub async fn create_bucket(&self, name: &str, max_size: Option<u64>, public_read: bool) -> Result<()> {
        let size = max_size.map(|s| s.to_string());
        let mut args = vec!["storage", "bucket", "create", "--name", name];
        if let Some(ref size) = size {
            args.extend(["--max-size", size.as_str()]);
        }
        if public_read {
            args.push("--public-read");
        }
        self.run_json(&args).await?;
        Ok(())
    }

    pub async fn update_bucket(&self, name: &str, max_size: Option<u64>, public_read: bool) -> Result<()> {
        let size = max_size.map(|s| s.to_string());
        let mut args = vec!["storage", "bucket", "update", "--name", name];
        if let Some(ref size) = size {
            args.extend(["--max-size", size.as_str()]);
        }
        args.push(if public_read { "--public-read" } else { "--public-read=false" });
        self.run_json(&args).await?;
        Ok(())
    }

    pub async fn get_bucket(&self, name: &str) -> Result<Option<Value>> {
        self.describe(&["storage", "bucket", "get", "--name", name])
            .await
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        self.delete(&["storage", "bucket", "delete", "--name", name])
            .await
    }

    // ========== Serverless Containers ==========

    pub async fn create_container(&self, name: &str) -> Result<Value> {
        self.run_json(&["serverless", "container", "create", "--name", name])
            .await
    }

    pub async fn get_container(&self, name: &str) -> Result<Option<Value>> {
        self.describe(&["serverless", "container", "get", "--name", name])
            .await
    }

    pub async fn allow_unauthenticated(&self, name: &str) -> Result<()> {
        self.run_command(&[
            "serverless",
            "container",
            "allow-unauthenticated-invoke",
            "--name",
            name,
        ])
        .await?;
        Ok(())
    }

    pub async fn deploy_revision(&self, spec: &RevisionSpec) -> Result<Value> {
        let mut args: Vec<String> = [
            "serverless",
            "container",
            "revision",
            "deploy",
            "--container-name",
            spec.container.as_str(),
            "--image",
            spec.image.as_str(),
            "--service-account-id",
            spec.service_account_id.as_str(),
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        for (name, value) in &spec.env {
            args.push("--environment".to_string());
            args.push(format!("{}={}", name, value));
        }
        if let Some(ref memory) = spec.memory {
            args.push(format!("--memory={}", memory));
        }
        if let Some(ref cores) = spec.cores {
            args.push(format!("--cores={}", cores));
        }
        if let Some(concurrency) = spec.concurrency {
            args.push(format!("--concurrency={}", concurrency));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_json(&args).await
    }

    pub async fn delete_container(&self, name: &str) -> Result<()> {
        self.delete(&["serverless", "container", "delete", "--name", name])
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_folder() {
        let err = Yc::new(&YandexCredentials::default(), &SessionEnv::new()).unwrap_err();
        assert!(matches!(err, YandexError::InvalidConfig(_)));
    }

    #[test]
    fn test_key_file_env() {
        let credentials = YandexCredentials {
            cloud_id: "b1g".to_string(),
            folder_id: "b1gfolder".to_string(),
            service_account_key: "{\"id\":\"aje\"}".to_string(),
        };
        let yc = Yc::new(&credentials, &SessionEnv::new()).unwrap();
        let path = yc.env.get(ENV_KEY_FILE).unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "{\"id\":\"aje\"}");
        assert_eq!(yc.folder_id(), "b1gfolder");
    }
}
