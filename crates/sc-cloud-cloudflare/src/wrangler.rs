//! wrangler CLI wrapper
//!
//! R2 bucket management. wrangler authenticates through the
//! `CLOUDFLARE_API_TOKEN` and `CLOUDFLARE_ACCOUNT_ID` variables.

use crate::error::{CloudflareError, Result};
use sc_api::CloudflareCredentials;
use sc_provisioner::SessionEnv;
use std::process::Stdio;
use tokio::process::Command;

pub fn is_not_found(err: &CloudflareError) -> bool {
    match err {
        CloudflareError::CommandFailed(stderr) => {
            stderr.contains("does not exist") || stderr.contains("not found")
        }
        _ => false,
    }
}

/// wrangler CLI wrapper
#[derive(Debug, Clone)]
pub struct Wrangler {
    account_id: String,
    env: SessionEnv,
}

impl Wrangler {
    pub fn new(credentials: &CloudflareCredentials, session_env: &SessionEnv) -> Self {
        let mut env = session_env.clone();
        if !credentials.api_token.is_empty() {
            env.set("CLOUDFLARE_API_TOKEN", credentials.api_token.as_str());
        }
        if !credentials.account_id.is_empty() {
            env.set("CLOUDFLARE_ACCOUNT_ID", credentials.account_id.as_str());
        }
        Self {
            account_id: credentials.account_id.clone(),
            env,
        }
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    /// S3-compatible endpoint of the account's R2 storage
    pub fn r2_endpoint(&self) -> String {
        format!("https://{}.r2.cloudflarestorage.com", self.account_id)
    }

    /// Check if wrangler is installed
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg("wrangler").output().await?;
        if !which.status.success() {
            return Err(CloudflareError::WranglerNotFound);
        }
        Ok(())
    }

    /// Run a wrangler command and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("wrangler");
        cmd.args(args);
        cmd.envs(self.env.iter());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: wrangler {}", args.join(" "));

        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CloudflareError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    // ========== R2 Bucket Operations ==========

    pub async fn create_r2_bucket(&self, name: &str, location: Option<&str>) -> Result<()> {
        let mut args = vec!["r2", "bucket", "create", name];
        if let Some(location) = location {
            args.extend(["--location", location]);
        }
        self.run_command(&args).await?;
        Ok(())
    }

    pub async fn r2_bucket_exists(&self, name: &str) -> Result<bool> {
        match self.run_command(&["r2", "bucket", "info", name]).await {
            Ok(_) => Ok(true),
            Err(e) if is_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_r2_bucket(&self, name: &str) -> Result<()> {
        match self.run_command(&["r2", "bucket", "delete", name]).await {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}
