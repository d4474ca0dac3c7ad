//! gcloud CLI wrapper
//!
//! Wraps the gcloud commands the provider needs. Credentials are handed to
//! gcloud through a key file referenced by
//! `CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE`, so the user's own gcloud login
//! is never touched.

use crate::error::{GcpError, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use sc_provisioner::SessionEnv;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

pub const ENV_CREDENTIAL_FILE: &str = "CLOUDSDK_AUTH_CREDENTIAL_FILE_OVERRIDE";
pub const ENV_CORE_PROJECT: &str = "CLOUDSDK_CORE_PROJECT";

/// Writes a service account key to a file named after its digest
pub fn credentials_file(credentials: &str) -> Result<PathBuf> {
    let digest = Sha256::digest(credentials.as_bytes());
    let name: String = digest[..8].iter().map(|b| format!("{:02x}", b)).collect();
    let path = std::env::temp_dir().join(format!("sc-gcp-{}.json", name));
    if !path.exists() {
        std::fs::write(&path, credentials)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o600))?;
        }
    }
    Ok(path)
}

/// Whether a failed gcloud call reported a missing resource
pub fn is_not_found(err: &GcpError) -> bool {
    match err {
        GcpError::CommandFailed(stderr) => {
            let stderr = stderr.to_lowercase();
            stderr.contains("not_found")
                || stderr.contains("not found")
                || stderr.contains("404")
                || stderr.contains("does not exist")
        }
        _ => false,
    }
}

/// Cloud Run service to deploy
#[derive(Debug, Clone, Default)]
pub struct ServiceSpec {
    pub name: String,
    pub region: String,
    pub image: String,
    pub port: Option<u16>,
    pub env: BTreeMap<String, String>,
    pub cpu: Option<String>,
    pub memory: Option<String>,
    pub min_instances: Option<u32>,
    pub max_instances: Option<u32>,
}

/// gcloud CLI wrapper bound to one project
#[derive(Debug, Clone)]
pub struct Gcloud {
    project: String,
    env: SessionEnv,
}

impl Gcloud {
    /// Binds gcloud to `project`, authenticating with `credentials` when given
    pub fn new(project: impl Into<String>, credentials: &str, session_env: &SessionEnv) -> Result<Self> {
        let project = project.into();
        let mut env = session_env.clone();
        if !credentials.is_empty() {
            let path = credentials_file(credentials)?;
            env.set(ENV_CREDENTIAL_FILE, path.display().to_string());
        }
        env.set(ENV_CORE_PROJECT, project.as_str());
        Ok(Self { project, env })
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Check if gcloud is installed and has an active account
    pub async fn check_auth(&self) -> Result<Option<String>> {
        let which = Command::new("which").arg("gcloud").output().await?;
        if !which.status.success() {
            return Err(GcpError::GcloudNotFound);
        }
        let output = self
            .run_command(&["auth", "list", "--filter=status:ACTIVE", "--format=value(account)"])
            .await?;
        let account = output.trim();
        Ok((!account.is_empty()).then(|| account.to_string()))
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("gcloud");
        cmd.args(args);
        cmd.arg("--project").arg(&self.project);
        cmd.arg("--quiet");
        cmd.envs(self.env.iter());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Run a gcloud command and return stdout
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        tracing::debug!("Running: gcloud {}", args.join(" "));
        let output = self.command(args).output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GcpError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    /// Run a gcloud command feeding `input` on stdin; returns raw stdout
    pub async fn run_with_input(&self, args: &[&str], input: &[u8]) -> Result<Vec<u8>> {
        tracing::debug!("Running: gcloud {} (with stdin)", args.join(" "));
        let mut cmd = self.command(args);
        cmd.stdin(Stdio::piped());
        let mut child = cmd.spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GcpError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    async fn run_json(&self, args: &[&str]) -> Result<Value> {
        let mut args = args.to_vec();
        args.push("--format=json");
        let output = self.run_command(&args).await?;
        if output.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&output)?)
    }

    /// Describes a resource; `None` when gcloud reports it missing
    async fn describe(&self, args: &[&str]) -> Result<Option<Value>> {
        match self.run_json(args).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ========== Cloud Storage ==========

    pub async fn create_bucket(
        &self,
        name: &str,
        location: Option<&str>,
        storage_class: Option<&str>,
    ) -> Result<()> {
        let url = format!("gs://{}", name);
        let mut args = vec!["storage", "buckets", "create", url.as_str(), "--uniform-bucket-level-access"];
        let location_arg = location.map(|l| format!("--location={}", l));
        if let Some(ref arg) = location_arg {
            args.push(arg.as_str());
        }
        let class_arg = storage_class.map(|c| format!("--default-storage-class={}", c));
        if let Some(ref arg) = class_arg {
            args.push(arg.as_str());
        }
        self.run_command(&args).await?;
        Ok(())
    }

    pub async fn describe_bucket(&self, name: &str) -> Result<Option<Value>> {
        let url = format!("gs://{}", name);
        self.describe(&["storage", "buckets", "describe", url.as_str()])
            .await
    }

    pub async fn update_bucket_class(&self, name: &str, storage_class: &str) -> Result<()> {
        let url = format!("gs://{}", name);
        let class_arg = format!("--default-storage-class={}", storage_class);
        self.run_command(&["storage", "buckets", "update", url.as_str(), class_arg.as_str()])
            .await?;
        Ok(())
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        let url = format!("gs://{}", name);
        match self
            .run_command(&["storage", "rm", "--recursive", url.as_str()])
            .await
        {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    /// Reads an object; `None` when absent
    pub async fn read_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("gs://{}/{}", bucket, key);
        tracing::debug!("Running: gcloud storage cat {}", url);
        let output = self.command(&["storage", "cat", url.as_str()]).output().await?;
        if output.status.success() {
            return Ok(Some(output.stdout));
        }
        let err = GcpError::CommandFailed(String::from_utf8_lossy(&output.stderr).trim().to_string());
        if is_not_found(&err) { Ok(None) } else { Err(err) }
    }

    pub async fn write_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let url = format!("gs://{}/{}", bucket, key);
        self.run_with_input(&["storage", "cp", "-", url.as_str()], data)
            .await?;
        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let url = format!("gs://{}/{}", bucket, key);
        match self.run_command(&["storage", "rm", url.as_str()]).await {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    // ========== GKE ==========

    pub async fn create_autopilot_cluster(
        &self,
        name: &str,
        location: &str,
        min_version: Option<&str>,
    ) -> Result<Value> {
        let region_arg = format!("--region={}", location);
        let mut args = vec!["container", "clusters", "create-auto", name, region_arg.as_str()];
        let version_arg = min_version.map(|v| format!("--cluster-version={}", v));
        if let Some(ref arg) = version_arg {
            args.push(arg.as_str());
        }
        self.run_json(&args).await
    }

    pub async fn describe_cluster(&self, name: &str, location: &str) -> Result<Option<Value>> {
        let region_arg = format!("--region={}", location);
        self.describe(&["container", "clusters", "describe", name, region_arg.as_str()])
            .await
    }

    pub async fn delete_cluster(&self, name: &str, location: &str) -> Result<()> {
        let region_arg = format!("--region={}", location);
        match self
            .run_command(&["container", "clusters", "delete", name, region_arg.as_str()])
            .await
        {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    // ========== Artifact Registry ==========

    pub async fn create_repository(&self, name: &str, location: &str, format: &str) -> Result<()> {
        let location_arg = format!("--location={}", location);
        let format_arg = format!("--repository-format={}", format);
        self.run_command(&[
            "artifacts",
            "repositories",
            "create",
            name,
            location_arg.as_str(),
            format_arg.as_str(),
        ])
        .await?;
        Ok(())
    }

    pub async fn describe_repository(&self, name: &str, location: &str) -> Result<Option<Value>> {
        let location_arg = format!("--location={}", location);
        self.describe(&["artifacts", "repositories", "describe", name, location_arg.as_str()])
            .await
    }

    pub async fn delete_repository(&self, name: &str, location: &str) -> Result<()> {
        let location_arg = format!("--location={}", location);
        match self
            .run_command(&["artifacts", "repositories", "delete", name, location_arg.as_str()])
            .await
        {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    // ========== Cloud KMS ==========

    /// Creates the key ring unless it exists, then the key
    pub async fn create_crypto_key(&self, key_ring: &str, name: &str, location: &str) -> Result<()> {
        let location_arg = format!("--location={}", location);
        match self
            .run_command(&["kms", "keyrings", "create", key_ring, location_arg.as_str()])
            .await
        {
            Err(GcpError::CommandFailed(stderr)) if stderr.contains("ALREADY_EXISTS") => {
                tracing::debug!("Key ring {} already exists", key_ring);
            }
            other => {
                other?;
            }
        }
        let keyring_arg = format!("--keyring={}", key_ring);
        self.run_command(&[
            "kms",
            "keys",
            "create",
            name,
            keyring_arg.as_str(),
            location_arg.as_str(),
            "--purpose=encryption",
        ])
        .await?;
        Ok(())
    }

    pub async fn describe_crypto_key(
        &self,
        key_ring: &str,
        name: &str,
        location: &str,
    ) -> Result<Option<Value>> {
        let keyring_arg = format!("--keyring={}", key_ring);
        let location_arg = format!("--location={}", location);
        self.describe(&[
            "kms",
            "keys",
            "describe",
            name,
            keyring_arg.as_str(),
            location_arg.as_str(),
        ])
        .await
    }

    pub async fn kms_encrypt(
        &self,
        key_ring: &str,
        name: &str,
        location: &str,
        plaintext: &[u8],
    ) -> Result<Vec<u8>> {
        self.kms("encrypt", key_ring, name, location, plaintext).await
    }

    pub async fn kms_decrypt(
        &self,
        key_ring: &str,
        name: &str,
        location: &str,
        ciphertext: &[u8],
    ) -> Result<Vec<u8>> {
        self.kms("decrypt", key_ring, name, location, ciphertext)
            .await
    }

    async fn kms(
        &self,
        operation: &str,
        key_ring: &str,
        name: &str,
        location: &str,
        input: &[u8],
    ) -> Result<Vec<u8>> {
        let key_arg = format!("--key={}", name);
        let keyring_arg = format!("--keyring={}", key_ring);
        let location_arg = format!("--location={}", location);
        let (input_flag, output_flag) = if operation == "encrypt" {
            ("--plaintext-file=-", "--ciphertext-file=-")
        } else {
            ("--ciphertext-file=-", "--plaintext-file=-")
        };
        self.run_with_input(
            &[
                "kms",
                operation,
                key_arg.as_str(),
                keyring_arg.as_str(),
                location_arg.as_str(),
                input_flag,
                output_flag,
            ],
            input,
        )
        .await
    }

    // ========== Cloud Run ==========

    /// Deploys (or redeploys) a service and returns its description
    pub async fn deploy_service(&self, spec: &ServiceSpec) -> Result<Value> {
        let image_arg = format!("--image={}", spec.image);
        let region_arg = format!("--region={}", spec.region);
        let mut args: Vec<String> = vec![
            "run".to_string(),
            "deploy".to_string(),
            spec.name.clone(),
            image_arg,
            region_arg,
            "--allow-unauthenticated".to_string(),
        ];
        if let Some(port) = spec.port {
            args.push(format!("--port={}", port));
        }
        if !spec.env.is_empty() {
            let vars: Vec<String> = spec.env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            // gcloud's alternate delimiter syntax: values may contain commas
            args.push(format!("--set-env-vars=^@^{}", vars.join("@")));
        }
        if let Some(ref cpu) = spec.cpu {
            args.push(format!("--cpu={}", cpu));
        }
        if let Some(ref memory) = spec.memory {
            args.push(format!("--memory={}", memory));
        }
        if let Some(min) = spec.min_instances {
            args.push(format!("--min-instances={}", min));
        }
        if let Some(max) = spec.max_instances {
            args.push(format!("--max-instances={}", max));
        }
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_command(&args).await?;

        self.describe_service(&spec.name, &spec.region)
            .await?
            .ok_or_else(|| GcpError::CommandFailed(format!("service {} vanished after deploy", spec.name)))
    }

    pub async fn describe_service(&self, name: &str, region: &str) -> Result<Option<Value>> {
        let region_arg = format!("--region={}", region);
        self.describe(&["run", "services", "describe", name, region_arg.as_str()])
            .await
    }

    pub async fn delete_service(&self, name: &str, region: &str) -> Result<()> {
        let region_arg = format!("--region={}", region);
        match self
            .run_command(&["run", "services", "delete", name, region_arg.as_str()])
            .await
        {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    pub async fn create_domain_mapping(&self, service: &str, domain: &str, region: &str) -> Result<()> {
        let service_arg = format!("--service={}", service);
        let domain_arg = format!("--domain={}", domain);
        let region_arg = format!("--region={}", region);
        self.run_command(&[
            "beta",
            "run",
            "domain-mappings",
            "create",
            service_arg.as_str(),
            domain_arg.as_str(),
            region_arg.as_str(),
        ])
        .await?;
        Ok(())
    }

    pub async fn describe_domain_mapping(&self, domain: &str, region: &str) -> Result<Option<Value>> {
        let region_arg = format!("--region={}", region);
        let domain_arg = format!("--domain={}", domain);
        self.describe(&[
            "beta",
            "run",
            "domain-mappings",
            "describe",
            domain_arg.as_str(),
            region_arg.as_str(),
        ])
        .await
    }

    pub async fn delete_domain_mapping(&self, domain: &str, region: &str) -> Result<()> {
        let region_arg = format!("--region={}", region);
        let domain_arg = format!("--domain={}", domain);
        match self
            .run_command(&[
                "beta",
                "run",
                "domain-mappings",
                "delete",
                domain_arg.as_str(),
                region_arg.as_str(),
            ])
            .await
        {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }
}
