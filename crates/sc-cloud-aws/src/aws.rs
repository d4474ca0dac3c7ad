//! aws CLI wrapper
//!
//! Credentials and region are handed to every call through the standard
//! `AWS_*` variables of the child process.

use crate::error::{AwsError, Result};
use sc_api::AwsCredentials;
use sc_provisioner::SessionEnv;
use serde_json::{Value, json};
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Whether a failed aws call reported a missing resource
pub fn is_not_found(err: &AwsError) -> bool {
    match err {
        AwsError::CommandFailed(stderr) => {
            stderr.contains("NotFound")
                || stderr.contains("NoSuchBucket")
                || stderr.contains("NoSuchKey")
                || stderr.contains("(404)")
                || stderr.contains("does not exist")
        }
        _ => false,
    }
}

fn ignore_not_found(result: Result<Value>) -> Result<()> {
    match result {
        Err(e) if is_not_found(&e) => Ok(()),
        other => other.map(|_| ()),
    }
}

/// aws CLI wrapper bound to one account and region
#[derive(Debug, Clone)]
pub struct Aws {
    region: String,
    env: SessionEnv,
}

impl Aws {
    pub fn new(credentials: &AwsCredentials, session_env: &SessionEnv) -> Self {
        let mut env = session_env.clone();
        if !credentials.access_key.is_empty() {
            env.set("AWS_ACCESS_KEY_ID", credentials.access_key.as_str());
            env.set("AWS_SECRET_ACCESS_KEY", credentials.secret_access_key.as_str());
        }
        env.set("AWS_REGION", credentials.region.as_str());
        env.set("AWS_DEFAULT_REGION", credentials.region.as_str());
        Self {
            region: credentials.region.clone(),
            env,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Check if the aws CLI is installed and return the caller ARN
    pub async fn check_auth(&self) -> Result<String> {
        let which = Command::new("which").arg("aws").output().await?;
        if !which.status.success() {
            return Err(AwsError::AwsCliNotFound);
        }
        let identity = self.run_json(&["sts", "get-caller-identity"]).await?;
        identity
            .get("Arn")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| AwsError::UnexpectedResponse("caller identity without Arn".to_string()))
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("aws");
        cmd.args(args);
        cmd.arg("--region").arg(&self.region);
        cmd.envs(self.env.iter());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd
    }

    /// Run an aws command and return raw stdout
    pub async fn run_command(&self, args: &[&str], input: Option<&[u8]>) -> Result<Vec<u8>> {
        tracing::debug!("Running: aws {}", args.join(" "));
        let mut cmd = self.command(args);
        cmd.stdin(if input.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        let mut child = cmd.spawn()?;
        if let (Some(input), Some(mut stdin)) = (input, child.stdin.take()) {
            stdin.write_all(input).await?;
        }
        let output = child.wait_with_output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(output.stdout)
    }

    /// Run an aws command with JSON output
    pub async fn run_json(&self, args: &[&str]) -> Result<Value> {
        let mut args = args.to_vec();
        args.extend(["--output", "json"]);
        let stdout = self.run_command(&args, None).await?;
        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&stdout)?)
    }

    /// Run an aws command whose request body is passed as `--cli-input-json`
    pub async fn run_with_body(&self, args: &[&str], body: &Value) -> Result<Value> {
        let body = body.to_string();
        let mut args = args.to_vec();
        args.extend(["--cli-input-json", body.as_str()]);
        self.run_json(&args).await
    }

    async fn describe(&self, args: &[&str]) -> Result<Option<Value>> {
        match self.run_json(args).await {
            Ok(value) => Ok(Some(value)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ========== S3 ==========

    pub async fn create_bucket(&self, name: &str) -> Result<()> {
        let constraint = format!("LocationConstraint={}", self.region);
        let mut args = vec!["s3api", "create-bucket", "--bucket", name];
        // us-east-1 rejects an explicit location constraint
        if self.region != "us-east-1" {
            args.extend(["--create-bucket-configuration", constraint.as_str()]);
        }
        self.run_json(&args).await?;
        Ok(())
    }

    pub async fn bucket_exists(&self, name: &str) -> Result<bool> {
        Ok(self
            .describe(&["s3api", "head-bucket", "--bucket", name])
            .await?
            .is_some())
    }

    pub async fn set_bucket_versioning(&self, name: &str, enabled: bool) -> Result<()> {
        let status = if enabled { "Status=Enabled" } else { "Status=Suspended" };
        self.run_json(&[
            "s3api",
            "put-bucket-versioning",
            "--bucket",
            name,
            "--versioning-configuration",
            status,
        ])
        .await?;
        Ok(())
    }

    /// Denies every request made without TLS
    pub async fn require_https(&self, name: &str) -> Result<()> {
        let policy = json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "AllowSSLRequestsOnly",
                "Effect": "Deny",
                "Principal": "*",
                "Action": "s3:*",
                "Resource": [
                    format!("arn:aws:s3:::{}", name),
                    format!("arn:aws:s3:::{}/*", name),
                ],
                "Condition": {"Bool": {"aws:SecureTransport": "false"}},
            }],
        })
        .to_string();
        self.run_json(&[
            "s3api",
            "put-bucket-policy",
            "--bucket",
            name,
            "--policy",
            policy.as_str(),
        ])
        .await?;
        Ok(())
    }

    pub async fn delete_bucket(&self, name: &str) -> Result<()> {
        let url = format!("s3://{}", name);
        match self.run_command(&["s3", "rb", url.as_str(), "--force"], None).await {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    pub async fn read_object(&self, bucket: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("s3://{}/{}", bucket, key);
        match self.run_command(&["s3", "cp", url.as_str(), "-"], None).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn write_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<()> {
        let url = format!("s3://{}/{}", bucket, key);
        self.run_command(&["s3", "cp", "-", url.as_str()], Some(data))
            .await?;
        Ok(())
    }

    pub async fn delete_object(&self, bucket: &str, key: &str) -> Result<()> {
        let url = format!("s3://{}/{}", bucket, key);
        match self.run_command(&["s3", "rm", url.as_str()], None).await {
            Err(e) if is_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    // ========== KMS ==========

    /// Creates a symmetric key reachable through `alias/{alias}`; returns its ARN
    pub async fn create_key(&self, alias: &str) -> Result<String> {
        let description = format!("simple-container secrets key {}", alias);
        let key = self
            .run_json(&["kms", "create-key", "--description", description.as_str()])
            .await?;
        let arn = key
            .pointer("/KeyMetadata/Arn")
            .and_then(Value::as_str)
            .ok_or_else(|| AwsError::UnexpectedResponse("create-key without Arn".to_string()))?
            .to_string();
        let alias_name = format!("alias/{}", alias);
        self.run_json(&[
            "kms",
            "create-alias",
            "--alias-name",
            alias_name.as_str(),
            "--target-key-id",
            arn.as_str(),
        ])
        .await?;
        Ok(arn)
    }

    pub async fn describe_key(&self, alias: &str) -> Result<Option<Value>> {
        let key_id = format!("alias/{}", alias);
        self.describe(&["kms", "describe-key", "--key-id", key_id.as_str()])
            .await
    }

    pub async fn schedule_key_deletion(&self, alias: &str) -> Result<()> {
        let key_id = format!("alias/{}", alias);
        let Some(key) = self.describe_key(alias).await? else {
            return Ok(());
        };
        let arn = key
            .pointer("/KeyMetadata/Arn")
            .and_then(Value::as_str)
            .unwrap_or(key_id.as_str())
            .to_string();
        ignore_not_found(
            self.run_json(&["kms", "delete-alias", "--alias-name", key_id.as_str()])
                .await,
        )?;
        ignore_not_found(
            self.run_json(&[
                "kms",
                "schedule-key-deletion",
                "--key-id",
                arn.as_str(),
                "--pending-window-in-days",
                "7",
            ])
            .await,
        )
    }

    /// Encrypts stdin; returns the base64 ciphertext blob
    pub async fn kms_encrypt(&self, alias: &str, plaintext: &[u8]) -> Result<String> {
        let key_id = format!("alias/{}", alias);
        let stdout = self
            .run_command(
                &[
                    "kms",
                    "encrypt",
                    "--key-id",
                    key_id.as_str(),
                    "--plaintext",
                    "fileb:///dev/stdin",
                    "--query",
                    "CiphertextBlob",
                    "--output",
                    "text",
                ],
                Some(plaintext),
            )
            .await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    /// Decrypts raw ciphertext; returns the base64 plaintext
    pub async fn kms_decrypt(&self, ciphertext: &[u8]) -> Result<String> {
        let stdout = self
            .run_command(
                &[
                    "kms",
                    "decrypt",
                    "--ciphertext-blob",
                    "fileb:///dev/stdin",
                    "--query",
                    "Plaintext",
                    "--output",
                    "text",
                ],
                Some(ciphertext),
            )
            .await?;
        Ok(String::from_utf8_lossy(&stdout).trim().to_string())
    }

    // ========== ECS ==========

    pub async fn create_cluster(&self, name: &str) -> Result<Value> {
        self.run_json(&["ecs", "create-cluster", "--cluster-name", name])
            .await
    }

    pub async fn describe_cluster(&self, name: &str) -> Result<Option<Value>> {
        let found = self
            .run_json(&["ecs", "describe-clusters", "--clusters", name])
            .await?;
        Ok(active(&found, "/clusters"))
    }

    pub async fn delete_cluster(&self, name: &str) -> Result<()> {
        ignore_not_found(
            self.run_json(&["ecs", "delete-cluster", "--cluster", name])
                .await,
        )
    }

    /// Registers a task definition revision; returns its ARN
    pub async fn register_task_definition(&self, body: &Value) -> Result<String> {
        let registered = self
            .run_with_body(&["ecs", "register-task-definition"], body)
            .await?;
        registered
            .pointer("/taskDefinition/taskDefinitionArn")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| {
                AwsError::UnexpectedResponse("task definition without ARN".to_string())
            })
    }

    pub async fn deregister_task_definition(&self, arn: &str) -> Result<()> {
        ignore_not_found(
            self.run_json(&["ecs", "deregister-task-definition", "--task-definition", arn])
                .await,
        )
    }

    pub async fn create_service(&self, body: &Value) -> Result<Value> {
        self.run_with_body(&["ecs", "create-service"], body).await
    }

    pub async fn update_service(&self, body: &Value) -> Result<Value> {
        self.run_with_body(&["ecs", "update-service"], body).await
    }

    pub async fn describe_service(&self, cluster: &str, name: &str) -> Result<Option<Value>> {
        let found = self
            .run_json(&["ecs", "describe-services", "--cluster", cluster, "--services", name])
            .await;
        match found {
            Ok(found) => Ok(active(&found, "/services")),
            Err(e) if is_not_found(&e) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn delete_service(&self, cluster: &str, name: &str) -> Result<()> {
        ignore_not_found(
            self.run_json(&[
                "ecs",
                "delete-service",
                "--cluster",
                cluster,
                "--service",
                name,
                "--force",
            ])
            .await,
        )
    }

    // ========== Lambda ==========

    pub async fn create_function(&self, body: &Value) -> Result<Value> {
        self.run_with_body(&["lambda", "create-function"], body)
            .await
    }

    pub async fn update_function(&self, name: &str, image: &str, configuration: &Value) -> Result<()> {
        let image_arg = format!("--image-uri={}", image);
        self.run_json(&[
            "lambda",
            "update-function-code",
            "--function-name",
            name,
            image_arg.as_str(),
        ])
        .await?;
        self.run_command(&["lambda", "wait", "function-updated", "--function-name", name], None)
            .await?;
        self.run_with_body(&["lambda", "update-function-configuration"], configuration)
            .await?;
        Ok(())
    }

    pub async fn get_function(&self, name: &str) -> Result<Option<Value>> {
        self.describe(&["lambda", "get-function", "--function-name", name])
            .await
    }

    pub async fn delete_function(&self, name: &str) -> Result<()> {
        ignore_not_found(
            self.run_json(&["lambda", "delete-function", "--function-name", name])
                .await,
        )
    }

    /// Public function URL, created on first use
    pub async fn function_url(&self, name: &str) -> Result<String> {
        let existing = self
            .describe(&["lambda", "get-function-url-config", "--function-name", name])
            .await?;
        let config = match existing {
            Some(config) => config,
            None => {
                self.run_json(&[
                    "lambda",
                    "create-function-url-config",
                    "--function-name",
                    name,
                    "--auth-type",
                    "NONE",
                ])
                .await?
            }
        };
        Ok(config
            .get("FunctionUrl")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string())
    }
}

/// First entry of a describe list whose status is not INACTIVE
fn active(found: &Value, pointer: &str) -> Option<Value> {
    found
        .pointer(pointer)
        .and_then(Value::as_array)
        .and_then(|items| items.first())
        .filter(|item| item.get("status").and_then(Value::as_str) != Some("INACTIVE"))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_credentials_and_region() {
        let aws = Aws::new(
            &AwsCredentials {
                account: "123456789012".to_string(),
                access_key: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                region: "eu-central-1".to_string(),
            },
            &SessionEnv::new(),
        );
        assert_eq!(aws.region(), "eu-central-1");
        assert_eq!(aws.env.get("AWS_ACCESS_KEY_ID"), Some("AKIA"));
        assert_eq!(aws.env.get("AWS_DEFAULT_REGION"), Some("eu-central-1"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(is_not_found(&AwsError::CommandFailed(
            "An error occurred (404) when calling the HeadBucket operation: Not Found".to_string()
        )));
        assert!(is_not_found(&AwsError::CommandFailed(
            "An error occurred (ResourceNotFoundException) when calling GetFunction".to_string()
        )));
        assert!(!is_not_found(&AwsError::CommandFailed("AccessDenied".to_string())));
    }

    #[test]
    fn test_active_skips_inactive_entries() {
        let found = json!({"services": [{"serviceName": "web", "status": "INACTIVE"}]});
        assert!(active(&found, "/services").is_none());
        let found = json!({"services": [{"serviceName": "web", "status": "ACTIVE"}]});
        assert_eq!(active(&found, "/services").unwrap()["serviceName"], "web");
        assert!(active(&json!({}), "/services").is_none());
    }
}
