//! atlas CLI wrapper

use crate::error::{MongodbError, Result};
use sc_api::MongodbCredentials;
use sc_provisioner::SessionEnv;
use serde_json::Value;
use std::process::Stdio;
use tokio::process::Command;

pub fn is_not_found(err: &MongodbError) -> bool {
    match err {
        MongodbError::CommandFailed(stderr) => {
            stderr.contains("NOT_FOUND")
                || stderr.contains("not found")
                || stderr.contains("404")
        }
        _ => false,
    }
}

/// Atlas region name of a cloud region, `eu-west-1` becomes `EU_WEST_1`
pub fn atlas_region(region: &str) -> String {
    region.trim().replace('-', "_").to_uppercase()
}

/// Command line for logs with the value of `--password` masked
fn redacted(args: &[&str]) -> String {
    let mut masked = Vec::with_capacity(args.len());
    let mut hide_next = false;
    for arg in args {
        masked.push(if hide_next { "****" } else { *arg });
        hide_next = *arg == "--password";
    }
    masked.join(" ")
}

/// Cluster creation parameters
#[derive(Debug, Clone)]
pub struct ClusterSpec<'a> {
    pub project_id: &'a str,
    pub name: &'a str,
    pub provider: &'a str,
    pub region: &'a str,
    pub tier: &'a str,
}

/// atlas CLI wrapper bound to one organization
#[derive(Debug, Clone)]
pub struct Atlas {
    org_id: String,
    env: SessionEnv,
}

impl Atlas {
    pub fn new(credentials: &MongodbCredentials, session_env: &SessionEnv) -> Result<Self> {
        if credentials.org_id.is_empty() {
            return Err(MongodbError::InvalidConfig(
                "orgId is required for MongoDB Atlas".to_string(),
            ));
        }
        let mut env = session_env.clone();
        env.set("MONGODB_ATLAS_ORG_ID", credentials.org_id.as_str());
        if !credentials.public_key.is_empty() {
            env.set("MONGODB_ATLAS_PUBLIC_API_KEY", credentials.public_key.as_str());
        }
        if !credentials.private_key.is_empty() {
            env.set("MONGODB_ATLAS_PRIVATE_API_KEY", credentials.private_key.as_str());
        }
        Ok(Self {
            org_id: credentials.org_id.clone(),
            env,
        })
    }

    pub fn org_id(&self) -> &str {
        &self.org_id
    }

    /// Check if atlas is installed and the keys can read the organization
    pub async fn check_auth(&self) -> Result<String> {
        let which = Command::new("which").arg("atlas").output().await?;
        if !which.status.success() {
            return Err(MongodbError::AtlasNotFound);
        }
        let org = self
            .run_json(&["organizations", "describe", self.org_id.as_str()])
            .await?;
        Ok(org
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(self.org_id.as_str())
            .to_string())
    }

    /// Run an atlas command and return stdout
    pub async fn run_command(&self, args: &[&str]) -> Result<String> {
        tracing::debug!("Running: atlas {}", redacted(args));
        let mut cmd = Command::new("atlas");
        cmd.args(args);
        cmd.envs(self.env.iter());
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        let output = cmd.output().await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MongodbError::CommandFailed(stderr.trim().to_string()));
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    pub async fn run_json(&self, args: &[&str]) -> Result<Value> {
        let mut args = args.to_vec();
        args.extend(["--output", "json"]);
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

    // ========== Projects ==========

    /// Find a project of the organization by name
    pub async fn find_project(&self, name: &str) -> Result<Option<Value>> {
        let projects = self
            .run_json(&["projects", "list", "--orgId", self.org_id.as_str()])
            .await?;
        let results = projects
            .get("results")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(results
            .into_iter()
            .find(|p| p.get("name").and_then(Value::as_str) == Some(name)))
    }

    pub async fn create_project(&self, name: &str) -> Result<Value> {
        self.run_json(&["projects", "create", name, "--orgId", self.org_id.as_str()])
            .await
    }

    pub async fn delete_project(&self, project_id: &str) -> Result<()> {
        self.delete(&["projects", "delete", project_id, "--force"])
            .await
    }

    // ========== Clusters ==========

    pub async fn create_cluster(&self, spec: &ClusterSpec<'_>) -> Result<()> {
        let region = atlas_region(spec.region);
        self.run_json(&[
            "clusters",
            "create",
            spec.name,
            "--projectId",
            spec.project_id,
            "--provider",
            spec.provider,
            "--region",
            region.as_str(),
            "--tier",
            spec.tier,
        ])
        .await?;
        self.run_command(&[
            "clusters",
            "watch",
            spec.name,
            "--projectId",
            spec.project_id,
        ])
        .await?;
        Ok(())
    }

    pub async fn update_cluster_tier(&self, project_id: &str, name: &str, tier: &str) -> Result<()> {
        self.run_json(&[
            "clusters",
            "update",
            name,
            "--projectId",
            project_id,
            "--tier",
            tier,
        ])
        .await?;
        Ok(())
    }

    pub async fn describe_cluster(&self, project_id: &str, name: &str) -> Result<Option<Value>> {
        self.describe(&["clusters", "describe", name, "--projectId", project_id])
            .await
    }

    pub async fn delete_cluster(&self, project_id: &str, name: &str) -> Result<()> {
        self.delete(&[
            "clusters",
            "delete",
            name,
            "--projectId",
            project_id,
            "--force",
        ])
        .await
    }

    // ========== Database users ==========

    pub async fn create_database_user(
        &self,
        project_id: &str,
        username: &str,
        password: &str,
        role: &str,
    ) -> Result<()> {
        self.run_json(&[
            "dbusers",
            "create",
            "--username",
            username,
            "--password",
            password,
            "--role",
            role,
            "--projectId",
            project_id,
        ])
        .await?;
        Ok(())
    }

    pub async fn describe_database_user(&self, project_id: &str, username: &str) -> Result<Option<Value>> {
        self.describe(&["dbusers", "describe", username, "--projectId", project_id])
            .await
    }

    pub async fn delete_database_user(&self, project_id: &str, username: &str) -> Result<()> {
        self.delete(&[
            "dbusers",
            "delete",
            username,
            "--projectId",
            project_id,
            "--force",
        ])
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atlas_region() {
        assert_eq!(atlas_region("eu-west-1"), "EU_WEST_1");
        assert_eq!(atlas_region("US_EAST_1"), "US_EAST_1");
    }

    #[test]
    fn test_redacted_hides_password() {
        let line = redacted(&["dbusers", "create", "--password", "s3cret", "--role", "readWrite"]);
        assert_eq!(line, "dbusers create --password **** --role readWrite");
    }

    #[test]
    fn test_requires_org() {
        assert!(matches!(
            Atlas::new(&MongodbCredentials::default(), &SessionEnv::new()),
            Err(MongodbError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_env_carries_keys() {
        let atlas = Atlas::new(
            &MongodbCredentials {
                org_id: "5f1a".to_string(),
                public_key: "pub".to_string(),
                private_key: "priv".to_string(),
            },
            &SessionEnv::new(),
        )
        .unwrap();
        assert_eq!(atlas.env.get("MONGODB_ATLAS_PRIVATE_API_KEY"), Some("priv"));
        assert_eq!(atlas.org_id(), "5f1a");
    }
}
