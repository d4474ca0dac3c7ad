//! MongoDB Atlas provider implementation

use crate::atlas::{Atlas, ClusterSpec};
use crate::error::{MongodbError, Result};
use async_trait::async_trait;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sc_api::MongodbCredentials;
use sc_provisioner::SessionEnv;
use sc_provisioner::engine::{AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest};
use serde::Deserialize;
use serde_json::Value;

pub const KIND_PROJECT: &str = "mongodbatlas:Project";
pub const KIND_CLUSTER: &str = "mongodbatlas:Cluster";
pub const KIND_DATABASE_USER: &str = "mongodbatlas:DatabaseUser";

const PASSWORD_LENGTH: usize = 24;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInputs {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInputs {
    pub project_id: String,
    pub name: String,
    pub provider: String,
    pub region: String,
    pub tier: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseUserInputs {
    pub project_id: String,
    pub username: String,
    pub database: String,
    pub role: String,
    pub connection_string: String,
}

fn decode<T: serde::de::DeserializeOwned>(request: &ResourceRequest) -> Result<T> {
    Ok(serde_json::from_value(request.inputs.clone())?)
}

fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LENGTH)
        .map(char::from)
        .collect()
}

/// Connection URI with credentials for `database` on an SRV connection string
pub fn connection_uri(connection_string: &str, username: &str, password: &str, database: &str) -> String {
    let (scheme, host) = connection_string
        .split_once("://")
        .unwrap_or(("mongodb+srv", connection_string));
    format!(
        "{}://{}:{}@{}/{}?retryWrites=true&w=majority",
        scheme,
        username,
        password,
        host.trim_end_matches('/'),
        database
    )
}

fn project_outputs(project: &Value, name: &str) -> Result<ResourceOutputs> {
    let id = project
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| MongodbError::UnexpectedResponse(format!("project {} has no id", name)))?;
    Ok(ResourceOutputs::new().with("id", id).with("name", name))
}

fn cluster_outputs(cluster: &Value, name: &str) -> ResourceOutputs {
    let connection_string = cluster
        .pointer("/connectionStrings/standardSrv")
        .cloned()
        .unwrap_or_default();
    ResourceOutputs::new()
        .with("name", name)
        .with("connectionString", connection_string)
        .with(
            "stateName",
            cluster.get("stateName").cloned().unwrap_or_default(),
        )
}

fn user_outputs(inputs: &DatabaseUserInputs, password: &str) -> ResourceOutputs {
    ResourceOutputs::new()
        .with("username", inputs.username.as_str())
        .with("database", inputs.database.as_str())
        .with_secret("password", password)
        .with_secret(
            "uri",
            connection_uri(
                &inputs.connection_string,
                &inputs.username,
                password,
                &inputs.database,
            ),
        )
}

/// MongoDB Atlas provider
pub struct MongodbProvider {
    atlas: Atlas,
}

impl MongodbProvider {
    pub fn new(credentials: &MongodbCredentials, session_env: &SessionEnv) -> Result<Self> {
        Ok(Self {
            atlas: Atlas::new(credentials, session_env)?,
        })
    }

    async fn create_user(&self, inputs: &DatabaseUserInputs) -> Result<ResourceOutputs> {
        let password = generate_password();
        self.atlas
            .create_database_user(&inputs.project_id, &inputs.username, &password, &inputs.role)
            .await?;
        Ok(user_outputs(inputs, &password))
    }

    async fn create_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_PROJECT => {
                let inputs: ProjectInputs = decode(request)?;
                let project = match self.atlas.find_project(&inputs.name).await? {
                    Some(project) => {
                        tracing::info!(project = %inputs.name, "Adopting existing Atlas project");
                        project
                    }
                    None => self.atlas.create_project(&inputs.name).await?,
                };
                project_outputs(&project, &inputs.name)
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                self.atlas
                    .create_cluster(&ClusterSpec {
                        project_id: &inputs.project_id,
                        name: &inputs.name,
                        provider: &inputs.provider,
                        region: &inputs.region,
                        tier: &inputs.tier,
                    })
                    .await?;
                let cluster = self
                    .atlas
                    .describe_cluster(&inputs.project_id, &inputs.name)
                    .await?
                    .ok_or_else(|| {
                        MongodbError::UnexpectedResponse(format!(
                            "cluster {} missing after creation",
                            inputs.name
                        ))
                    })?;
                Ok(cluster_outputs(&cluster, &inputs.name))
            }
            KIND_DATABASE_USER => {
                let inputs: DatabaseUserInputs = decode(request)?;
                self.create_user(&inputs).await
            }
            other => Err(MongodbError::UnsupportedKind(other.to_string())),
        }
    }

    async fn read_resource(&self, request: &ResourceRequest) -> Result<Option<ResourceOutputs>> {
        match request.kind.as_str() {
            KIND_PROJECT => {
                let inputs: ProjectInputs = decode(request)?;
                match self.atlas.find_project(&inputs.name).await? {
                    Some(project) => Ok(Some(project_outputs(&project, &inputs.name)?)),
                    None => Ok(None),
                }
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                let cluster = self
                    .atlas
                    .describe_cluster(&inputs.project_id, &inputs.name)
                    .await?;
                Ok(cluster.map(|c| cluster_outputs(&c, &inputs.name)))
            }
            KIND_DATABASE_USER => {
                let inputs: DatabaseUserInputs = decode(request)?;
                let found = self
                    .atlas
                    .describe_database_user(&inputs.project_id, &inputs.username)
                    .await?;
                // the password only lives in state
                Ok(found.and_then(|_| {
                    request
                        .output_str("password")
                        .map(|password| user_outputs(&inputs, password))
                }))
            }
            other => Err(MongodbError::UnsupportedKind(other.to_string())),
        }
    }

    async fn update_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                self.atlas
                    .update_cluster_tier(&inputs.project_id, &inputs.name, &inputs.tier)
                    .await?;
                let cluster = self
                    .atlas
                    .describe_cluster(&inputs.project_id, &inputs.name)
                    .await?
                    .unwrap_or(Value::Null);
                Ok(cluster_outputs(&cluster, &inputs.name))
            }
            KIND_DATABASE_USER => {
                let inputs: DatabaseUserInputs = decode(request)?;
                match request.output_str("password") {
                    Some(password) => Ok(user_outputs(&inputs, password)),
                    None => {
                        self.atlas
                            .delete_database_user(&inputs.project_id, &inputs.username)
                            .await?;
                        self.create_user(&inputs).await
                    }
                }
            }
            _ => self.create_resource(request).await,
        }
    }

    async fn delete_resource(&self, request: &ResourceRequest) -> Result<()> {
        match request.kind.as_str() {
            KIND_PROJECT => match request.output_str("id") {
                Some(id) => self.atlas.delete_project(id).await,
                None => Ok(()),
            },
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                self.atlas
                    .delete_cluster(&inputs.project_id, &inputs.name)
                    .await
            }
            KIND_DATABASE_USER => {
                let inputs: DatabaseUserInputs = decode(request)?;
                self.atlas
                    .delete_database_user(&inputs.project_id, &inputs.username)
                    .await
            }
            other => Err(MongodbError::UnsupportedKind(other.to_string())),
        }
    }
}

#[async_trait]
impl CloudProvider for MongodbProvider {
    fn name(&self) -> &str {
        sc_api::PROVIDER_MONGODB
    }

    async fn check_auth(&self) -> sc_provisioner::Result<AuthStatus> {
        match self.atlas.check_auth().await {
            Ok(organization) => Ok(AuthStatus::ok(organization)),
            Err(MongodbError::AtlasNotFound) => Ok(AuthStatus::failed(
                "atlas not found. Please install the MongoDB Atlas CLI",
            )),
            Err(MongodbError::CommandFailed(stderr)) => Ok(AuthStatus::failed(stderr)),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Creating MongoDB Atlas resource");
        Ok(self.create_resource(request).await?)
    }

    async fn read(
        &self,
        request: &ResourceRequest,
    ) -> sc_provisioner::Result<Option<ResourceOutputs>> {
        Ok(self.read_resource(request).await?)
    }

    async fn update(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Updating MongoDB Atlas resource");
        Ok(self.update_resource(request).await?)
    }

    async fn delete(&self, request: &ResourceRequest) -> sc_provisioner::Result<()> {
        tracing::info!(kind = %request.kind, name = %request.name, "Deleting MongoDB Atlas resource");
        Ok(self.delete_resource(request).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_uri() {
        assert_eq!(
            connection_uri("mongodb+srv://orders-prod.ab12c.mongodb.net", "orders", "pw", "orders"),
            "mongodb+srv://orders:pw@orders-prod.ab12c.mongodb.net/orders?retryWrites=true&w=majority"
        );
    }

    #[test]
    fn test_generated_passwords_differ() {
        let first = generate_password();
        assert_eq!(first.len(), PASSWORD_LENGTH);
        assert!(first.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(first, generate_password());
    }

    #[test]
    fn test_cluster_outputs() {
        let outputs = cluster_outputs(
            &json!({
                "stateName": "IDLE",
                "connectionStrings": {"standardSrv": "mongodb+srv://orders-prod.ab12c.mongodb.net"}
            }),
            "orders-prod",
        );
        assert_eq!(
            outputs.get_str("connectionString"),
            Some("mongodb+srv://orders-prod.ab12c.mongodb.net")
        );
        assert_eq!(outputs.get_str("stateName"), Some("IDLE"));
    }

    #[test]
    fn test_project_outputs_require_id() {
        assert!(project_outputs(&json!({"name": "acme"}), "acme").is_err());
        let outputs = project_outputs(&json!({"id": "64f0"}), "acme").unwrap();
        assert_eq!(outputs.get_str("id"), Some("64f0"));
    }
}
