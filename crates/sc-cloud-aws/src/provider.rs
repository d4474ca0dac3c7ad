//! AWS provider implementation

use crate::aws::Aws;
use crate::error::{AwsError, Result};
use async_trait::async_trait;
use sc_api::AwsCredentials;
use sc_provisioner::SessionEnv;
use sc_provisioner::engine::{AuthStatus, CloudProvider, ResourceOutputs, ResourceRequest};
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;

pub const KIND_BUCKET: &str = "aws:s3:Bucket";
pub const KIND_KMS_KEY: &str = "aws:kms:Key";
pub const KIND_CLUSTER: &str = "aws:ecs:Cluster";
pub const KIND_TASK_DEFINITION: &str = "aws:ecs:TaskDefinition";
pub const KIND_SERVICE: &str = "aws:ecs:Service";
pub const KIND_FUNCTION: &str = "aws:lambda:Function";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BucketInputs {
    pub name: String,
    #[serde(default)]
    pub versioning: bool,
    #[serde(default)]
    pub allow_only_https: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyInputs {
    pub alias: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterInputs {
    pub name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskDefinitionInputs {
    pub family: String,
    pub image: String,
    pub cpu: String,
    pub memory: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
    #[serde(default)]
    pub execution_role_arn: String,
}

impl TaskDefinitionInputs {
    fn body(&self) -> Value {
        let environment: Vec<Value> = self
            .env
            .iter()
            .map(|(name, value)| json!({"name": name, "value": env_value(value)}))
            .collect();
        let mut container = json!({
            "name": self.family,
            "image": self.image,
            "essential": true,
            "environment": environment,
        });
        if let Some(port) = self.port {
            container["portMappings"] = json!([{"containerPort": port, "protocol": "tcp"}]);
        }
        let mut body = json!({
            "family": self.family,
            "requiresCompatibilities": ["FARGATE"],
            "networkMode": "awsvpc",
            "cpu": self.cpu,
            "memory": self.memory,
            "containerDefinitions": [container],
        });
        if !self.execution_role_arn.is_empty() {
            body["executionRoleArn"] = json!(self.execution_role_arn);
        }
        body
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceInputs {
    pub name: String,
    pub cluster: String,
    pub task_definition: String,
    #[serde(default = "default_count")]
    pub desired_count: u32,
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default)]
    pub security_groups: Vec<String>,
    #[serde(default)]
    pub assign_public_ip: bool,
}

fn default_count() -> u32 {
    1
}

impl ServiceInputs {
    fn network(&self) -> Value {
        json!({
            "awsvpcConfiguration": {
                "subnets": self.subnets,
                "securityGroups": self.security_groups,
                "assignPublicIp": if self.assign_public_ip { "ENABLED" } else { "DISABLED" },
            }
        })
    }

    fn create_body(&self) -> Value {
        json!({
            "cluster": self.cluster,
            "serviceName": self.name,
            "taskDefinition": self.task_definition,
            "desiredCount": self.desired_count,
            "launchType": "FARGATE",
            "networkConfiguration": self.network(),
        })
    }

    fn update_body(&self) -> Value {
        json!({
            "cluster": self.cluster,
            "service": self.name,
            "taskDefinition": self.task_definition,
            "desiredCount": self.desired_count,
            "networkConfiguration": self.network(),
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInputs {
    pub name: String,
    pub image: String,
    pub role_arn: String,
    pub timeout: u32,
    #[serde(default)]
    pub memory: Option<u32>,
    #[serde(default)]
    pub env: BTreeMap<String, Value>,
}

impl FunctionInputs {
    fn variables(&self) -> BTreeMap<String, String> {
        self.env
            .iter()
            .map(|(k, v)| (k.clone(), env_value(v)))
            .collect()
    }

    fn configuration(&self) -> Value {
        let mut body = json!({
            "FunctionName": self.name,
            "Role": self.role_arn,
            "Timeout": self.timeout,
            "Environment": {"Variables": self.variables()},
        });
        if let Some(memory) = self.memory {
            body["MemorySize"] = json!(memory);
        }
        body
    }

    fn create_body(&self) -> Value {
        let mut body = self.configuration();
        body["PackageType"] = json!("Image");
        body["Code"] = json!({"ImageUri": self.image});
        body
    }
}

fn env_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn decode<T: serde::de::DeserializeOwned>(request: &ResourceRequest) -> Result<T> {
    Ok(serde_json::from_value(request.inputs.clone())?)
}

fn recorded(request: &ResourceRequest) -> ResourceOutputs {
    ResourceOutputs {
        values: request.outputs.clone(),
        secrets: Default::default(),
    }
}

/// AWS provider
pub struct AwsProvider {
    aws: Aws,
}

impl AwsProvider {
    pub fn new(credentials: &AwsCredentials, session_env: &SessionEnv) -> Result<Self> {
        if credentials.region.is_empty() {
            return Err(AwsError::InvalidConfig("region is required".to_string()));
        }
        Ok(Self {
            aws: Aws::new(credentials, session_env),
        })
    }

    pub fn aws(&self) -> &Aws {
        &self.aws
    }

    async fn configure_bucket(&self, inputs: &BucketInputs) -> Result<()> {
        self.aws
            .set_bucket_versioning(&inputs.name, inputs.versioning)
            .await?;
        if inputs.allow_only_https {
            self.aws.require_https(&inputs.name).await?;
        }
        Ok(())
    }

    async fn function_outputs(&self, inputs: &FunctionInputs, function: &Value) -> Result<ResourceOutputs> {
        let arn = function
            .pointer("/Configuration/FunctionArn")
            .or_else(|| function.get("FunctionArn"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let url = self.aws.function_url(&inputs.name).await?;
        Ok(ResourceOutputs::new()
            .with("name", inputs.name.as_str())
            .with("arn", arn)
            .with("url", url))
    }

    async fn create_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.aws.create_bucket(&inputs.name).await?;
                self.configure_bucket(&inputs).await?;
                Ok(ResourceOutputs::new()
                    .with("name", inputs.name.as_str())
                    .with("arn", format!("arn:aws:s3:::{}", inputs.name))
                    .with("region", self.aws.region()))
            }
            KIND_KMS_KEY => {
                let inputs: KeyInputs = decode(request)?;
                let arn = self.aws.create_key(&inputs.alias).await?;
                Ok(ResourceOutputs::new().with("arn", arn))
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                let created = self.aws.create_cluster(&inputs.name).await?;
                let arn = created
                    .pointer("/cluster/clusterArn")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(ResourceOutputs::new()
                    .with("name", inputs.name.as_str())
                    .with("arn", arn))
            }
            KIND_TASK_DEFINITION => {
                let inputs: TaskDefinitionInputs = decode(request)?;
                let arn = self.aws.register_task_definition(&inputs.body()).await?;
                Ok(ResourceOutputs::new().with("arn", arn))
            }
            KIND_SERVICE => {
                let inputs: ServiceInputs = decode(request)?;
                let created = self.aws.create_service(&inputs.create_body()).await?;
                let arn = created
                    .pointer("/service/serviceArn")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                Ok(ResourceOutputs::new()
                    .with("name", inputs.name.as_str())
                    .with("arn", arn))
            }
            KIND_FUNCTION => {
                let inputs: FunctionInputs = decode(request)?;
                let created = self.aws.create_function(&inputs.create_body()).await?;
                self.function_outputs(&inputs, &created).await
            }
            other => Err(AwsError::UnsupportedKind(other.to_string())),
        }
    }

    async fn read_resource(&self, request: &ResourceRequest) -> Result<Option<ResourceOutputs>> {
        let exists = match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.aws.bucket_exists(&inputs.name).await?
            }
            KIND_KMS_KEY => {
                let inputs: KeyInputs = decode(request)?;
                self.aws.describe_key(&inputs.alias).await?.is_some()
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                self.aws.describe_cluster(&inputs.name).await?.is_some()
            }
            // revisions are immutable; a recorded ARN stays valid until deregistered
            KIND_TASK_DEFINITION => request.output_str("arn").is_some(),
            KIND_SERVICE => {
                let inputs: ServiceInputs = decode(request)?;
                self.aws
                    .describe_service(&inputs.cluster, &inputs.name)
                    .await?
                    .is_some()
            }
            KIND_FUNCTION => {
                let inputs: FunctionInputs = decode(request)?;
                self.aws.get_function(&inputs.name).await?.is_some()
            }
            other => return Err(AwsError::UnsupportedKind(other.to_string())),
        };
        Ok(exists.then(|| recorded(request)))
    }

    async fn update_resource(&self, request: &ResourceRequest) -> Result<ResourceOutputs> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.configure_bucket(&inputs).await?;
                Ok(recorded(request))
            }
            KIND_TASK_DEFINITION => self.create_resource(request).await,
            KIND_SERVICE => {
                let inputs: ServiceInputs = decode(request)?;
                self.aws.update_service(&inputs.update_body()).await?;
                Ok(recorded(request))
            }
            KIND_FUNCTION => {
                let inputs: FunctionInputs = decode(request)?;
                self.aws
                    .update_function(&inputs.name, &inputs.image, &inputs.configuration())
                    .await?;
                let function = self.aws.get_function(&inputs.name).await?.unwrap_or_default();
                self.function_outputs(&inputs, &function).await
            }
            _ => Ok(recorded(request)),
        }
    }

    async fn delete_resource(&self, request: &ResourceRequest) -> Result<()> {
        match request.kind.as_str() {
            KIND_BUCKET => {
                let inputs: BucketInputs = decode(request)?;
                self.aws.delete_bucket(&inputs.name).await
            }
            KIND_KMS_KEY => {
                let inputs: KeyInputs = decode(request)?;
                tracing::warn!(alias = %inputs.alias, "Scheduling KMS key deletion in 7 days");
                self.aws.schedule_key_deletion(&inputs.alias).await
            }
            KIND_CLUSTER => {
                let inputs: ClusterInputs = decode(request)?;
                self.aws.delete_cluster(&inputs.name).await
            }
            KIND_TASK_DEFINITION => match request.output_str("arn") {
                Some(arn) => self.aws.deregister_task_definition(arn).await,
                None => Ok(()),
            },
            KIND_SERVICE => {
                let inputs: ServiceInputs = decode(request)?;
                self.aws.delete_service(&inputs.cluster, &inputs.name).await
            }
            KIND_FUNCTION => {
                let inputs: FunctionInputs = decode(request)?;
                self.aws.delete_function(&inputs.name).await
            }
            other => Err(AwsError::UnsupportedKind(other.to_string())),
        }
    }
}

#[async_trait]
impl CloudProvider for AwsProvider {
    fn name(&self) -> &str {
        sc_api::PROVIDER_AWS
    }

    async fn check_auth(&self) -> sc_provisioner::Result<AuthStatus> {
        match self.aws.check_auth().await {
            Ok(arn) => Ok(AuthStatus::ok(arn)),
            Err(AwsError::AwsCliNotFound) => Ok(AuthStatus::failed(
                "aws CLI not found. Please install the AWS CLI v2",
            )),
            Err(AwsError::CommandFailed(stderr)) => Ok(AuthStatus::failed(stderr)),
            Err(e) => Err(e.into()),
        }
    }

    async fn create(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Creating AWS resource");
        Ok(self.create_resource(request).await?)
    }

    async fn read(
        &self,
        request: &ResourceRequest,
    ) -> sc_provisioner::Result<Option<ResourceOutputs>> {
        Ok(self.read_resource(request).await?)
    }

    async fn update(&self, request: &ResourceRequest) -> sc_provisioner::Result<ResourceOutputs> {
        tracing::info!(kind = %request.kind, name = %request.name, "Updating AWS resource");
        Ok(self.update_resource(request).await?)
    }

    async fn delete(&self, request: &ResourceRequest) -> sc_provisioner::Result<()> {
        tracing::info!(kind = %request.kind, name = %request.name, "Deleting AWS resource");
        Ok(self.delete_resource(request).await?)
    }
}
