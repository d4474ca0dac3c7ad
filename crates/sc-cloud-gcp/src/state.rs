//! Cloud Storage state backend

use crate::gcloud::{ENV_CORE_PROJECT, ENV_CREDENTIAL_FILE, Gcloud, credentials_file};
use async_trait::async_trait;
use sc_api::{Auth, STATE_STORAGE_GCP_BUCKET, StateStorageConfig};
use sc_provisioner::engine::ObjectStore;
use sc_provisioner::{ProvisionerError, Result, SessionEnv};
use std::sync::Arc;
use tokio::sync::OnceCell;

const ENV_APPLICATION_CREDENTIALS: &str = "GOOGLE_APPLICATION_CREDENTIALS";

/// State documents stored as objects of a Cloud Storage bucket
pub struct GcsObjectStore {
    gcloud: Gcloud,
    bucket: String,
    location: Option<String>,
    provision: bool,
    ensured: OnceCell<()>,
}

impl GcsObjectStore {
    pub fn new(gcloud: Gcloud, bucket: impl Into<String>) -> Self {
        Self {
            gcloud,
            bucket: bucket.into(),
            location: None,
            provision: false,
            ensured: OnceCell::new(),
        }
    }

    /// Creates the bucket on first write when it does not exist
    pub fn with_provision(mut self, location: Option<String>) -> Self {
        self.provision = true;
        self.location = location;
        self
    }

    async fn ensure_bucket(&self) -> Result<()> {
        if !self.provision {
            return Ok(());
        }
        self.ensured
            .get_or_try_init(|| async {
                if self.gcloud.describe_bucket(&self.bucket).await?.is_none() {
                    tracing::info!(bucket = %self.bucket, "Creating state bucket");
                    self.gcloud
                        .create_bucket(&self.bucket, self.location.as_deref(), None)
                        .await?;
                }
                Ok::<(), crate::GcpError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for GcsObjectStore {
    fn url(&self) -> String {
        format!("gs://{}", self.bucket)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.gcloud.read_object(&self.bucket, key).await?)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.ensure_bucket().await?;
        Ok(self.gcloud.write_object(&self.bucket, key, &data).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Ok(self.gcloud.delete_object(&self.bucket, key).await?)
    }
}

/// Opens the `gcp-bucket` state storage
pub fn state_store(config: &StateStorageConfig, env: &SessionEnv) -> Result<Arc<dyn ObjectStore>> {
    let StateStorageConfig::GcpBucket(storage) = config else {
        return Err(ProvisionerError::Config {
            expected: STATE_STORAGE_GCP_BUCKET,
            type_name: config.type_name().to_string(),
        });
    };
    if storage.bucket_name.is_empty() {
        return Err(ProvisionerError::Precondition(
            "bucketName is required for gcp-bucket state storage".to_string(),
        ));
    }
    let gcloud = Gcloud::new(
        &storage.credentials.project_id,
        &storage.credentials.credentials,
        env,
    )?;
    let mut store = GcsObjectStore::new(gcloud, &storage.bucket_name);
    if storage.provision {
        store = store.with_provision(storage.location.clone());
    }
    Ok(Arc::new(store))
}

/// Points every gcloud call of the session at the state storage credentials
pub fn initialize_session(auth: &Auth, env: &mut SessionEnv) -> Result<()> {
    let Auth::Gcp(credentials) = auth else {
        return Ok(());
    };
    if !credentials.credentials.is_empty() {
        let path = credentials_file(&credentials.credentials)?;
        let path = path.display().to_string();
        env.set(ENV_CREDENTIAL_FILE, path.as_str());
        env.set(ENV_APPLICATION_CREDENTIALS, path);
    }
    env.set(ENV_CORE_PROJECT, credentials.project_id.as_str());
    Ok(())
}
