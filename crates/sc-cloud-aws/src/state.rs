//! S3 state backend

use crate::aws::Aws;
use async_trait::async_trait;
use sc_api::{STATE_STORAGE_S3_BUCKET, StateStorageConfig};
use sc_provisioner::engine::ObjectStore;
use sc_provisioner::{ProvisionerError, Result, SessionEnv};
use std::sync::Arc;
use tokio::sync::OnceCell;

/// State documents stored as objects of an S3 bucket
pub struct S3ObjectStore {
    aws: Aws,
    bucket: String,
    provision: bool,
    ensured: OnceCell<()>,
}

impl S3ObjectStore {
    pub fn new(aws: Aws, bucket: impl Into<String>, provision: bool) -> Self {
        Self {
            aws,
            bucket: bucket.into(),
            provision,
            ensured: OnceCell::new(),
        }
    }

    async fn ensure_bucket(&self) -> Result<()> {
        if !self.provision {
            return Ok(());
        }
        self.ensured
            .get_or_try_init(|| async {
                if !self.aws.bucket_exists(&self.bucket).await? {
                    tracing::info!(bucket = %self.bucket, "Creating state bucket");
                    self.aws.create_bucket(&self.bucket).await?;
                    self.aws.set_bucket_versioning(&self.bucket, true).await?;
                }
                Ok::<(), crate::AwsError>(())
            })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn url(&self) -> String {
        format!("s3://{}", self.bucket)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.aws.read_object(&self.bucket, key).await?)
    }

    async fn put(&self, key: &str, data: Vec<u8>) -> Result<()> {
        self.ensure_bucket().await?;
        Ok(self.aws.write_object(&self.bucket, key, &data).await?)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        Ok(self.aws.delete_object(&self.bucket, key).await?)
    }
}

/// Opens the `s3-bucket` state storage
pub fn state_store(config: &StateStorageConfig, env: &SessionEnv) -> Result<Arc<dyn ObjectStore>> {
    let StateStorageConfig::S3Bucket(storage) = config else {
        return Err(ProvisionerError::Config {
            expected: STATE_STORAGE_S3_BUCKET,
            type_name: config.type_name().to_string(),
        });
    };
    if storage.bucket_name.is_empty() {
        return Err(ProvisionerError::Precondition(
            "bucketName is required for s3-bucket state storage".to_string(),
        ));
    }
    let aws = Aws::new(&storage.credentials, env);
    Ok(Arc::new(S3ObjectStore::new(
        aws,
        &storage.bucket_name,
        storage.provision,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sc_api::{AwsCredentials, S3BucketStateStorage};

    #[test]
    fn test_state_store_url() {
        let config = StateStorageConfig::S3Bucket(S3BucketStateStorage {
            credentials: AwsCredentials {
                access_key: "AKIA".to_string(),
                secret_access_key: "secret".to_string(),
                region: "eu-central-1".to_string(),
                ..Default::default()
            },
            bucket_name: "acme-state".to_string(),
            provision: true,
        });
        let store = state_store(&config, &SessionEnv::new()).unwrap();
        assert_eq!(store.url(), "s3://acme-state");
    }

    #[test]
    fn test_state_store_requires_bucket() {
        let config = StateStorageConfig::S3Bucket(S3BucketStateStorage::default());
        assert!(matches!(
            state_store(&config, &SessionEnv::new()),
            Err(ProvisionerError::Precondition(_))
        ));
    }
}
