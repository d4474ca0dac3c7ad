//! Cloud KMS secrets provider

use crate::gcloud::Gcloud;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sc_api::{SECRETS_PROVIDER_GCP_KMS, SecretsProviderConfig};
use sc_provisioner::{ProvisionerError, Result, SecretsProvider, SessionEnv};
use std::sync::Arc;

/// Encrypts stack secrets with a Cloud KMS key through gcloud
pub struct GcpKmsSecretsProvider {
    gcloud: Gcloud,
    key_ring: String,
    key: String,
    location: String,
    url: String,
}

impl GcpKmsSecretsProvider {
    pub fn new(config: &SecretsProviderConfig, env: &SessionEnv) -> Result<Self> {
        let SecretsProviderConfig::GcpKms(kms) = config else {
            return Err(ProvisionerError::Config {
                expected: SECRETS_PROVIDER_GCP_KMS,
                type_name: config.type_name().to_string(),
            });
        };
        if kms.key_name.is_empty() {
            return Err(ProvisionerError::Precondition(
                "keyName is required for the gcp-kms secrets provider".to_string(),
            ));
        }
        let gcloud = Gcloud::new(
            &kms.credentials.project_id,
            &kms.credentials.credentials,
            env,
        )?;
        Ok(Self {
            gcloud,
            key_ring: kms.key_name.clone(),
            key: kms.key_name.clone(),
            location: kms.key_location.clone(),
            url: config.key_url(),
        })
    }
}

#[async_trait]
impl SecretsProvider for GcpKmsSecretsProvider {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn encrypt(&self, plaintext: &str) -> Result<String> {
        let ciphertext = self
            .gcloud
            .kms_encrypt(&self.key_ring, &self.key, &self.location, plaintext.as_bytes())
            .await?;
        Ok(BASE64.encode(ciphertext))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let sealed = BASE64
            .decode(ciphertext)
            .map_err(|e| ProvisionerError::Secrets(format!("invalid ciphertext: {}", e)))?;
        let plaintext = self
            .gcloud
            .kms_decrypt(&self.key_ring, &self.key, &self.location, &sealed)
            .await?;
        String::from_utf8(plaintext).map_err(|e| ProvisionerError::Secrets(e.to_string()))
    }
}

pub fn secrets_provider(
    config: &SecretsProviderConfig,
    env: &SessionEnv,
) -> Result<Arc<dyn SecretsProvider>> {
    Ok(Arc::new(GcpKmsSecretsProvider::new(config, env)?))
}
