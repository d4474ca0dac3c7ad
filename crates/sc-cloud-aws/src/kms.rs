//! AWS KMS secrets provider

use crate::aws::Aws;
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use sc_api::{SECRETS_PROVIDER_AWS_KMS, SecretsProviderConfig};
use sc_provisioner::{ProvisionerError, Result, SecretsProvider, SessionEnv};
use std::sync::Arc;

/// Encrypts stack secrets with the KMS key behind `alias/{keyName}`.
///
/// The aws CLI speaks base64 on both sides, so ciphertexts are stored as
/// the CLI returns them.
pub struct AwsKmsSecretsProvider {
    aws: Aws,
    alias: String,
    url: String,
}

impl AwsKmsSecretsProvider {
    pub fn new(config: &SecretsProviderConfig, env: &SessionEnv) -> Result<Self> {
        let SecretsProviderConfig::AwsKms(kms) = config else {
            return Err(ProvisionerError::Config {
                expected: SECRETS_PROVIDER_AWS_KMS,
                type_name: config.type_name().to_string(),
            });
        };
        if kms.key_name.is_empty() {
            return Err(ProvisionerError::Precondition(
                "keyName is required for the aws-kms secrets provider".to_string(),
            ));
        }
        Ok(Self {
            aws: Aws::new(&kms.credentials, env),
            alias: kms.key_name.clone(),
            url: config.key_url(),
        })
    }
}

#[async_trait]
impl SecretsProvider for AwsKmsSecretsProvider {
    fn url(&self) -> String {
        self.url.clone()
    }

    async fn encrypt(&self, plaintext: &str) -> Result<String> {
        Ok(self
            .aws
            .kms_encrypt(&self.alias, plaintext.as_bytes())
            .await?)
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let blob = BASE64
            .decode(ciphertext)
            .map_err(|e| ProvisionerError::Secrets(format!("invalid ciphertext: {}", e)))?;
        let plaintext = self.aws.kms_decrypt(&blob).await?;
        let plaintext = BASE64
            .decode(plaintext)
            .map_err(|e| ProvisionerError::Secrets(format!("invalid plaintext: {}", e)))?;
        String::from_utf8(plaintext).map_err(|e| ProvisionerError::Secrets(e.to_string()))
    }
}

pub fn secrets_provider(
    config: &SecretsProviderConfig,
    env: &SessionEnv,
) -> Result<Arc<dyn SecretsProvider>> {
    Ok(Arc::new(AwsKmsSecretsProvider::new(config, env)?))
}
