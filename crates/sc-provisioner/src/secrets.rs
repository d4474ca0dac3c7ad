//! Secrets providers
//!
//! A secrets provider encrypts secret stack and resource outputs before they
//! reach the state backend. The passphrase provider is built in; KMS-backed
//! providers come from the provider packages.

use crate::engine::ResourceRef;
use crate::error::{ProvisionerError, Result};
use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::sync::Arc;

const NONCE_LEN: usize = 12;

#[async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Identifies the provider in persisted state, e.g. `passphrase` or a KMS key URL
    fn url(&self) -> String;

    async fn encrypt(&self, plaintext: &str) -> Result<String>;

    async fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// Result of provisioning the secrets provider of a stack.
///
/// Lives for one provisioning run and is re-derived on the next one.
#[derive(Clone)]
pub struct SecretsProviderOutput {
    pub provider: Arc<dyn SecretsProvider>,
    pub resource: ResourceRef,
}

/// AES-256-GCM with a key derived from a passphrase.
///
/// Ciphertexts are `base64(nonce || ciphertext)`.
pub struct PassphraseSecretsProvider {
    cipher: Aes256Gcm,
}

impl PassphraseSecretsProvider {
    pub fn new(passphrase: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(ProvisionerError::MissingCredentials(
                "passphrase secrets provider".to_string(),
            ));
        }
        let key = Sha256::digest(passphrase.as_bytes());
        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| ProvisionerError::Secrets(e.to_string()))?;
        Ok(Self { cipher })
    }
}

#[async_trait]
impl SecretsProvider for PassphraseSecretsProvider {
    fn url(&self) -> String {
        sc_api::SECRETS_PROVIDER_PASSPHRASE.to_string()
    }

    async fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);
        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|e| ProvisionerError::Secrets(format!("encryption failed: {}", e)))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce);
        sealed.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(sealed))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let sealed = BASE64
            .decode(ciphertext)
            .map_err(|e| ProvisionerError::Secrets(format!("invalid ciphertext: {}", e)))?;
        if sealed.len() <= NONCE_LEN {
            return Err(ProvisionerError::Secrets("ciphertext too short".to_string()));
        }
        let (nonce, body) = sealed.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| {
                ProvisionerError::Secrets("decryption failed: wrong passphrase?".to_string())
            })?;
        String::from_utf8(plaintext).map_err(|e| ProvisionerError::Secrets(e.to_string()))
    }
}
