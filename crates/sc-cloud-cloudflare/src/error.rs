//! Cloudflare provider error types

use sc_provisioner::ProvisionerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudflareError {
    #[error("wrangler not found. Please install: npm install -g wrangler")]
    WranglerNotFound,

    #[error("wrangler command failed: {0}")]
    CommandFailed(String),

    #[error("Cloudflare API error: {0}")]
    ApiError(String),

    #[error("Zone not found: {0}")]
    ZoneNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, CloudflareError>;

impl From<CloudflareError> for ProvisionerError {
    fn from(err: CloudflareError) -> Self {
        match err {
            CloudflareError::CommandFailed(stderr) => ProvisionerError::CommandFailed(stderr),
            CloudflareError::InvalidConfig(message) => ProvisionerError::Precondition(message),
            CloudflareError::HttpError(e) => ProvisionerError::Http(e),
            CloudflareError::JsonError(e) => ProvisionerError::Json(e),
            CloudflareError::IoError(e) => ProvisionerError::Io(e),
            other => ProvisionerError::Provider(other.to_string()),
        }
    }
}
