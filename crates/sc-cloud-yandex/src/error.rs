//! Yandex Cloud provider error types

use sc_provisioner::ProvisionerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum YandexError {
    #[error("yc not found. Please install the Yandex Cloud CLI")]
    YcNotFound,

    #[error("yc command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, YandexError>;

impl From<YandexError> for ProvisionerError {
    fn from(err: YandexError) -> Self {
        match err {
            YandexError::CommandFailed(stderr) => ProvisionerError::CommandFailed(stderr),
            YandexError::InvalidConfig(message) => ProvisionerError::Precondition(message),
            YandexError::JsonError(e) => ProvisionerError::Json(e),
            YandexError::IoError(e) => ProvisionerError::Io(e),
            other => ProvisionerError::Provider(other.to_string()),
        }
    }
}
