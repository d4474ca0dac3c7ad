//! Google Cloud provider error types

use sc_provisioner::ProvisionerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GcpError {
    #[error("gcloud not found. Please install the Google Cloud SDK")]
    GcloudNotFound,

    #[error("gcloud command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("Missing input {key} for {kind}")]
    MissingInput { kind: String, key: &'static str },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GcpError>;

impl From<GcpError> for ProvisionerError {
    fn from(err: GcpError) -> Self {
        match err {
            GcpError::CommandFailed(stderr) => ProvisionerError::CommandFailed(stderr),
            GcpError::InvalidConfig(message) => ProvisionerError::Precondition(message),
            GcpError::JsonError(e) => ProvisionerError::Json(e),
            GcpError::IoError(e) => ProvisionerError::Io(e),
            other => ProvisionerError::Provider(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_into_provisioner_error() {
        let err: ProvisionerError = GcpError::CommandFailed("quota".to_string()).into();
        assert!(matches!(err, ProvisionerError::CommandFailed(ref s) if s == "quota"));

        let err: ProvisionerError = GcpError::GcloudNotFound.into();
        assert!(err.to_string().contains("gcloud not found"));
    }
}
