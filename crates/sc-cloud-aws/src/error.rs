//! AWS provider error types

use sc_provisioner::ProvisionerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("aws CLI not found. Please install the AWS CLI v2")]
    AwsCliNotFound,

    #[error("aws command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for ProvisionerError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::CommandFailed(stderr) => ProvisionerError::CommandFailed(stderr),
            AwsError::InvalidConfig(message) => ProvisionerError::Precondition(message),
            AwsError::JsonError(e) => ProvisionerError::Json(e),
            AwsError::IoError(e) => ProvisionerError::Io(e),
            other => ProvisionerError::Provider(other.to_string()),
        }
    }
}
