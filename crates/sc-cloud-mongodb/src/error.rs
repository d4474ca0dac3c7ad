//! MongoDB Atlas provider error types

use sc_provisioner::ProvisionerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MongodbError {
    #[error("atlas not found. Please install the MongoDB Atlas CLI")]
    AtlasNotFound,

    #[error("atlas command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),

    #[error("Unexpected atlas response: {0}")]
    UnexpectedResponse(String),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, MongodbError>;

impl From<MongodbError> for ProvisionerError {
    fn from(err: MongodbError) -> Self {
        match err {
            MongodbError::CommandFailed(stderr) => ProvisionerError::CommandFailed(stderr),
            MongodbError::InvalidConfig(message) => ProvisionerError::Precondition(message),
            MongodbError::JsonError(e) => ProvisionerError::Json(e),
            MongodbError::IoError(e) => ProvisionerError::Io(e),
            other => ProvisionerError::Provider(other.to_string()),
        }
    }
}
