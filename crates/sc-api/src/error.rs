//! Configuration error types

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("stacks directory not found: {0}")]
    StacksDirNotFound(PathBuf),

    #[error("failed to read {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("secret '{0}' is referenced but not declared in secrets.yaml")]
    MissingSecret(String),

    #[error("environment variable '{0}' is referenced but not set")]
    MissingEnvVar(String),

    #[error("failed to decrypt secrets: {0}")]
    Decrypt(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;
