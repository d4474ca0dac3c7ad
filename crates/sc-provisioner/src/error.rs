//! Provisioner error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionerError {
    #[error("configuration error: expected {expected} config, got type '{type_name}'")]
    Config {
        expected: &'static str,
        type_name: String,
    },

    #[error("precondition failed: {0}")]
    Precondition(String),

    #[error("credentials are not configured for {0}")]
    MissingCredentials(String),

    #[error("unknown {kind} type: {type_name}")]
    UnknownType {
        kind: &'static str,
        type_name: String,
    },

    #[error("{operation} failed for stack {stack}: {source}")]
    Remote {
        operation: &'static str,
        stack: String,
        #[source]
        source: Box<ProvisionerError>,
    },

    #[error("failed to provision resource {name} ({type_name}) in environment {environment}: {source}")]
    Resource {
        name: String,
        type_name: String,
        environment: String,
        #[source]
        source: Box<ProvisionerError>,
    },

    #[error("provider error: {0}")]
    Provider(String),

    #[error("command execution failed: {0}")]
    CommandFailed(String),

    #[error("provider not found: {0}")]
    ProviderNotFound(String),

    #[error("stack not found: {0}")]
    StackNotFound(String),

    #[error("stack already exists: {0}")]
    StackAlreadyExists(String),

    #[error("stack {stack} is locked by {holder} since {since}")]
    Locked {
        stack: String,
        holder: String,
        since: String,
    },

    #[error("duplicate resource: {0}")]
    DuplicateResource(String),

    #[error("registrar is not configured")]
    RegistrarNotConfigured,

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("secrets error: {0}")]
    Secrets(String),

    #[error("state error: {0}")]
    State(String),

    #[error(transparent)]
    Api(#[from] sc_api::ApiError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProvisionerError {
    pub fn remote(operation: &'static str, stack: impl Into<String>, source: Self) -> Self {
        ProvisionerError::Remote {
            operation,
            stack: stack.into(),
            source: Box::new(source),
        }
    }

    /// Sentinel returned by the no-op registrar
    pub fn is_not_configured(&self) -> bool {
        matches!(self.root_cause(), ProvisionerError::RegistrarNotConfigured)
    }

    pub fn is_stack_not_found(&self) -> bool {
        matches!(self.root_cause(), ProvisionerError::StackNotFound(_))
    }

    /// Innermost error beneath `Remote` and `Resource` context
    pub fn root_cause(&self) -> &ProvisionerError {
        match self {
            ProvisionerError::Remote { source, .. } | ProvisionerError::Resource { source, .. } => {
                source.root_cause()
            }
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProvisionerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_unwraps_context() {
        let err = ProvisionerError::remote(
            "up",
            "acme/infra/infra",
            ProvisionerError::Resource {
                name: "assets".to_string(),
                type_name: "gcp-bucket".to_string(),
                environment: "prod".to_string(),
                source: Box::new(ProvisionerError::RegistrarNotConfigured),
            },
        );
        assert!(err.is_not_configured());
        assert!(!err.is_stack_not_found());
        assert!(err.to_string().contains("up failed for stack acme/infra/infra"));
    }
}
