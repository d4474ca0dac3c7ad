//! Resource policies evaluated during preview and update

use super::program::DesiredResource;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnforcementLevel {
    /// Reported, never blocks
    Advisory,
    /// Blocks the update before anything is applied
    Mandatory,
}

impl std::fmt::Display for EnforcementLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EnforcementLevel::Advisory => write!(f, "advisory"),
            EnforcementLevel::Mandatory => write!(f, "mandatory"),
        }
    }
}

pub trait Policy: Send + Sync {
    fn name(&self) -> &str;

    fn level(&self) -> EnforcementLevel;

    /// Violation message for the resource, if any
    fn check(&self, resource: &DesiredResource) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    pub policy: String,
    pub urn: String,
    pub message: String,
    pub level: EnforcementLevel,
}

pub fn evaluate(policies: &[std::sync::Arc<dyn Policy>], desired: &[DesiredResource]) -> Vec<Violation> {
    let mut violations = Vec::new();
    for resource in desired {
        for policy in policies {
            if let Some(message) = policy.check(resource) {
                violations.push(Violation {
                    policy: policy.name().to_string(),
                    urn: resource.urn.clone(),
                    message,
                    level: policy.level(),
                });
            }
        }
    }
    violations
}
