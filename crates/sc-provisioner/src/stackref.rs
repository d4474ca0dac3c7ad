//! Stack reference naming
//!
//! Parent stacks live at `organization/project/stack`. A child stack lives in
//! its parent's project under `child--parent--environment`.

use crate::error::{ProvisionerError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Qualifies a parent stack name with the organization.
///
/// Three segments are returned unchanged. Two segments are returned
/// unchanged unless the first segment is the project, in which case the
/// organization is prepended. A bare name becomes `organization/name`.
pub fn expand_stack_reference(parent_stack: &str, organization: &str, project_name: &str) -> String {
    let segments: Vec<&str> = parent_stack.split('/').collect();
    match segments.as_slice() {
        [_, _, _] => parent_stack.to_string(),
        [first, stack] if *first == project_name && *first != organization => {
            format!("{}/{}/{}", organization, first, stack)
        }
        [_, _] => parent_stack.to_string(),
        _ => format!("{}/{}", organization, parent_stack),
    }
}

/// Last segment of a stack reference
pub fn collapse_stack_reference(reference: &str) -> String {
    reference
        .rsplit('/')
        .next()
        .unwrap_or(reference)
        .to_string()
}

pub fn stack_name_in_env(stack_name: &str, environment: &str) -> String {
    format!("{}--{}", stack_name, environment)
}

/// Stack name of a child deployed into one environment of its parent
pub fn child_stack_name(stack_name: &str, parent_stack: &str, environment: &str) -> String {
    format!(
        "{}--{}",
        stack_name,
        stack_name_in_env(&collapse_stack_reference(parent_stack), environment)
    )
}

/// Output under which a parent exports a template descriptor
pub fn template_output_name(organization: &str, parent_stack: &str, template: &str) -> String {
    let parent = collapse_stack_reference(parent_stack);
    format!(
        "{}/{}",
        expand_stack_reference(&parent, organization, &parent),
        template
    )
}

/// Output under which a parent exports one resource's collected context
pub fn resource_output_name(
    organization: &str,
    parent_stack: &str,
    environment: &str,
    resource: &str,
) -> String {
    let parent = collapse_stack_reference(parent_stack);
    format!(
        "{}/{}/{}",
        expand_stack_reference(&parent, organization, &parent),
        environment,
        resource
    )
}

/// Fully qualified `organization/project/stack`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StackReference {
    pub organization: String,
    pub project: String,
    pub stack: String,
}

impl StackReference {
    pub fn new(
        organization: impl Into<String>,
        project: impl Into<String>,
        stack: impl Into<String>,
    ) -> Self {
        Self {
            organization: organization.into(),
            project: project.into(),
            stack: stack.into(),
        }
    }

    /// Parses `org/project/stack`; `org/stack` names the stack's own project
    pub fn parse(reference: &str) -> Result<Self> {
        let segments: Vec<&str> = reference.split('/').collect();
        let parsed = match segments.as_slice() {
            [org, project, stack] => Self::new(*org, *project, *stack),
            [org, stack] => Self::new(*org, *stack, *stack),
            _ => {
                return Err(ProvisionerError::Precondition(format!(
                    "stack reference '{}' must be org/project/stack or org/stack",
                    reference
                )));
            }
        };
        parsed.validate()?;
        Ok(parsed)
    }

    pub fn validate(&self) -> Result<()> {
        if self.organization.is_empty() || self.project.is_empty() || self.stack.is_empty() {
            return Err(ProvisionerError::Precondition(format!(
                "stack reference '{}' is incomplete",
                self
            )));
        }
        Ok(())
    }
}

impl fmt::Display for StackReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organization, self.project, self.stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_bare_name() {
        assert_eq!(expand_stack_reference("infra", "org", "proj"), "org/infra");
    }

    #[test]
    fn test_expand_two_segments_passthrough() {
        assert_eq!(expand_stack_reference("org/infra", "org", "proj"), "org/infra");
        assert_eq!(
            expand_stack_reference("proj/infra", "org", "proj"),
            "org/proj/infra"
        );
    }

    #[test]
    fn test_expand_three_segments_is_noop() {
        assert_eq!(
            expand_stack_reference("org/proj/infra", "org", "proj"),
            "org/proj/infra"
        );
        let once = expand_stack_reference("proj/infra", "org", "proj");
        assert_eq!(expand_stack_reference(&once, "org", "proj"), once);
    }

    #[test]
    fn test_collapse_after_expand_yields_bare_name() {
        for parent in ["infra", "org/infra", "proj/infra", "org/proj/infra", "other/x/infra"] {
            let expanded = expand_stack_reference(parent, "org", "proj");
            assert_eq!(collapse_stack_reference(&expanded), "infra", "{}", parent);
        }
    }

    #[test]
    fn test_stack_name_in_env() {
        assert_eq!(stack_name_in_env("myapp", "staging"), "myapp--staging");
        assert_eq!(
            child_stack_name("web", "acme/infra", "staging"),
            "web--infra--staging"
        );
    }

    #[test]
    fn test_output_names_agree_for_any_parent_form() {
        let expected = "acme/infra/web-app";
        assert_eq!(template_output_name("acme", "infra", "web-app"), expected);
        assert_eq!(template_output_name("acme", "acme/infra", "web-app"), expected);
        assert_eq!(
            template_output_name("acme", "acme/infra/infra", "web-app"),
            expected
        );
        assert_eq!(
            resource_output_name("acme", "infra", "prod", "db"),
            "acme/infra/prod/db"
        );
    }

    #[test]
    fn test_parse_reference() {
        let r = StackReference::parse("acme/shop/shop--prod").unwrap();
        assert_eq!(r.project, "shop");
        assert_eq!(r.stack, "shop--prod");
        assert_eq!(r.to_string(), "acme/shop/shop--prod");

        let r = StackReference::parse("acme/infra").unwrap();
        assert_eq!(r, StackReference::new("acme", "infra", "infra"));

        assert!(StackReference::parse("infra").is_err());
        assert!(StackReference::parse("acme//infra").is_err());
    }
}
