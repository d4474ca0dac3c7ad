use colored::Colorize;
use sc_api::{OperationResult, Stack, StackParams};
use sc_provisioner::Provisioner;
use sc_provisioner::stackref::collapse_stack_reference;
use std::path::Path;

/// Loads a child stack and merges the server descriptor of its parent into it.
///
/// The parent comes from `parent` when given, else from the child's
/// client.yaml entry for `environment`.
pub fn load_child_stack(
    provisioner: &Provisioner,
    root: &Path,
    stack: &str,
    environment: &str,
    parent: Option<String>,
) -> anyhow::Result<(Stack, StackParams)> {
    let child = provisioner.read_stack(root, stack)?;
    let parent_ref = match parent {
        Some(parent) => parent,
        None => child
            .client_stack(environment)
            .map(|client| client.parent.clone())
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "stack '{}' has no client configuration for environment '{}'",
                    stack,
                    environment
                )
            })?,
    };
    let parent_stack = provisioner.read_stack(root, &collapse_stack_reference(&parent_ref))?;

    let params = StackParams {
        stack_name: stack.to_string(),
        environment: environment.to_string(),
        parent_stack: Some(parent_ref),
    };
    Ok((child.child_stack(&parent_stack.server), params))
}

/// Parent stacks to provision: the named ones, else every stack with a provisioner
pub fn parent_stacks(
    provisioner: &Provisioner,
    root: &Path,
    names: &[String],
) -> anyhow::Result<Vec<Stack>> {
    if !names.is_empty() {
        return names
            .iter()
            .map(|name| provisioner.read_stack(root, name).map_err(Into::into))
            .collect();
    }
    let stacks: Vec<Stack> = provisioner
        .read_stacks(root)?
        .into_values()
        .filter(|stack| stack.provisioner_config().is_some())
        .collect();
    if stacks.is_empty() {
        anyhow::bail!("no parent stacks found under {}", root.display());
    }
    Ok(stacks)
}

pub fn print_operation(title: &str, result: &OperationResult) {
    println!("{} {}", title.green().bold(), result.stack_name.cyan());
    println!("  {}", result.summary);
    for (operation, count) in &result.operations {
        if *count > 0 {
            println!("  • {}: {}", operation, count);
        }
    }
    if result.remaining > 0 {
        println!(
            "  {}",
            format!("{} resources remain in state", result.remaining).yellow()
        );
    }
}
