use crate::utils;
use colored::Colorize;
use sc_provisioner::Provisioner;
use std::path::Path;

pub async fn handle(
    provisioner: &Provisioner,
    root: &Path,
    stack: &str,
    environment: Option<String>,
    parent: Option<String>,
) -> anyhow::Result<()> {
    let released = match environment {
        Some(environment) => {
            let (child, params) = utils::load_child_stack(provisioner, root, stack, &environment, parent)?;
            provisioner.cancel_stack(&child, Some(&params)).await?
        }
        None => {
            let parent_stack = provisioner.read_stack(root, stack)?;
            provisioner.cancel_stack(&parent_stack, None).await?
        }
    };
    if released {
        println!("{}", "✓ Lock released".green());
    } else {
        println!("{}", "Stack was not locked".dimmed());
    }
    Ok(())
}
