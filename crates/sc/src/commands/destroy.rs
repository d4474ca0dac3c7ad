use crate::utils;
use colored::Colorize;
use sc_api::{DeployParams, ProvisionParams};
use sc_provisioner::Provisioner;
use std::path::Path;

pub async fn handle(
    provisioner: &Provisioner,
    root: &Path,
    stack: &str,
    environment: Option<String>,
    destroy_parent: bool,
    skip_refresh: bool,
    yes: bool,
) -> anyhow::Result<()> {
    let target = match (&environment, destroy_parent) {
        (_, true) => format!("parent stack {}", stack),
        (Some(environment), false) => format!("{} in {}", stack, environment),
        (None, false) => anyhow::bail!("--env is required to destroy a child stack"),
    };
    if !yes {
        println!("{}", format!("Warning: this destroys every resource of {}.", target).yellow());
        println!("Pass --yes to proceed");
        return Ok(());
    }

    let result = if destroy_parent {
        let parent_stack = provisioner.read_stack(root, stack)?;
        let params = ProvisionParams {
            root_dir: Some(root.to_path_buf()),
            skip_refresh,
            ..Default::default()
        };
        provisioner.destroy_parent_stack(&parent_stack, &params).await?
    } else {
        let environment = environment.unwrap_or_default();
        let (child, stack_params) = utils::load_child_stack(provisioner, root, stack, &environment, None)?;
        let params = DeployParams {
            stack_params,
            root_dir: Some(root.to_path_buf()),
            skip_refresh,
            skip_preview: true,
        };
        provisioner.destroy_child_stack(&child, &params).await?
    };
    utils::print_operation("✓ Destroyed", &result);
    Ok(())
}
