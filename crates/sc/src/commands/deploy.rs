use crate::utils;
use colored::Colorize;
use sc_api::DeployParams;
use sc_provisioner::Provisioner;
use std::path::Path;

pub async fn handle(
    provisioner: &Provisioner,
    root: &Path,
    stack: &str,
    environment: &str,
    parent: Option<String>,
    skip_refresh: bool,
    skip_preview: bool,
) -> anyhow::Result<()> {
    let (child, stack_params) = utils::load_child_stack(provisioner, root, stack, environment, parent)?;
    println!(
        "{} {} to {}",
        "Deploying".blue(),
        stack.cyan(),
        environment.cyan()
    );
    let params = DeployParams {
        stack_params,
        root_dir: Some(root.to_path_buf()),
        skip_refresh,
        skip_preview,
    };
    let result = provisioner.deploy_stack(&child, &params).await?;
    utils::print_operation("✓ Deployed", &result);
    Ok(())
}
