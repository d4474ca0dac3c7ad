use crate::utils;
use colored::Colorize;
use sc_api::ProvisionParams;
use sc_provisioner::Provisioner;
use std::path::Path;

pub async fn handle(
    provisioner: &Provisioner,
    root: &Path,
    stacks: Vec<String>,
    skip_refresh: bool,
    skip_preview: bool,
) -> anyhow::Result<()> {
    let parents = utils::parent_stacks(provisioner, root, &stacks)?;
    let params = ProvisionParams {
        root_dir: Some(root.to_path_buf()),
        stacks,
        skip_refresh,
        skip_preview,
        ..Default::default()
    };

    for stack in &parents {
        println!("{} {}", "Provisioning".blue(), stack.name.cyan());
        let result = provisioner.provision_stack(stack, &params).await?;
        utils::print_operation("✓ Provisioned", &result);
    }
    Ok(())
}
