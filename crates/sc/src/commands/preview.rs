use crate::utils;
use sc_api::{DeployParams, ProvisionParams};
use sc_provisioner::Provisioner;
use std::path::Path;

/// Previews a child deploy when an environment is given, else the parent provision
pub async fn handle(
    provisioner: &Provisioner,
    root: &Path,
    stack: &str,
    environment: Option<String>,
    parent: Option<String>,
    skip_refresh: bool,
) -> anyhow::Result<()> {
    let result = match environment {
        Some(environment) => {
            let (child, stack_params) =
                utils::load_child_stack(provisioner, root, stack, &environment, parent)?;
            let params = DeployParams {
                stack_params,
                root_dir: Some(root.to_path_buf()),
                skip_refresh,
                skip_preview: false,
            };
            provisioner.preview_stack(&child, &params).await?
        }
        None => {
            let parent_stack = provisioner.read_stack(root, stack)?;
            let params = ProvisionParams {
                root_dir: Some(root.to_path_buf()),
                skip_refresh,
                ..Default::default()
            };
            provisioner.preview_provision(&parent_stack, &params).await?
        }
    };
    utils::print_operation("Preview of", &result);
    Ok(())
}
