use crate::utils;
use sc_provisioner::Provisioner;
use std::path::Path;

pub async fn handle(
    provisioner: &Provisioner,
    root: &Path,
    stack: &str,
    environment: Option<String>,
    parent: Option<String>,
) -> anyhow::Result<()> {
    let result = match environment {
        Some(environment) => {
            let (child, params) = utils::load_child_stack(provisioner, root, stack, &environment, parent)?;
            provisioner.outputs_stack(&child, Some(&params)).await?
        }
        None => {
            let parent_stack = provisioner.read_stack(root, stack)?;
            provisioner.outputs_stack(&parent_stack, None).await?
        }
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
