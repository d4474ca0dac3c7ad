mod commands;
mod cryptor;
mod registry;
mod utils;

use clap::{Parser, Subcommand};
use cryptor::CommandCryptor;
use sc_provisioner::Provisioner;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "sc")]
#[command(about = "Provision parent stacks and deploy services into them", long_about = None)]
struct Cli {
    /// Project root holding .sc/stacks
    #[arg(long, global = true, env = "SC_ROOT", default_value = ".")]
    root: PathBuf,

    /// Command that decrypts the project secrets before stacks are read
    #[arg(long, global = true, env = "SC_DECRYPT_COMMAND")]
    decrypt_command: Option<String>,

    /// Public key handed to the decrypt command
    #[arg(long, global = true, env = "SC_PUBLIC_KEY")]
    public_key: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision parent stacks (all of them when no --stack is given)
    Provision {
        /// Parent stack to provision, repeatable
        #[arg(short, long = "stack")]
        stacks: Vec<String>,
        #[arg(long)]
        skip_refresh: bool,
        #[arg(long)]
        skip_preview: bool,
    },
    /// Deploy a service stack into an environment of its parent
    Deploy {
        #[arg(short, long)]
        stack: String,
        /// Environment to deploy to (staging, prod, ...)
        #[arg(short, long, env = "SC_ENV")]
        env: String,
        /// Parent stack reference, overrides client.yaml
        #[arg(short, long)]
        parent: Option<String>,
        #[arg(long)]
        skip_refresh: bool,
        #[arg(long)]
        skip_preview: bool,
    },
    /// Show the changes a provision or deploy would make
    Preview {
        #[arg(short, long)]
        stack: String,
        /// Preview a deploy into this environment instead of a provision
        #[arg(short, long)]
        env: Option<String>,
        #[arg(short, long)]
        parent: Option<String>,
        #[arg(long)]
        skip_refresh: bool,
    },
    /// Destroy a deployed service, or a parent stack with --parent
    Destroy {
        #[arg(short, long)]
        stack: String,
        #[arg(short, long)]
        env: Option<String>,
        /// Destroy the parent stack itself
        #[arg(long)]
        parent: bool,
        #[arg(long)]
        skip_refresh: bool,
        /// Skip the confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Release the lock of an interrupted update
    Cancel {
        #[arg(short, long)]
        stack: String,
        #[arg(short, long)]
        env: Option<String>,
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Print the outputs of a stack as JSON
    Outputs {
        #[arg(short, long)]
        stack: String,
        #[arg(short, long)]
        env: Option<String>,
        #[arg(short, long)]
        parent: Option<String>,
    },
    /// Show version information
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let root = cli.root.as_path();
    let mut provisioner = Provisioner::new(registry::build());
    if let Some(command) = cli.decrypt_command {
        provisioner =
            provisioner.with_cryptor(Arc::new(CommandCryptor::new(command, root, cli.public_key)));
    }

    match cli.command {
        Commands::Provision {
            stacks,
            skip_refresh,
            skip_preview,
        } => {
            commands::provision::handle(&provisioner, root, stacks, skip_refresh, skip_preview)
                .await?;
        }
        Commands::Deploy {
            stack,
            env,
            parent,
            skip_refresh,
            skip_preview,
        } => {
            commands::deploy::handle(
                &provisioner,
                root,
                &stack,
                &env,
                parent,
                skip_refresh,
                skip_preview,
            )
            .await?;
        }
        Commands::Preview {
            stack,
            env,
            parent,
            skip_refresh,
        } => {
            commands::preview::handle(&provisioner, root, &stack, env, parent, skip_refresh)
                .await?;
        }
        Commands::Destroy {
            stack,
            env,
            parent,
            skip_refresh,
            yes,
        } => {
            commands::destroy::handle(&provisioner, root, &stack, env, parent, skip_refresh, yes)
                .await?;
        }
        Commands::Cancel { stack, env, parent } => {
            commands::cancel::handle(&provisioner, root, &stack, env, parent).await?;
        }
        Commands::Outputs { stack, env, parent } => {
            commands::outputs::handle(&provisioner, root, &stack, env, parent).await?;
        }
        Commands::Version => {
            println!("sc {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}
