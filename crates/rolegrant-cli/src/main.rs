mod cli;
mod commands;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Grant {
            resource_application,
            role_name,
            msi_name,
            tenant_id,
            client_id,
            client_secret,
        } => {
            commands::grant(
                resource_application,
                role_name,
                msi_name,
                tenant_id,
                client_id,
                client_secret,
            )
            .await
        }
    }
}
