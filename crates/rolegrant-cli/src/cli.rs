use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "rolegrant",
    about = "Grant an app role to a managed identity service principal, verified by re-read",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Grant a custom app role on a resource application to a managed identity.
    Grant {
        /// Search string for the target application registration.
        resource_application: String,

        /// Exact name of the custom app role to assign (case-sensitive).
        role_name: String,

        /// Search string for the managed identity service principal.
        msi_name: String,

        /// Azure tenant ID.
        #[arg(long, env = "AZURE_TENANT_ID")]
        tenant_id: Option<String>,

        /// Service principal client ID. Without credentials the Azure CLI
        /// session from a prior 'az login' is used.
        #[arg(long, env = "AZURE_CLIENT_ID")]
        client_id: Option<String>,

        /// Service principal client secret.
        #[arg(long, env = "AZURE_CLIENT_SECRET", hide_env_values = true)]
        client_secret: Option<String>,
    },
}
