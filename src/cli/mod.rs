//! CLI module for Strata
//!
//! Provides commands:
//! - `serve`: Start the collaboration server (default)
//! - `issue-token`: Print a bearer token for local development
//! - `create-project`: Seed an empty project

use clap::{Parser, Subcommand};

pub mod project;
pub mod token;

/// Strata collaborative stratigraphy server
#[derive(Parser, Debug)]
#[command(name = "strata")]
#[command(about = "Real-time collaborative stratigraphic column editor")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the server (default)
    Serve,
    /// Print a signed bearer token
    IssueToken {
        /// User email, used as the identity
        #[arg(long)]
        email: String,
        /// Display name
        #[arg(long)]
        name: Option<String>,
    },
    /// Create an empty project and print its id
    CreateProject {
        /// Project name
        #[arg(long)]
        name: String,
        /// Owner email
        #[arg(long)]
        owner: String,
    },
}

/// Run the CLI command
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => crate::server::run().await,
        Commands::IssueToken { email, name } => token::run(&email, name.as_deref()),
        Commands::CreateProject { name, owner } => project::run(&name, &owner).await,
    }
}
