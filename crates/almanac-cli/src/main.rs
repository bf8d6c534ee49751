mod auth;
mod cli;
mod commands;
mod context;
mod error;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands};
use crate::commands::auth_cmd::run_auth;
use crate::commands::config::run_config;
use crate::commands::contact::run_contact;
use crate::commands::event::run_event;
use crate::commands::occasion::run_occasion;
use crate::commands::sync::{run_pending, run_status, run_sync};
use crate::context::CliContext;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let mut filter = EnvFilter::from_default_env();
    if let Ok(directive) = "almanac=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let context = CliContext::resolve(&cli.global)?;

    match cli.command {
        Commands::Event { command } => run_event(command, &context).await,
        Commands::Contact { command } => run_contact(command, &context).await,
        Commands::Occasion { command } => run_occasion(command, &context).await,
        Commands::Sync => run_sync(&context).await,
        Commands::Status { json } => run_status(json, &context).await,
        Commands::Pending { json } => run_pending(json, &context).await,
        Commands::Auth { command } => run_auth(command, &context).await,
        Commands::Config { command } => run_config(command, &context),
    }
}
