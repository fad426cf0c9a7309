//! Lubetrack CLI - record lubrication work from the field and sync it later
//!
//! Every command works against the local ledger; only `sync` needs the network.

mod cli;
mod commands;
mod error;
mod remote;

#[cfg(test)]
mod tests;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, PhotoCommands};
use crate::commands::alerts::run_alerts;
use crate::commands::completions::run_completions;
use crate::commands::photo::run_photo_check;
use crate::commands::queue::run_queue;
use crate::commands::sync::run_sync;
use crate::commands::task::run_task;
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
    if let Ok(directive) = "lubetrack=info".parse() {
        filter = filter.add_directive(directive);
    }
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let Cli {
        command,
        db_path,
        config,
    } = Cli::parse();

    match command {
        Commands::Task(command) => run_task(command, db_path, config),
        Commands::Queue(command) => run_queue(command, db_path, config),
        Commands::Sync {
            watch,
            recover,
            json,
        } => run_sync(watch, recover, json, db_path, config).await,
        Commands::Alerts(command) => run_alerts(command, db_path, config),
        Commands::Photo(PhotoCommands::Check { path }) => run_photo_check(&path, db_path, config),
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
