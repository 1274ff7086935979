//! lockwire - ask the owner of a contended lock to release it
//!
//! Subcommands:
//! - `hold`: take a lock, publish its owner record and wait for a release request
//! - `request`: ask the owner named in a record to release its lock
//! - `addresses`: show how this host resolves its local communication addresses

mod cli;
mod commands;
mod error;
mod output;

use clap::Parser;
use liblockwire_core::resolve_config;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{Cli, Command};
use error::CliError;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays parseable
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cli.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if let Err(e) = run_command(&cli).await {
        output::output_error(&cli, &e);
        std::process::exit(e.exit_code());
    }
}

async fn run_command(cli: &Cli) -> Result<(), CliError> {
    let config = resolve_config(cli.config.as_deref())?;

    match &cli.command {
        Command::Hold {
            record,
            lock_id,
            name,
        } => commands::hold::run(cli, &config, record, *lock_id, name).await,
        Command::Request { record, timeout_ms } => {
            commands::request::run(cli, &config, record, *timeout_ms).await
        }
        Command::Addresses => commands::addresses::run(cli, &config),
    }
}
