use std::path::PathBuf;

use clap::{Parser, Subcommand};
use liblockwire_core::LockId;

#[derive(Parser)]
#[command(
    name = "lockwire",
    about = "Ask the owner of a contended lock to release it",
    version
)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Suppress human-readable output
    #[arg(long, global = true)]
    pub quiet: bool,

    /// Configuration file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Hold a lock until another process asks for it
    Hold {
        /// Owner record file to publish
        #[arg(long)]
        record: PathBuf,

        /// Lock id (random if omitted)
        #[arg(long)]
        lock_id: Option<LockId>,

        /// Human-readable name of the locked resource
        #[arg(long, default_value = "lock")]
        name: String,
    },

    /// Ask the owner of a lock to release it
    Request {
        /// Owner record file to read
        #[arg(long)]
        record: PathBuf,

        /// How long to wait for the release confirmation
        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Show the local addresses used for lock signalling
    Addresses,
}
