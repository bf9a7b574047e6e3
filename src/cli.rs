use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "walletsyncd")]
#[command(about = "Resumable on-chain wallet asset sync engine", long_about = None)]
#[command(version)]
pub(crate) struct Cli {
    /// Data root holding per-user wallet directories.
    /// Falls back to WALLETSYNC_DATA_DIR, then ./data.
    #[arg(long, global = true)]
    pub(crate) data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Start (or resume) a wallet sync and detach a background worker.
    Start {
        #[arg(long)]
        user: String,
        /// Stake address (stake1...) or payment address to scan.
        #[arg(long)]
        target: String,
        /// Restart from page 1 even if a job is mid-flight.
        #[arg(long)]
        force: bool,
    },

    /// Print the current job snapshot as JSON.
    Status {
        #[arg(long)]
        user: String,
    },

    /// Process one slice synchronously (cron-friendly), then print the job.
    Tick {
        #[arg(long)]
        user: String,
    },

    /// Background worker loop; normally spawned by `start`, not by hand.
    Worker {
        #[arg(long)]
        user: String,
    },

    /// Serve the POST JSON action endpoint.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
        #[arg(long, default_value_t = 8787)]
        port: u16,
    },
}
