//! Command-line interface of the `conveyor` operator tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Conveyor: a single-slot transfer job queue.
#[derive(Debug, Parser)]
#[command(name = "conveyor", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Log at debug level (RUST_LOG still wins when set).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run a batch of simulated transfers through the in-memory queue.
    Demo {
        /// Number of jobs to enqueue.
        #[arg(long, default_value_t = 5)]
        jobs: u32,

        /// Fail every K-th transfer (0 never fails).
        #[arg(long, default_value_t = 0)]
        fail_every: u32,

        /// Simulated duration of each transfer.
        #[arg(long, default_value_t = 20)]
        transfer_ms: u64,

        /// Dispatch timer period; defaults to the configured interval.
        #[arg(long)]
        poll_ms: Option<u64>,
    },

    /// Print the effective configuration as JSON.
    Config {
        /// Configuration file to read.
        #[arg(long, default_value = "conveyor.toml")]
        path: PathBuf,
    },
}
