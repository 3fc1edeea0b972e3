//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// mixsched - round scheduler for a permissioned mix-network
#[derive(Parser)]
#[command(
    name = "ms",
    about = "Round scheduler for a permissioned mix-network",
    version,
    after_help = "Log verbosity follows RUST_LOG unless --log-level is given"
)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true, help = "Path to config file")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands
#[derive(Subcommand)]
pub enum Command {
    /// Drive simulated nodes through rounds against a live scheduler
    Simulate {
        /// Number of nodes to register
        #[arg(short, long, default_value = "10")]
        nodes: usize,

        /// Stop after this many rounds have completed or failed
        #[arg(short, long, default_value = "5")]
        rounds: u64,

        /// Give up after this many seconds
        #[arg(long, default_value = "120")]
        deadline_secs: u64,

        /// Probability that a node errors out instead of reaching standby
        #[arg(long, default_value = "0.0")]
        failure_rate: f64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the effective configuration
    Config,
}
