//! Command-line interface for strictly_set.

use clap::{Parser, Subcommand};

/// Strictly Set - real-time triple-matching game arbiter
#[derive(Parser, Debug)]
#[command(name = "strictly_set")]
#[command(about = "Run a concurrent triple-matching game", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Play a game in the terminal
    ///
    /// Human players type `<player> <slot>` lines on stdin.
    Play {
        /// Path to a TOML game configuration (defaults apply if omitted)
        #[arg(short, long)]
        config: Option<std::path::PathBuf>,

        /// Override the configured random seed
        #[arg(long)]
        seed: Option<u64>,

        /// Override the number of human players
        #[arg(long)]
        humans: Option<usize>,

        /// Override the number of computer players
        #[arg(long)]
        computers: Option<usize>,

        /// Stop the game after this many seconds
        #[arg(long)]
        duration: Option<u64>,
    },

    /// Print the default configuration as TOML
    DefaultConfig,
}
