//! Strictly Set - terminal runner
//!
//! Runs a game with tracing output; human players type on stdin.

#![warn(missing_docs)]

mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Command};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use strictly_set::{GameConfig, GameSession, PlayerId, TracingObserver};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Play {
            config,
            seed,
            humans,
            computers,
            duration,
        } => run_game(config, seed, humans, computers, duration).await,
        Command::DefaultConfig => print_default_config(),
    }
}

/// Run one game until it ends, the duration elapses, or Ctrl-C.
#[instrument]
async fn run_game(
    config_path: Option<PathBuf>,
    seed: Option<u64>,
    humans: Option<usize>,
    computers: Option<usize>,
    duration: Option<u64>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => GameConfig::from_file(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => GameConfig::default(),
    };
    if let Some(seed) = seed {
        config = config.with_seed(Some(seed));
    }
    if let Some(humans) = humans {
        config = config.with_human_players(humans);
    }
    if let Some(computers) = computers {
        config = config.with_computer_players(computers);
    }

    let human_players = *config.human_players();
    let session = Arc::new(GameSession::start_with_default_rules(
        config,
        Arc::new(TracingObserver),
    )?);
    info!(human_players, "Game running - enter `<player> <slot>` to act");

    let input = tokio::spawn(read_key_presses(Arc::clone(&session)));

    let limit = async {
        match duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        outcome = session.finished() => {
            debug!(?outcome, "Game finished on its own");
        }
        _ = limit => info!("Time limit reached"),
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted");
        }
    }

    let outcome = session.terminate().await;
    input.abort();

    match outcome {
        Some(outcome) => {
            let winners: Vec<_> = outcome.winners.iter().map(|p| p.index()).collect();
            println!("Winner(s): {:?}  scores: {:?}", winners, outcome.scores);
        }
        None => warn!("Game ended without an outcome"),
    }
    Ok(())
}

/// Forward `<player> <slot>` lines from stdin as key presses.
async fn read_key_presses(session: Arc<GameSession>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Failed to read stdin");
                break;
            }
        };
        let mut parts = line.split_whitespace().map(str::parse::<usize>);
        match (parts.next(), parts.next()) {
            (Some(Ok(player)), Some(Ok(slot))) => {
                let accepted = session.on_key_press(PlayerId(player), slot);
                debug!(player, slot, accepted, "Key press");
            }
            _ => warn!(%line, "Expected `<player> <slot>`"),
        }
    }
}

/// Print the default configuration as TOML.
fn print_default_config() -> Result<()> {
    let toml = toml::to_string_pretty(&GameConfig::default())
        .context("Failed to render default config")?;
    println!("{}", toml);
    Ok(())
}
