//! Vote results viewer.
//!
//! Reads the same config file as the bot (first argument, `config.toml` by
//! default), opens its database and prints the candidates ranked by votes.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use votebot::config::Config;
use votebot::ledger::CandidateTally;
use votebot::render::votes_phrase;
use votebot::store::SqliteStore;

// ── Formatting ─────────────────────────────────────────────────────────────────

fn format_standings(standings: &[CandidateTally]) -> Vec<String> {
    standings
        .iter()
        .enumerate()
        .map(|(i, tally)| {
            format!(
                "{} место: {} автор {} ({})",
                i + 1,
                tally.candidate.name,
                tally.candidate.author,
                votes_phrase(tally.votes)
            )
        })
        .collect()
}

// ── Entry point ────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    // Only warnings go to stderr; results go to stdout
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let store = SqliteStore::open(&config.storage.database_path)?;
    let standings = store
        .standings()
        .await
        .context("Failed to read standings")?;

    if standings.is_empty() {
        println!("No candidates yet");
        return Ok(());
    }
    for line in format_standings(&standings) {
        println!("{}", line);
    }
    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
