use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use votebot::config::Config;
use votebot::pipeline::{shutdown_channel, Pipeline, PipelineSettings};
use votebot::platform::telegram::TelegramPlatform;
use votebot::store::SqliteStore;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,votebot=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Database: {}", config.storage.database_path.display());
    info!("  Working chat: {:?}", config.telegram.working_chat_id);
    info!("  Seed candidates: {}", config.candidates.len());

    let store = SqliteStore::open(&config.storage.database_path)?;
    store
        .seed_candidates(&config.candidates)
        .await
        .context("Failed to seed candidates")?;

    let platform = TelegramPlatform::new(&config.telegram.bot_token);
    let bot_username = match config.telegram.bot_username.clone() {
        Some(name) => Some(name),
        None => platform.username().await?,
    };
    if bot_username.is_none() {
        warn!("Bot username unknown, @mentions will not be stripped from commands");
    }

    let settings = PipelineSettings::from_config(&config, bot_username);
    let pipeline = Pipeline::new(Arc::new(platform), Arc::new(store), settings);

    let (shutdown, signal) = shutdown_channel();
    let mut running = tokio::spawn(pipeline.run(signal));

    info!("Bot is starting... Press Ctrl+C to stop");
    tokio::select! {
        joined = &mut running => {
            joined.context("Pipeline task panicked")??;
            return Ok(());
        }
        ctrl_c = tokio::signal::ctrl_c() => {
            ctrl_c.context("Failed to listen for Ctrl+C")?;
            info!("Operation has been cancelled by user");
            shutdown.trigger();
        }
    }

    running.await.context("Pipeline task panicked")??;
    info!("Bot stopped");
    Ok(())
}
