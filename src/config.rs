use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::ledger::Candidate;

/// Telegram caps getUpdates at 100 per call
const MAX_BATCH_SIZE: u8 = 100;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    #[serde(default = "default_storage_config")]
    pub storage: StorageConfig,
    #[serde(default = "default_pipeline_config")]
    pub pipeline: PipelineConfig,
    /// Seed list inserted on startup; existing candidates are left untouched
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    pub bot_token: String,
    /// Stripped from commands as `@bot_username`. Resolved via getMe when absent.
    #[serde(default)]
    pub bot_username: Option<String>,
    /// Restricted working group. Commands inside it are ignored; commands
    /// elsewhere require membership in it.
    #[serde(default)]
    pub working_chat_id: Option<i64>,
    /// Named in the reply to non-members, e.g. "Nordic Energy"
    #[serde(default)]
    pub working_chat_name: Option<String>,
    #[serde(default = "default_verify_membership")]
    pub verify_membership: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub database_path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PipelineConfig {
    /// Clamped to 1..=100 while parsing
    #[serde(
        default = "default_batch_size",
        deserialize_with = "deserialize_batch_size"
    )]
    pub batch_size: u8,
    /// Pause between two polls of the platform
    #[serde(default = "default_interval_ms")]
    pub poll_interval_ms: u64,
    /// Pause of the dispatcher and sender when their queue is empty
    #[serde(default = "default_interval_ms")]
    pub idle_interval_ms: u64,
    #[serde(default = "default_show_vote_counts")]
    pub show_vote_counts: bool,
}

fn default_verify_membership() -> bool {
    true
}

fn default_db_path() -> PathBuf {
    PathBuf::from("votebot.db")
}

fn default_batch_size() -> u8 {
    50
}

fn deserialize_batch_size<'de, D>(deserializer: D) -> std::result::Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let requested = i64::deserialize(deserializer)?;
    Ok(requested.clamp(1, i64::from(MAX_BATCH_SIZE)) as u8)
}

fn default_interval_ms() -> u64 {
    1000
}

fn default_show_vote_counts() -> bool {
    true
}

fn default_storage_config() -> StorageConfig {
    StorageConfig {
        database_path: default_db_path(),
    }
}

fn default_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        batch_size: default_batch_size(),
        poll_interval_ms: default_interval_ms(),
        idle_interval_ms: default_interval_ms(),
        show_vote_counts: default_show_vote_counts(),
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).context("Failed to parse config file")?;

        if let Some(name) = config.telegram.bot_username.take() {
            let name = name.trim().trim_start_matches('@').to_string();
            config.telegram.bot_username = (!name.is_empty()).then_some(name);
        }

        let mut seen = HashSet::new();
        for candidate in &config.candidates {
            if !seen.insert(candidate.id) {
                anyhow::bail!("Duplicate candidate id {} in config", candidate.id);
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "123:abc"
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.bot_token, "123:abc");
        assert_eq!(config.telegram.bot_username, None);
        assert_eq!(config.telegram.working_chat_id, None);
        assert!(config.telegram.verify_membership);
        assert_eq!(config.storage.database_path, PathBuf::from("votebot.db"));
        assert_eq!(config.pipeline.batch_size, 50);
        assert_eq!(config.pipeline.poll_interval_ms, 1000);
        assert_eq!(config.pipeline.idle_interval_ms, 1000);
        assert!(config.pipeline.show_vote_counts);
        assert!(config.candidates.is_empty());
    }

    #[test]
    fn test_full_config() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "t"
            bot_username = "@nordic_vote_bot"
            working_chat_id = -1001234567890
            working_chat_name = "Nordic Energy"
            verify_membership = false

            [storage]
            database_path = "/var/lib/votebot/votes.db"

            [pipeline]
            batch_size = 150
            poll_interval_ms = 500
            show_vote_counts = false

            [[candidates]]
            id = 1
            name = "Inverter"
            author = "@vit"
            urls = ["https://telegra.ph/1", "https://github.com/x/y"]

            [[candidates]]
            id = 2
            name = "Shield"
            author = "@dmitriy"
            "#,
        )
        .unwrap();

        assert_eq!(config.telegram.bot_username.as_deref(), Some("nordic_vote_bot"));
        assert_eq!(config.telegram.working_chat_id, Some(-1001234567890));
        assert_eq!(
            config.telegram.working_chat_name.as_deref(),
            Some("Nordic Energy")
        );
        assert!(!config.telegram.verify_membership);
        assert_eq!(config.pipeline.batch_size, 100);
        assert_eq!(config.pipeline.poll_interval_ms, 500);
        assert_eq!(config.pipeline.idle_interval_ms, 1000);
        assert!(!config.pipeline.show_vote_counts);
        assert_eq!(config.candidates.len(), 2);
        assert_eq!(config.candidates[0].urls.len(), 2);
        assert!(config.candidates[1].urls.is_empty());
    }

    #[test]
    fn test_zero_batch_size_is_clamped() {
        let config = Config::parse(
            r#"
            [telegram]
            bot_token = "t"
            [pipeline]
            batch_size = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.batch_size, 1);
    }

    #[test]
    fn test_oversized_batch_size_is_clamped() {
        for (raw, expected) in [("300", 100), ("100000", 100), ("-3", 1), ("42", 42)] {
            let config = Config::parse(&format!(
                "[telegram]\nbot_token = \"t\"\n[pipeline]\nbatch_size = {}\n",
                raw
            ))
            .unwrap();
            assert_eq!(config.pipeline.batch_size, expected, "batch_size = {}", raw);
        }
    }

    #[test]
    fn test_duplicate_candidate_ids_rejected() {
        let err = Config::parse(
            r#"
            [telegram]
            bot_token = "t"
            [[candidates]]
            id = 1
            name = "A"
            author = "@a"
            [[candidates]]
            id = 1
            name = "B"
            author = "@b"
            "#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("Duplicate candidate id 1"));
    }

    #[test]
    fn test_missing_token_is_an_error() {
        assert!(Config::parse("[telegram]\n").is_err());
    }
}
