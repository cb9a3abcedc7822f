pub mod candidates;
pub mod votes;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::info;

use crate::ledger::{BallotSnapshot, Vote};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("malformed urls for candidate {candidate_id}: {source}")]
    Urls {
        candidate_id: i64,
        #[source]
        source: serde_json::Error,
    },
}

/// Persistence the dispatcher needs for candidates and votes.
///
/// Each method is atomic on its own. Read-then-write sequences across calls
/// are only safe while a single process writes to the store.
#[async_trait]
pub trait VoteStore: Send + Sync {
    /// All candidates ascending by id with their vote counts, plus the
    /// viewer's current selection when a viewer is given
    async fn ballot(&self, viewer: Option<i64>) -> Result<BallotSnapshot, StoreError>;

    async fn vote_for_user(&self, user_id: i64) -> Result<Option<Vote>, StoreError>;

    /// Insert the user's vote or replace their existing one
    async fn upsert_vote(&self, vote: &Vote) -> Result<(), StoreError>;

    /// Returns whether a vote was removed
    async fn delete_vote(&self, user_id: i64) -> Result<bool, StoreError>;
}

/// Thread-safe SQLite store for candidates and votes
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create the SQLite database at the given path
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        // Run migrations on the raw connection before wrapping in Mutex.
        // This avoids blocking_lock() panic when called from async context.
        Self::run_migrations(&conn)?;

        info!("Vote store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        Self::run_migrations(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn run_migrations(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS candidates (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                author TEXT NOT NULL,
                urls TEXT NOT NULL DEFAULT '[]'
            );

            -- One row per user: the UNIQUE constraint backs the single-vote rule
            CREATE TABLE IF NOT EXISTS votes (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                telegram_user_id INTEGER NOT NULL UNIQUE,
                candidate_id INTEGER NOT NULL,
                last_modified TEXT NOT NULL,
                FOREIGN KEY (candidate_id) REFERENCES candidates(id)
            );

            CREATE INDEX IF NOT EXISTS idx_votes_candidate
                ON votes(candidate_id);
            ",
        )
        .context("Failed to run vote store migrations")?;

        Ok(())
    }
}
