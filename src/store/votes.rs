use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};

use super::{SqliteStore, StoreError, VoteStore};
use crate::ledger::{BallotSnapshot, Candidate, CandidateTally, Vote};

/// Executes the tally query with the given ORDER BY clause.
/// Takes &Connection directly (caller already holds the lock).
pub(crate) fn query_tallies(
    conn: &Connection,
    order_by: &str,
) -> Result<Vec<CandidateTally>, StoreError> {
    let sql = format!(
        "SELECT c.id, c.name, c.author, c.urls, COUNT(v.id)
         FROM candidates c
         LEFT JOIN votes v ON v.candidate_id = c.id
         GROUP BY c.id
         ORDER BY {}",
        order_by
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, i64>(4)?,
            ))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    rows.into_iter()
        .map(|(id, name, author, urls, votes)| {
            let urls: Vec<String> =
                serde_json::from_str(&urls).map_err(|source| StoreError::Urls {
                    candidate_id: id,
                    source,
                })?;
            Ok(CandidateTally {
                candidate: Candidate {
                    id,
                    name,
                    author,
                    urls,
                },
                votes: votes.max(0) as u64,
            })
        })
        .collect()
}

fn query_vote(conn: &Connection, user_id: i64) -> Result<Option<Vote>, StoreError> {
    let vote = conn
        .query_row(
            "SELECT telegram_user_id, candidate_id, last_modified
             FROM votes WHERE telegram_user_id = ?1",
            rusqlite::params![user_id],
            |row| {
                Ok(Vote {
                    user_id: row.get(0)?,
                    candidate_id: row.get(1)?,
                    last_modified: row.get(2)?,
                })
            },
        )
        .optional()?;
    Ok(vote)
}

#[async_trait]
impl VoteStore for SqliteStore {
    async fn ballot(&self, viewer: Option<i64>) -> Result<BallotSnapshot, StoreError> {
        let conn = self.conn.lock().await;
        let tallies = query_tallies(&conn, "c.id ASC")?;
        let selected = match viewer {
            Some(user_id) => query_vote(&conn, user_id)?.map(|v| v.candidate_id),
            None => None,
        };
        Ok(BallotSnapshot { tallies, selected })
    }

    async fn vote_for_user(&self, user_id: i64) -> Result<Option<Vote>, StoreError> {
        let conn = self.conn.lock().await;
        query_vote(&conn, user_id)
    }

    async fn upsert_vote(&self, vote: &Vote) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO votes (telegram_user_id, candidate_id, last_modified)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(telegram_user_id) DO UPDATE SET
                candidate_id = excluded.candidate_id,
                last_modified = excluded.last_modified",
            rusqlite::params![vote.user_id, vote.candidate_id, vote.last_modified],
        )?;
        Ok(())
    }

    async fn delete_vote(&self, user_id: i64) -> Result<bool, StoreError> {
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM votes WHERE telegram_user_id = ?1",
            rusqlite::params![user_id],
        )?;
        Ok(removed > 0)
    }
}
