use tracing::{debug, info};

use super::votes::query_tallies;
use super::{SqliteStore, StoreError};
use crate::ledger::{Candidate, CandidateTally};

impl SqliteStore {
    /// Insert candidates whose id is not present yet. Existing rows are never
    /// overwritten. Returns the number of inserted candidates.
    pub async fn seed_candidates(&self, candidates: &[Candidate]) -> Result<usize, StoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut inserted = 0;

        for candidate in candidates {
            let urls = serde_json::to_string(&candidate.urls).map_err(|source| {
                StoreError::Urls {
                    candidate_id: candidate.id,
                    source,
                }
            })?;
            let changed = tx.execute(
                "INSERT INTO candidates (id, name, author, urls)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(id) DO NOTHING",
                rusqlite::params![candidate.id, candidate.name, candidate.author, urls],
            )?;
            if changed > 0 {
                debug!(candidate_id = candidate.id, "Seeded candidate");
            }
            inserted += changed;
        }

        tx.commit()?;
        info!(
            "Seeded {} new candidate(s) out of {}",
            inserted,
            candidates.len()
        );
        Ok(inserted)
    }

    /// Candidates ranked by vote count, ties broken by ascending id
    pub async fn standings(&self) -> Result<Vec<CandidateTally>, StoreError> {
        let conn = self.conn.lock().await;
        query_tallies(&conn, "COUNT(v.id) DESC, c.id ASC")
    }
}
