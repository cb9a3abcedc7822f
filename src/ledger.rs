use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A contest entry that can receive votes
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Candidate {
    pub id: i64,
    pub name: String,
    pub author: String,
    #[serde(default)]
    pub urls: Vec<String>,
}

/// A single user's current selection. At most one exists per user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Vote {
    pub user_id: i64,
    pub candidate_id: i64,
    pub last_modified: DateTime<Utc>,
}

/// A candidate together with the number of live votes it holds
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTally {
    pub candidate: Candidate,
    pub votes: u64,
}

/// Snapshot of the ballot as seen by one user
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BallotSnapshot {
    /// Ordered by ascending candidate id
    pub tallies: Vec<CandidateTally>,
    /// The viewer's current selection, if they have one
    pub selected: Option<i64>,
}

impl BallotSnapshot {
    pub fn is_empty(&self) -> bool {
        self.tallies.is_empty()
    }

    pub fn contains(&self, candidate_id: i64) -> bool {
        self.tallies
            .iter()
            .any(|t| t.candidate.id == candidate_id)
    }
}

/// The mutation a vote callback resolves to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteChange {
    /// First vote from this user
    Cast(Vote),
    /// User switched from `previous` to the candidate in `vote`
    Changed { previous: i64, vote: Vote },
    /// User re-selected their current candidate and withdrew the vote
    Withdrawn { user_id: i64, candidate_id: i64 },
}

impl VoteChange {
    /// The user's selection after the change is applied
    pub fn selected(&self) -> Option<i64> {
        match self {
            VoteChange::Cast(vote) | VoteChange::Changed { vote, .. } => Some(vote.candidate_id),
            VoteChange::Withdrawn { .. } => None,
        }
    }
}

/// Decide what a tap on `candidate_id` does given the user's current vote.
///
/// No vote casts one, a tap on the same candidate withdraws it, and a tap on
/// a different candidate moves the existing vote and refreshes its timestamp.
pub fn resolve_vote(
    current: Option<&Vote>,
    user_id: i64,
    candidate_id: i64,
    now: DateTime<Utc>,
) -> VoteChange {
    match current {
        None => VoteChange::Cast(Vote {
            user_id,
            candidate_id,
            last_modified: now,
        }),
        Some(existing) if existing.candidate_id == candidate_id => VoteChange::Withdrawn {
            user_id,
            candidate_id,
        },
        Some(existing) => VoteChange::Changed {
            previous: existing.candidate_id,
            vote: Vote {
                user_id,
                candidate_id,
                // timestamps never decrease on re-vote
                last_modified: now.max(existing.last_modified),
            },
        },
    }
}
