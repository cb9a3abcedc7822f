//! Turns a ballot snapshot into message text and an inline button grid.
//!
//! Output depends only on the snapshot: candidates are emitted in the order
//! they appear (ascending id, as returned by the store) and nothing here
//! iterates an unordered collection.

use crate::ledger::BallotSnapshot;

pub const CHECK_MARK: &str = "✅";

/// A single inline button: visible label plus the callback payload sent back on tap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Button {
    pub label: String,
    pub payload: String,
}

/// Rows of inline buttons attached to a message
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ButtonGrid {
    rows: Vec<Vec<Button>>,
}

impl ButtonGrid {
    /// One button per row
    pub fn single_column(buttons: impl IntoIterator<Item = Button>) -> Self {
        Self {
            rows: buttons.into_iter().map(|b| vec![b]).collect(),
        }
    }

    pub fn rows(&self) -> &[Vec<Button>] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.iter().all(|row| row.is_empty())
    }

    pub fn buttons(&self) -> impl Iterator<Item = &Button> {
        self.rows.iter().flatten()
    }
}

/// Rendered ballot ready to be sent or edited in place
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ballot {
    pub text: String,
    pub buttons: ButtonGrid,
}

/// Russian plural classes for a count
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluralForm {
    One,
    Few,
    Many,
}

pub fn plural_form(count: u64) -> PluralForm {
    let last = count % 10;
    let last_two = count % 100;
    if last == 1 && last_two != 11 {
        PluralForm::One
    } else if (2..=4).contains(&last) && !(12..=14).contains(&last_two) {
        PluralForm::Few
    } else {
        PluralForm::Many
    }
}

/// "1 голос", "3 голоса", "11 голосов"
pub fn votes_phrase(count: u64) -> String {
    let word = match plural_form(count) {
        PluralForm::One => "голос",
        PluralForm::Few => "голоса",
        PluralForm::Many => "голосов",
    };
    format!("{} {}", count, word)
}

/// Callback payload carried by a candidate's button
pub fn vote_payload(candidate_id: i64) -> String {
    candidate_id.to_string()
}

/// Inverse of [`vote_payload`]. Rejects anything that would not render back
/// to the same string (signs, padding, leading zeros).
pub fn parse_vote_payload(data: &str) -> Option<i64> {
    let id: i64 = data.parse().ok()?;
    (vote_payload(id) == data).then_some(id)
}

fn candidate_title(id: i64) -> String {
    format!("Проект №{}", id)
}

pub fn render_ballot(snapshot: &BallotSnapshot, show_counts: bool) -> Ballot {
    let mut text = String::new();
    let mut buttons = Vec::with_capacity(snapshot.tallies.len());

    for tally in &snapshot.tallies {
        let candidate = &tally.candidate;
        let title = candidate_title(candidate.id);

        text.push_str(&format!("{}: {}\n", title, candidate.name));
        text.push_str(&format!("Автор {}\n", candidate.author));
        for url in &candidate.urls {
            text.push_str(url);
            text.push('\n');
        }
        text.push('\n');

        let mut label = title;
        if show_counts {
            label.push_str(&format!(" ({})", votes_phrase(tally.votes)));
        }
        if snapshot.selected == Some(candidate.id) {
            label.push(' ');
            label.push_str(CHECK_MARK);
        }

        buttons.push(Button {
            label,
            payload: vote_payload(candidate.id),
        });
    }

    Ballot {
        text,
        buttons: ButtonGrid::single_column(buttons),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Candidate, CandidateTally};
    use proptest::prelude::*;

    fn tally(id: i64, votes: u64, urls: &[&str]) -> CandidateTally {
        CandidateTally {
            candidate: Candidate {
                id,
                name: format!("Project {}", id),
                author: format!("@author{}", id),
                urls: urls.iter().map(|u| u.to_string()).collect(),
            },
            votes,
        }
    }

    #[test]
    fn test_plural_classes() {
        let cases = [
            (1, PluralForm::One),
            (2, PluralForm::Few),
            (3, PluralForm::Few),
            (4, PluralForm::Few),
            (5, PluralForm::Many),
            (11, PluralForm::Many),
            (12, PluralForm::Many),
            (14, PluralForm::Many),
            (21, PluralForm::One),
            (22, PluralForm::Few),
            (25, PluralForm::Many),
            (100, PluralForm::Many),
            (101, PluralForm::One),
            (111, PluralForm::Many),
            (0, PluralForm::Many),
        ];
        for (count, expected) in cases {
            assert_eq!(plural_form(count), expected, "count {}", count);
        }
    }

    #[test]
    fn test_votes_phrase() {
        assert_eq!(votes_phrase(1), "1 голос");
        assert_eq!(votes_phrase(22), "22 голоса");
        assert_eq!(votes_phrase(5), "5 голосов");
        assert_eq!(votes_phrase(0), "0 голосов");
    }

    #[test]
    fn test_render_text_layout() {
        let snapshot = BallotSnapshot {
            tallies: vec![
                tally(1, 0, &["https://a.example/1"]),
                tally(2, 3, &["https://b.example/1", "https://b.example/2"]),
            ],
            selected: None,
        };
        let ballot = render_ballot(&snapshot, false);
        assert_eq!(
            ballot.text,
            "Проект №1: Project 1\nАвтор @author1\nhttps://a.example/1\n\n\
             Проект №2: Project 2\nАвтор @author2\nhttps://b.example/1\nhttps://b.example/2\n\n"
        );
    }

    #[test]
    fn test_render_buttons_with_counts_and_selection() {
        let snapshot = BallotSnapshot {
            tallies: vec![tally(1, 1, &[]), tally(2, 2, &[]), tally(3, 5, &[])],
            selected: Some(2),
        };
        let ballot = render_ballot(&snapshot, true);
        let labels: Vec<&str> = ballot.buttons.buttons().map(|b| b.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "Проект №1 (1 голос)",
                "Проект №2 (2 голоса) ✅",
                "Проект №3 (5 голосов)",
            ]
        );
        let payloads: Vec<&str> = ballot.buttons.buttons().map(|b| b.payload.as_str()).collect();
        assert_eq!(payloads, vec!["1", "2", "3"]);
        assert_eq!(ballot.buttons.rows().len(), 3);
    }

    #[test]
    fn test_render_buttons_without_counts() {
        let snapshot = BallotSnapshot {
            tallies: vec![tally(4, 9, &[])],
            selected: Some(4),
        };
        let ballot = render_ballot(&snapshot, false);
        assert_eq!(ballot.buttons.rows()[0][0].label, "Проект №4 ✅");
    }

    #[test]
    fn test_empty_snapshot_renders_nothing() {
        let ballot = render_ballot(&BallotSnapshot::default(), true);
        assert!(ballot.text.is_empty());
        assert!(ballot.buttons.is_empty());
    }

    #[test]
    fn test_render_is_deterministic() {
        let snapshot = BallotSnapshot {
            tallies: (1..=20).map(|id| tally(id, id as u64 * 7, &["u"])).collect(),
            selected: Some(13),
        };
        assert_eq!(render_ballot(&snapshot, true), render_ballot(&snapshot, true));
    }

    #[test]
    fn test_payload_rejects_noise() {
        assert_eq!(parse_vote_payload("12"), Some(12));
        assert_eq!(parse_vote_payload("+12"), None);
        assert_eq!(parse_vote_payload("012"), None);
        assert_eq!(parse_vote_payload(" 12"), None);
        assert_eq!(parse_vote_payload("12x"), None);
        assert_eq!(parse_vote_payload(""), None);
    }

    proptest! {
        #[test]
        fn payload_round_trips(id in 0i64..1_000_000) {
            prop_assert_eq!(parse_vote_payload(&vote_payload(id)), Some(id));
        }

        #[test]
        fn plural_depends_only_on_last_two_digits(count in 0u64..100_000) {
            prop_assert_eq!(plural_form(count), plural_form(count % 100));
        }
    }
}
