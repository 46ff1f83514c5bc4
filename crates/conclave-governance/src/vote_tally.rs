//! Vote counting and outcome selection for both voting rounds.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::github_types::GithubReaction;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteCounts {
    pub thumbs_up: u64,
    pub thumbs_down: u64,
    pub confused: u64,
    pub eyes: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingOutcome {
    Ready,
    Rejected,
    NeedsMoreDiscussion,
    Inconclusive,
    /// The tagged voting comment could not be located; never a tally result.
    Skipped,
}

impl VotingOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Rejected => "rejected",
            Self::NeedsMoreDiscussion => "needs_more_discussion",
            Self::Inconclusive => "inconclusive",
            Self::Skipped => "skipped",
        }
    }
}

/// Maps reaction counts to an outcome.
///
/// Abstention majority is checked first, so `confused` dominates regardless of
/// the yes/no split. Ties, including 0/0, are inconclusive.
pub fn determine_outcome(counts: VoteCounts) -> VotingOutcome {
    let decided = counts.thumbs_up.saturating_add(counts.thumbs_down);
    if counts.confused > decided {
        VotingOutcome::NeedsMoreDiscussion
    } else if counts.thumbs_up > counts.thumbs_down {
        VotingOutcome::Ready
    } else if counts.thumbs_down > counts.thumbs_up {
        VotingOutcome::Rejected
    } else {
        VotingOutcome::Inconclusive
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Ballot {
    Up,
    Down,
    Confused,
}

fn ballot_for(content: &str) -> Option<Ballot> {
    match content {
        "+1" => Some(Ballot::Up),
        "-1" => Some(Ballot::Down),
        "confused" => Some(Ballot::Confused),
        _ => None,
    }
}

/// Builds counts from raw reactions on the voting comment.
///
/// Each voter gets one ballot. A voter who reacted with more than one ballot
/// category is discarded; automation accounts never vote. `eyes` is tallied
/// for visibility but is not a ballot, so it never invalidates one.
pub fn tally_reactions(reactions: &[GithubReaction], bot_login: Option<&str>) -> VoteCounts {
    let mut ballots: BTreeMap<String, BTreeSet<Ballot>> = BTreeMap::new();
    let mut watchers: BTreeSet<String> = BTreeSet::new();
    for reaction in reactions {
        if reaction.user.is_automation(bot_login) {
            continue;
        }
        let voter = reaction.user.login.to_ascii_lowercase();
        if reaction.content == "eyes" {
            watchers.insert(voter);
            continue;
        }
        if let Some(ballot) = ballot_for(&reaction.content) {
            ballots.entry(voter).or_default().insert(ballot);
        }
    }

    let mut counts = VoteCounts {
        eyes: watchers.len() as u64,
        ..VoteCounts::default()
    };
    for categories in ballots.values() {
        if categories.len() != 1 {
            continue;
        }
        match categories.iter().next() {
            Some(Ballot::Up) => counts.thumbs_up += 1,
            Some(Ballot::Down) => counts.thumbs_down += 1,
            Some(Ballot::Confused) => counts.confused += 1,
            None => {}
        }
    }
    counts
}
