//! Phase state machine expressed as a lookup table of transition intents.
//!
//! ```text
//! Discussion --trigger--> Voting --outcome--> Ready | Rejected | Discussion | Inconclusive
//! Inconclusive --trigger--> ExtendedVoting --outcome--> Ready | Rejected | Discussion | InconclusiveFinal
//! ```

use serde::{Deserialize, Serialize};

use crate::label_catalog::LabelPurpose;
use crate::notification_marker::NotificationKind;
use crate::vote_tally::VotingOutcome;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VotingRound {
    Initial,
    Extended,
}

impl VotingRound {
    pub fn label(&self) -> LabelPurpose {
        match self {
            Self::Initial => LabelPurpose::Voting,
            Self::Extended => LabelPurpose::ExtendedVoting,
        }
    }

    /// The phase an item must be in for this round to open.
    pub fn entry_label(&self) -> LabelPurpose {
        match self {
            Self::Initial => LabelPurpose::Discussion,
            Self::Extended => LabelPurpose::Inconclusive,
        }
    }

    pub fn notification_kind(&self) -> NotificationKind {
        match self {
            Self::Initial => NotificationKind::Voting,
            Self::Extended => NotificationKind::ExtendedVoting,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Discussion,
    Voting,
    ExtendedVoting,
    Ready,
    Rejected,
    Inconclusive,
    InconclusiveFinal,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Discussion => "discussion",
            Self::Voting => "voting",
            Self::ExtendedVoting => "extended_voting",
            Self::Ready => "ready",
            Self::Rejected => "rejected",
            Self::Inconclusive => "inconclusive",
            Self::InconclusiveFinal => "inconclusive_final",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Rejected | Self::InconclusiveFinal)
    }
}

/// Everything one voting resolution does to the issue, applied as one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionIntent {
    pub outcome: VotingOutcome,
    pub next_phase: Phase,
    pub remove_label: LabelPurpose,
    pub add_label: LabelPurpose,
    pub close: bool,
    pub lock: bool,
    /// Clears an operator lock so downstream automation can keep commenting.
    pub unlock: bool,
}

/// Resolves the transition for a tally result.
///
/// Returns `None` for [`VotingOutcome::Skipped`], which never transitions.
pub fn transition_for(round: VotingRound, outcome: VotingOutcome) -> Option<TransitionIntent> {
    let remove_label = round.label();
    let intent = |next_phase, add_label, close, lock, unlock| TransitionIntent {
        outcome,
        next_phase,
        remove_label,
        add_label,
        close,
        lock,
        unlock,
    };
    let table = match (round, outcome) {
        (_, VotingOutcome::Skipped) => return None,
        (_, VotingOutcome::Ready) => {
            intent(Phase::Ready, LabelPurpose::ReadyToImplement, false, false, true)
        }
        (_, VotingOutcome::Rejected) => {
            intent(Phase::Rejected, LabelPurpose::Rejected, true, true, false)
        }
        (_, VotingOutcome::NeedsMoreDiscussion) => {
            intent(Phase::Discussion, LabelPurpose::Discussion, false, false, true)
        }
        (VotingRound::Initial, VotingOutcome::Inconclusive) => intent(
            Phase::Inconclusive,
            LabelPurpose::Inconclusive,
            false,
            false,
            false,
        ),
        (VotingRound::Extended, VotingOutcome::Inconclusive) => intent(
            Phase::InconclusiveFinal,
            LabelPurpose::Inconclusive,
            true,
            true,
            false,
        ),
    };
    Some(table)
}

/// Intent for opening a voting round: swap entry label for the round label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VotingStartIntent {
    pub round: VotingRound,
    pub remove_label: LabelPurpose,
    pub add_label: LabelPurpose,
    pub comment_kind: NotificationKind,
}

pub fn voting_start_for(round: VotingRound) -> VotingStartIntent {
    VotingStartIntent {
        round,
        remove_label: round.entry_label(),
        add_label: round.label(),
        comment_kind: round.notification_kind(),
    }
}
