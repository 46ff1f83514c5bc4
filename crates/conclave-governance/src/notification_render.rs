//! Comment bodies posted by the engine. Every body that must be posted at
//! most once carries its notification marker.

use crate::notification_marker::{with_notification_marker, NotificationKind, NotificationRecord};
use crate::phase_transition::{TransitionIntent, VotingRound};
use crate::preflight_checks::{CheckSeverity, PreflightResult};
use crate::vote_tally::{VoteCounts, VotingOutcome};

pub fn render_voting_comment(
    issue_number: u64,
    round: VotingRound,
    cycle: usize,
    duration_minutes: Option<u64>,
) -> String {
    let heading = match round {
        VotingRound::Initial => format!("## Voting is open (round {cycle})"),
        VotingRound::Extended => format!("## Extended voting is open (round {cycle})"),
    };
    let closes = match duration_minutes {
        Some(minutes) => format!("Voting closes automatically after {minutes} minutes."),
        None => "Voting closes when a maintainer runs `/conclave tally`.".to_string(),
    };
    let body = format!(
        "{heading}\n\nReact to **this comment** to vote on #{issue_number}:\n\n\
- :+1: ready to implement\n\
- :-1: reject\n\
- :confused: needs more discussion\n\n\
One reaction per person. Reacting with more than one of these counts as no vote.\n\n{closes}"
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(round.notification_kind(), issue_number),
    )
}

fn outcome_summary(intent: &TransitionIntent, round: VotingRound) -> &'static str {
    match (intent.outcome, round) {
        (VotingOutcome::Ready, _) => {
            "The proposal is **ready to implement**. Open a pull request that closes this issue."
        }
        (VotingOutcome::Rejected, _) => "The proposal was **rejected**. Closing and locking.",
        (VotingOutcome::NeedsMoreDiscussion, _) => {
            "The proposal **needs more discussion** and returns to the discussion phase."
        }
        (VotingOutcome::Inconclusive, VotingRound::Initial) => {
            "The vote was **inconclusive**. An extended voting round can be opened."
        }
        (VotingOutcome::Inconclusive, VotingRound::Extended) => {
            "The extended vote was also **inconclusive**. Closing and locking."
        }
        (VotingOutcome::Skipped, _) => "The vote could not be tallied.",
    }
}

pub fn render_outcome_comment(
    issue_number: u64,
    round: VotingRound,
    intent: &TransitionIntent,
    counts: VoteCounts,
) -> String {
    let body = format!(
        "## Voting result: {}\n\n{}\n\n| :+1: | :-1: | :confused: | :eyes: |\n|---|---|---|---|\n| {} | {} | {} | {} |",
        intent.outcome.as_str(),
        outcome_summary(intent, round),
        counts.thumbs_up,
        counts.thumbs_down,
        counts.confused,
        counts.eyes,
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(NotificationKind::VotingOutcome, issue_number),
    )
}

pub fn render_voting_comment_missing(issue_number: u64) -> String {
    let body = format!(
        "Automation could not locate the voting comment for #{issue_number}, so the vote was not tallied. \
A maintainer needs to check the phase labels and reopen voting with `/conclave vote` if needed."
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(NotificationKind::VotingCommentMissing, issue_number),
    )
}

pub fn render_issue_ready_notification(issue_number: u64, pr_number: u64) -> String {
    let body = format!(
        "Issue #{issue_number} is ready for implementation. This pull request (#{pr_number}) \
references it as a closing issue and can now compete as an implementation."
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(NotificationKind::IssueReady, issue_number),
    )
}

pub fn render_intake_accepted(issue_number: u64, competing: usize, max_competing: usize) -> String {
    let body = format!(
        "This pull request was accepted as an implementation candidate for #{issue_number} \
({} of {max_competing} slots in use).",
        competing.saturating_add(1)
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(NotificationKind::IntakeAccepted, issue_number),
    )
}

pub fn render_intake_cap_reached(issue_number: u64, max_competing: usize) -> String {
    let body = format!(
        "Issue #{issue_number} already has {max_competing} competing implementations, so this pull \
request was not added as a candidate. It will be reconsidered if a slot frees up."
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(NotificationKind::IntakeCapReached, issue_number),
    )
}

pub fn render_stale_warning(pr_number: u64, days_inactive: u64, close_at_days: u64) -> String {
    let body = format!(
        "This pull request has had no activity for {days_inactive} days. It will be closed once it \
reaches {close_at_days} days without activity. Any new commit, review, or comment keeps it open."
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(NotificationKind::StaleWarning, pr_number),
    )
}

pub fn render_stale_closed(pr_number: u64, days_inactive: u64) -> String {
    let body = format!(
        "Closing this pull request after {days_inactive} days without activity. Reopen it to continue."
    );
    with_notification_marker(
        &body,
        NotificationRecord::new(NotificationKind::StaleClosed, pr_number),
    )
}

pub fn render_preflight_report(pr_number: u64, result: &PreflightResult) -> String {
    let verdict = if result.all_hard_checks_passed() {
        "all hard checks passed"
    } else {
        "blocked"
    };
    let mut rendered = format!("## Preflight for #{pr_number}: {verdict}\n\n");
    for check in &result.checks {
        let mark = if check.passed { "x" } else { " " };
        let severity = match check.severity {
            CheckSeverity::Hard => "",
            CheckSeverity::Advisory => " _(advisory)_",
        };
        rendered.push_str(&format!(
            "- [{mark}] **{}**{severity}: {}\n",
            check.name.title(),
            check.detail
        ));
    }
    rendered
}
