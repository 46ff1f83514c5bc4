//! Applies voting starts and voting outcomes to issues.
//!
//! Every step re-reads the thread before writing, so a run interrupted after
//! any mutation converges on the next attempt without duplicate comments.

use chrono::{DateTime, Duration, Utc};
use conclave_governance::github_types::{parse_github_timestamp, GithubComment, GithubIssue};
use conclave_governance::label_catalog::LabelPurpose;
use conclave_governance::notification_marker::{
    count_notifications, latest_notification, NotificationKind, NotificationRecord,
};
use conclave_governance::notification_render::{
    render_outcome_comment, render_voting_comment, render_voting_comment_missing,
};
use conclave_governance::phase_transition::{
    transition_for, voting_start_for, Phase, VotingRound,
};
use conclave_governance::repo_config::RepoConfig;
use conclave_governance::vote_tally::{determine_outcome, tally_reactions, VoteCounts, VotingOutcome};

use crate::engine_error::EngineError;
use crate::label_ops::{add_purpose_label, remove_purpose_label};
use crate::notification_ledger::post_with_comments;
use crate::platform::GovernancePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingStart {
    Disabled,
    NotInEntryPhase,
    Started {
        round: VotingRound,
        cycle: usize,
        comment_id: u64,
        /// The round comment already existed from an interrupted attempt.
        reused_comment: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VotingResolution {
    Disabled,
    NotVoting,
    Skipped {
        escalation_posted: bool,
    },
    Resolved {
        outcome: VotingOutcome,
        next_phase: Phase,
        counts: VoteCounts,
        outcome_comment_posted: bool,
    },
}

impl VotingResolution {
    pub fn outcome(&self) -> Option<VotingOutcome> {
        match self {
            Self::Resolved { outcome, .. } => Some(*outcome),
            Self::Skipped { .. } => Some(VotingOutcome::Skipped),
            Self::Disabled | Self::NotVoting => None,
        }
    }
}

fn round_record(issue_number: u64, round: VotingRound) -> NotificationRecord {
    NotificationRecord::new(round.notification_kind(), issue_number)
}

fn outcome_record(issue_number: u64) -> NotificationRecord {
    NotificationRecord::new(NotificationKind::VotingOutcome, issue_number)
}

/// Number of voting comments ever posted for the issue, across both rounds.
pub fn voting_cycles(comments: &[GithubComment], issue_number: u64, bot_login: Option<&str>) -> usize {
    [VotingRound::Initial, VotingRound::Extended]
        .into_iter()
        .map(|round| count_notifications(comments, round_record(issue_number, round), bot_login))
        .sum()
}

/// The round whose label the issue currently carries, if it is being voted on.
pub fn active_voting_round(config: &RepoConfig, labels: &[String]) -> Option<VotingRound> {
    match config.labels.phase_of(labels) {
        Some(LabelPurpose::Voting) => Some(VotingRound::Initial),
        Some(LabelPurpose::ExtendedVoting) => Some(VotingRound::Extended),
        _ => None,
    }
}

/// The round that may be opened from the issue's current phase.
pub fn startable_voting_round(config: &RepoConfig, labels: &[String]) -> Option<VotingRound> {
    match config.labels.phase_of(labels) {
        Some(LabelPurpose::Discussion) => Some(VotingRound::Initial),
        Some(LabelPurpose::Inconclusive) => Some(VotingRound::Extended),
        _ => None,
    }
}

/// The voting comment of the open round, if one exists after the last outcome.
pub fn current_voting_comment<'a>(
    comments: &'a [GithubComment],
    issue_number: u64,
    round: VotingRound,
    bot_login: Option<&str>,
) -> Option<&'a GithubComment> {
    let voting = latest_notification(comments, round_record(issue_number, round), bot_login)?;
    let last_outcome = latest_notification(comments, outcome_record(issue_number), bot_login)
        .map(|comment| comment.id)
        .unwrap_or(0);
    (voting.id > last_outcome).then_some(voting)
}

/// When the issue entered its current waiting phase: the last outcome comment
/// if it returned from a vote, otherwise creation.
pub fn phase_entered_at(
    issue: &GithubIssue,
    comments: &[GithubComment],
    bot_login: Option<&str>,
) -> Option<DateTime<Utc>> {
    let returned = latest_notification(comments, outcome_record(issue.number), bot_login)
        .and_then(|comment| parse_github_timestamp(&comment.created_at));
    parse_github_timestamp(&issue.created_at)
        .into_iter()
        .chain(returned)
        .max()
}

pub fn timer_elapsed(since: DateTime<Utc>, after_minutes: u64, now: DateTime<Utc>) -> bool {
    let minutes = i64::try_from(after_minutes).unwrap_or(i64::MAX);
    match since.checked_add_signed(Duration::minutes(minutes)) {
        Some(deadline) => now >= deadline,
        None => false,
    }
}

pub async fn start_voting(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
    round: VotingRound,
) -> Result<VotingStart, EngineError> {
    let Some(governance) = config.governance.as_ref() else {
        return Ok(VotingStart::Disabled);
    };
    let labels = issue.label_names();
    let intent = voting_start_for(round);
    if !issue.is_open() || !config.labels.has(intent.remove_label, &labels) {
        return Ok(VotingStart::NotInEntryPhase);
    }

    let bot_login = config.bot_login();
    let comments = platform.list_issue_comments(issue.number).await?;
    let (comment_id, cycle, reused_comment) =
        match current_voting_comment(&comments, issue.number, round, bot_login) {
            Some(existing) => (
                existing.id,
                voting_cycles(&comments, issue.number, bot_login),
                true,
            ),
            None => {
                let cycle = voting_cycles(&comments, issue.number, bot_login).saturating_add(1);
                let duration = match round {
                    VotingRound::Initial => governance.voting,
                    VotingRound::Extended => governance.extended_voting,
                }
                .map(|timer| timer.after_minutes);
                let body = render_voting_comment(issue.number, round, cycle, duration);
                (platform.create_comment(issue.number, &body).await?, cycle, false)
            }
        };

    add_purpose_label(platform, &config.labels, issue.number, intent.add_label, &labels).await?;
    remove_purpose_label(platform, &config.labels, issue.number, intent.remove_label, &labels)
        .await?;
    tracing::info!(
        repo = %platform.repo(),
        issue = issue.number,
        round = ?round,
        cycle,
        reused_comment,
        "voting started"
    );
    Ok(VotingStart::Started {
        round,
        cycle,
        comment_id,
        reused_comment,
    })
}

pub async fn resolve_voting(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
) -> Result<VotingResolution, EngineError> {
    if config.governance.is_none() {
        return Ok(VotingResolution::Disabled);
    }
    let labels = issue.label_names();
    let Some(round) = active_voting_round(config, &labels) else {
        return Ok(VotingResolution::NotVoting);
    };

    let bot_login = config.bot_login();
    let comments = platform.list_issue_comments(issue.number).await?;
    let Some(voting_comment) = latest_notification(&comments, round_record(issue.number, round), bot_login)
    else {
        return escalate_missing_voting_comment(platform, config, issue, &labels, &comments).await;
    };

    let reactions = platform.list_comment_reactions(voting_comment.id).await?;
    let counts = tally_reactions(&reactions, bot_login);
    let outcome = determine_outcome(counts);
    let intent = transition_for(round, outcome).ok_or_else(|| {
        EngineError::Inconsistent(format!(
            "issue #{}: tally produced non-transitioning outcome {}",
            issue.number,
            outcome.as_str()
        ))
    })?;

    let already_announced = latest_notification(&comments, outcome_record(issue.number), bot_login)
        .is_some_and(|comment| comment.id > voting_comment.id);
    if !already_announced {
        let body = render_outcome_comment(issue.number, round, &intent, counts);
        platform.create_comment(issue.number, &body).await?;
    }

    add_purpose_label(platform, &config.labels, issue.number, intent.add_label, &labels).await?;
    remove_purpose_label(platform, &config.labels, issue.number, intent.remove_label, &labels)
        .await?;
    if intent.close && issue.is_open() {
        platform.close_issue(issue.number).await?;
    }
    if intent.lock && !issue.locked {
        platform.lock_issue(issue.number).await?;
    }
    if intent.unlock && issue.locked {
        platform.unlock_issue(issue.number).await?;
    }

    tracing::info!(
        repo = %platform.repo(),
        issue = issue.number,
        outcome = outcome.as_str(),
        phase = intent.next_phase.as_str(),
        up = counts.thumbs_up,
        down = counts.thumbs_down,
        confused = counts.confused,
        "voting resolved"
    );
    Ok(VotingResolution::Resolved {
        outcome,
        next_phase: intent.next_phase,
        counts,
        outcome_comment_posted: !already_announced,
    })
}

async fn escalate_missing_voting_comment(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
    labels: &[String],
    comments: &[GithubComment],
) -> Result<VotingResolution, EngineError> {
    tracing::warn!(
        repo = %platform.repo(),
        issue = issue.number,
        "voting comment missing; escalating to maintainers"
    );
    let record = NotificationRecord::new(NotificationKind::VotingCommentMissing, issue.number);
    let body = render_voting_comment_missing(issue.number);
    let post = post_with_comments(
        platform,
        issue.number,
        comments,
        record,
        &body,
        config.bot_login(),
    )
    .await?;
    add_purpose_label(
        platform,
        &config.labels,
        issue.number,
        LabelPurpose::NeedsHuman,
        labels,
    )
    .await?;
    Ok(VotingResolution::Skipped {
        escalation_posted: post.posted(),
    })
}
