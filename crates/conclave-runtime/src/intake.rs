//! Admission of pull requests as implementation candidates for ready issues.

use conclave_governance::github_types::{GithubIssue, GithubPullRequest};
use conclave_governance::label_catalog::LabelPurpose;
use conclave_governance::notification_marker::{NotificationKind, NotificationRecord};
use conclave_governance::notification_render::{
    render_intake_accepted, render_intake_cap_reached, render_issue_ready_notification,
};
use conclave_governance::repo_config::RepoConfig;

use crate::engine_error::EngineError;
use crate::label_ops::add_purpose_label;
use crate::notification_ledger::{post_notification_once, NotificationPost};
use crate::platform::GovernancePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeDecision {
    Disabled,
    AlreadyCandidate,
    IssueNotReady,
    Accepted { competing: usize, notice_posted: bool },
    CapReached { competing: usize, notice_posted: bool },
}

/// Labelled candidates for the issue other than `pr_number`.
pub fn competing_candidates(
    config: &RepoConfig,
    open_pulls: &[GithubPullRequest],
    linked: &[u64],
    pr_number: u64,
) -> usize {
    open_pulls
        .iter()
        .filter(|pr| pr.number != pr_number && linked.contains(&pr.number))
        .filter(|pr| {
            config
                .labels
                .has(LabelPurpose::Implementation, &pr.label_names())
        })
        .count()
}

/// Labels `pr` as an implementation of `issue` unless the cap is reached.
///
/// `linked` is the verified set of pull requests closing the issue and
/// `open_pulls` the current open pull request listing.
pub async fn intake_pull_request(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
    pr: &GithubPullRequest,
    linked: &[u64],
    open_pulls: &[GithubPullRequest],
) -> Result<IntakeDecision, EngineError> {
    let Some(intake) = config.intake else {
        return Ok(IntakeDecision::Disabled);
    };
    let pr_labels = pr.label_names();
    if config.labels.has(LabelPurpose::Implementation, &pr_labels) {
        return Ok(IntakeDecision::AlreadyCandidate);
    }
    if !config
        .labels
        .has(LabelPurpose::ReadyToImplement, &issue.label_names())
    {
        return Ok(IntakeDecision::IssueNotReady);
    }

    let competing = competing_candidates(config, open_pulls, linked, pr.number);
    if competing >= intake.max_competing_prs {
        let record = NotificationRecord::new(NotificationKind::IntakeCapReached, issue.number);
        let body = render_intake_cap_reached(issue.number, intake.max_competing_prs);
        let post =
            post_notification_once(platform, pr.number, record, &body, config.bot_login()).await?;
        tracing::info!(
            repo = %platform.repo(),
            issue = issue.number,
            pr = pr.number,
            competing,
            "intake cap reached"
        );
        return Ok(IntakeDecision::CapReached {
            competing,
            notice_posted: post.posted(),
        });
    }

    add_purpose_label(
        platform,
        &config.labels,
        pr.number,
        LabelPurpose::Implementation,
        &pr_labels,
    )
    .await?;
    let record = NotificationRecord::new(NotificationKind::IntakeAccepted, issue.number);
    let body = render_intake_accepted(issue.number, competing, intake.max_competing_prs);
    let post = post_notification_once(platform, pr.number, record, &body, config.bot_login()).await?;
    tracing::info!(
        repo = %platform.repo(),
        issue = issue.number,
        pr = pr.number,
        competing,
        "accepted implementation candidate"
    );
    Ok(IntakeDecision::Accepted {
        competing,
        notice_posted: post.posted(),
    })
}

/// Posts the one-time "issue is ready" notice on a linked pull request.
pub async fn announce_ready_issue(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
    pr: &GithubPullRequest,
) -> Result<NotificationPost, EngineError> {
    let record = NotificationRecord::new(NotificationKind::IssueReady, issue.number);
    let body = render_issue_ready_notification(issue.number, pr.number);
    Ok(post_notification_once(platform, pr.number, record, &body, config.bot_login()).await?)
}
