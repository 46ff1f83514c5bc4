//! Stale pull request sweep.
//!
//! Warning and closing comments are posted at most once per inactivity
//! period: a matching comment newer than the last human activity counts as
//! already posted.

use chrono::{DateTime, Utc};
use conclave_governance::github_types::{parse_github_timestamp, GithubComment, GithubPullRequest};
use conclave_governance::label_catalog::LabelPurpose;
use conclave_governance::notification_marker::{
    comment_matches, NotificationKind, NotificationRecord,
};
use conclave_governance::notification_render::{render_stale_closed, render_stale_warning};
use conclave_governance::repo_config::RepoConfig;
use conclave_governance::stale_lifecycle::{
    decide_stale_action, last_human_activity, whole_days_between, StaleAction, StaleState,
    StaleThresholds,
};

use crate::engine_error::{EngineError, SweepError, SweepFailure, SweepFailures};
use crate::label_ops::{add_purpose_label, remove_purpose_label};
use crate::platform::GovernancePlatform;
use crate::reconciliation::SweepReport;

fn posted_since(
    comments: &[GithubComment],
    record: NotificationRecord,
    since: DateTime<Utc>,
    bot_login: Option<&str>,
) -> bool {
    comments.iter().any(|comment| {
        comment_matches(comment, record, bot_login).is_some()
            && parse_github_timestamp(&comment.created_at).is_some_and(|stamp| stamp >= since)
    })
}

async fn post_once_since(
    platform: &dyn GovernancePlatform,
    pr_number: u64,
    record: NotificationRecord,
    body: &str,
    since: DateTime<Utc>,
    bot_login: Option<&str>,
) -> Result<bool, EngineError> {
    let comments = platform.list_issue_comments(pr_number).await?;
    if posted_since(&comments, record, since, bot_login) {
        return Ok(false);
    }
    platform.create_comment(pr_number, body).await?;
    Ok(true)
}

/// Evaluates one pull request and applies the resulting stale action.
pub async fn apply_stale_lifecycle(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    pr: &GithubPullRequest,
    thresholds: StaleThresholds,
    now: DateTime<Utc>,
) -> Result<StaleAction, EngineError> {
    let bot_login = config.bot_login();
    let created_at = parse_github_timestamp(&pr.created_at).ok_or_else(|| {
        EngineError::Inconsistent(format!(
            "pr #{}: unparseable created_at {:?}",
            pr.number, pr.created_at
        ))
    })?;
    let activity = platform.list_pull_request_activity(pr.number).await?;
    let last_activity = last_human_activity(&activity, created_at, bot_login);
    let days_inactive = whole_days_between(last_activity, now);
    let labels = pr.label_names();
    let state = StaleState::from_label(config.labels.has(LabelPurpose::Stale, &labels));
    let action = decide_stale_action(state, days_inactive, thresholds);

    match action {
        StaleAction::None => {}
        StaleAction::Warn => {
            let record = NotificationRecord::new(NotificationKind::StaleWarning, pr.number);
            let body = render_stale_warning(pr.number, days_inactive, thresholds.close_at_days());
            post_once_since(platform, pr.number, record, &body, last_activity, bot_login).await?;
            add_purpose_label(platform, &config.labels, pr.number, LabelPurpose::Stale, &labels)
                .await?;
        }
        StaleAction::Close => {
            let record = NotificationRecord::new(NotificationKind::StaleClosed, pr.number);
            let body = render_stale_closed(pr.number, days_inactive);
            post_once_since(platform, pr.number, record, &body, last_activity, bot_login).await?;
            platform.close_issue(pr.number).await?;
        }
        StaleAction::Recover => {
            remove_purpose_label(platform, &config.labels, pr.number, LabelPurpose::Stale, &labels)
                .await?;
        }
    }
    if action != StaleAction::None {
        tracing::info!(
            repo = %platform.repo(),
            pr = pr.number,
            action = action.as_str(),
            days_inactive,
            "applied stale lifecycle"
        );
    }
    Ok(action)
}

pub async fn sweep_stale_pull_requests(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    now: DateTime<Utc>,
) -> Result<SweepReport, SweepError> {
    let mut report = SweepReport::default();
    let Some(stale) = config.stale else {
        return Ok(report);
    };
    let thresholds = StaleThresholds {
        warn_at_days: stale.warn_after_days,
    };
    let repo = platform.repo().to_string();
    let pulls = platform.list_open_pull_requests().await.map_err(|error| {
        tracing::error!(repo = %repo, error = %error, "stale sweep could not list pull requests");
        SweepError::Partial {
            sweep: "stale",
            failures: vec![SweepFailure {
                item: repo.clone(),
                message: error.to_string(),
            }],
        }
    })?;

    let mut failures = SweepFailures::default();
    for pr in &pulls {
        report.examined += 1;
        match apply_stale_lifecycle(platform, config, pr, thresholds, now).await {
            Ok(StaleAction::None) => {}
            Ok(_) => report.changed += 1,
            Err(error) => failures.record(format!("{repo}#{}", pr.number), error),
        }
    }
    tracing::info!(
        repo = %repo,
        examined = report.examined,
        changed = report.changed,
        "stale sweep finished"
    );
    failures.finish("stale").map(|()| report)
}
