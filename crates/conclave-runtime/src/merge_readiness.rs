//! Merge-readiness evaluation and the readiness label.
//!
//! Two presentations share the same check builders:
//! [`evaluate_merge_readiness`] stops at the first failing hard check and is
//! ordered by call cost, while [`evaluate_preflight_checks`] always runs every
//! check for human-facing reports.

use conclave_governance::github_types::GithubPullRequest;
use conclave_governance::label_catalog::LabelPurpose;
use conclave_governance::preflight_checks::{
    check_approvals, check_ci, check_implementation_label, check_merge_ready_label,
    check_mergeable, check_pull_request_open, PreflightCheckItem, PreflightResult,
};
use conclave_governance::repo_config::{MergeReadinessConfig, RepoConfig};

use crate::engine_error::EngineError;
use crate::label_ops::{add_purpose_label, remove_purpose_label};
use crate::platform::GovernancePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessSkipReason {
    Disabled,
    NotImplementationCandidate,
}

impl ReadinessSkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "merge readiness disabled",
            Self::NotImplementationCandidate => "not an implementation candidate",
        }
    }
}

/// Effect of one evaluation on the readiness label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeReadinessAction {
    Skipped(ReadinessSkipReason),
    Added,
    Removed,
    Noop { labeled: bool },
}

/// Head commit state already known from a webhook payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHead {
    pub sha: String,
    pub mergeable: Option<bool>,
}

/// What the caller already knows about the pull request.
///
/// With `head` set the open check is skipped: only open pull requests fire
/// the events that carry a head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadinessContext {
    pub number: u64,
    pub author: String,
    pub labels: Vec<String>,
    pub head: Option<KnownHead>,
}

impl ReadinessContext {
    pub fn from_pull_request(pr: &GithubPullRequest) -> Self {
        Self {
            number: pr.number,
            author: pr.user.login.clone(),
            labels: pr.label_names(),
            head: Some(KnownHead {
                sha: pr.head.sha.clone(),
                mergeable: pr.mergeable,
            }),
        }
    }

    /// Context with only labels known; the head is fetched on demand.
    pub fn without_head(number: u64, author: impl Into<String>, labels: Vec<String>) -> Self {
        Self {
            number,
            author: author.into(),
            labels,
            head: None,
        }
    }
}

fn log_failed_check(pr: u64, check: &PreflightCheckItem) {
    tracing::debug!(
        pr,
        check = check.name.as_str(),
        detail = %check.detail,
        "readiness check failed"
    );
}

async fn demote(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    context: &ReadinessContext,
    labeled: bool,
) -> Result<MergeReadinessAction, EngineError> {
    if !labeled {
        return Ok(MergeReadinessAction::Noop { labeled: false });
    }
    remove_purpose_label(
        platform,
        &config.labels,
        context.number,
        LabelPurpose::MergeReady,
        &context.labels,
    )
    .await?;
    tracing::info!(repo = %platform.repo(), pr = context.number, "removed readiness label");
    Ok(MergeReadinessAction::Removed)
}

async fn promote(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    context: &ReadinessContext,
    labeled: bool,
) -> Result<MergeReadinessAction, EngineError> {
    if labeled {
        return Ok(MergeReadinessAction::Noop { labeled: true });
    }
    add_purpose_label(
        platform,
        &config.labels,
        context.number,
        LabelPurpose::MergeReady,
        &context.labels,
    )
    .await?;
    tracing::info!(repo = %platform.repo(), pr = context.number, "added readiness label");
    Ok(MergeReadinessAction::Added)
}

/// Short-circuit evaluation that reconciles the readiness label.
///
/// Order: labels (free) -> reviews -> PR fetch when the head is unknown ->
/// mergeable (no call) -> CI (two parallel calls).
pub async fn evaluate_merge_readiness(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    context: &ReadinessContext,
) -> Result<MergeReadinessAction, EngineError> {
    let Some(readiness) = config.merge_readiness.as_ref() else {
        return Ok(MergeReadinessAction::Skipped(ReadinessSkipReason::Disabled));
    };
    if !config.labels.has(LabelPurpose::Implementation, &context.labels) {
        return Ok(MergeReadinessAction::Skipped(
            ReadinessSkipReason::NotImplementationCandidate,
        ));
    }
    let labeled = config.labels.has(LabelPurpose::MergeReady, &context.labels);

    let reviews = platform.list_reviews(context.number).await?;
    let approvals = check_approvals(
        &reviews,
        &context.author,
        &readiness.trusted_reviewers,
        readiness.min_approvals,
    );
    if !approvals.passed {
        log_failed_check(context.number, &approvals);
        return demote(platform, config, context, labeled).await;
    }

    let head = match &context.head {
        Some(head) => head.clone(),
        None => {
            let pr = platform.get_pull_request(context.number).await?;
            let open = check_pull_request_open(&pr.state, pr.is_merged());
            if !open.passed {
                log_failed_check(context.number, &open);
                return demote(platform, config, context, labeled).await;
            }
            KnownHead {
                sha: pr.head.sha,
                mergeable: pr.mergeable,
            }
        }
    };

    let mergeable = check_mergeable(head.mergeable);
    if !mergeable.passed {
        log_failed_check(context.number, &mergeable);
        return demote(platform, config, context, labeled).await;
    }

    let (runs, combined) = tokio::join!(
        platform.list_check_runs(&head.sha),
        platform.get_combined_status(&head.sha)
    );
    let ci = check_ci(&runs?, &combined?);
    if !ci.passed {
        log_failed_check(context.number, &ci);
        return demote(platform, config, context, labeled).await;
    }

    promote(platform, config, context, labeled).await
}

/// Runs every check regardless of earlier failures.
///
/// Returns six checks, or five when the head was supplied by the caller.
/// `Ok(None)` when merge readiness is not configured for the repository.
pub async fn evaluate_preflight_checks(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    context: &ReadinessContext,
) -> Result<Option<PreflightResult>, EngineError> {
    let Some(readiness) = config.merge_readiness.as_ref() else {
        return Ok(None);
    };
    Ok(Some(
        run_preflight_checks(platform, config, readiness, context).await?,
    ))
}

async fn run_preflight_checks(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    readiness: &MergeReadinessConfig,
    context: &ReadinessContext,
) -> Result<PreflightResult, EngineError> {
    let mut checks = Vec::with_capacity(6);
    let mut labels = context.labels.clone();
    let mut author = context.author.clone();
    let head = match &context.head {
        Some(head) => head.clone(),
        None => {
            let pr = platform.get_pull_request(context.number).await?;
            checks.push(check_pull_request_open(&pr.state, pr.is_merged()));
            labels = pr.label_names();
            author = pr.user.login.clone();
            KnownHead {
                sha: pr.head.sha,
                mergeable: pr.mergeable,
            }
        }
    };

    let (reviews, runs, combined) = tokio::join!(
        platform.list_reviews(context.number),
        platform.list_check_runs(&head.sha),
        platform.get_combined_status(&head.sha)
    );
    checks.push(check_approvals(
        &reviews?,
        &author,
        &readiness.trusted_reviewers,
        readiness.min_approvals,
    ));
    checks.push(check_mergeable(head.mergeable));
    checks.push(check_ci(&runs?, &combined?));
    checks.push(check_implementation_label(
        config.labels.has(LabelPurpose::Implementation, &labels),
        config.labels.name(LabelPurpose::Implementation),
    ));
    checks.push(check_merge_ready_label(
        config.labels.has(LabelPurpose::MergeReady, &labels),
        config.labels.name(LabelPurpose::MergeReady),
    ));
    Ok(PreflightResult { checks })
}

/// Applies an exhaustive result to the readiness label.
pub async fn reconcile_readiness_label(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    context: &ReadinessContext,
    result: &PreflightResult,
) -> Result<MergeReadinessAction, EngineError> {
    if config.merge_readiness.is_none() {
        return Ok(MergeReadinessAction::Skipped(ReadinessSkipReason::Disabled));
    }
    if !config.labels.has(LabelPurpose::Implementation, &context.labels) {
        return Ok(MergeReadinessAction::Skipped(
            ReadinessSkipReason::NotImplementationCandidate,
        ));
    }
    let labeled = config.labels.has(LabelPurpose::MergeReady, &context.labels);
    if result.all_hard_checks_passed() {
        promote(platform, config, context, labeled).await
    } else {
        for check in result.failed() {
            log_failed_check(context.number, check);
        }
        demote(platform, config, context, labeled).await
    }
}
