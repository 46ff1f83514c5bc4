//! Scheduled sweeps that re-derive the state the webhook path would have
//! produced. One failing item never aborts a sweep; failures are collected
//! and reported once at the end.

use chrono::{DateTime, Utc};
use conclave_governance::github_types::{
    parse_github_timestamp, GithubIssue, GithubLabel, GithubPullRequest,
};
use conclave_governance::label_catalog::LabelPurpose;
use conclave_governance::phase_transition::VotingRound;
use conclave_governance::repo_config::RepoConfig;

use crate::engine_error::{EngineError, SweepError, SweepFailure, SweepFailures};
use crate::intake::{announce_ready_issue, intake_pull_request, IntakeDecision};
use crate::label_ops::list_issues_with_purpose;
use crate::link_resolver::{resolve_linked_pull_requests, LinkResolverSettings};
use crate::merge_readiness::{
    evaluate_preflight_checks, reconcile_readiness_label, MergeReadinessAction, ReadinessContext,
};
use crate::phase_orchestrator::{
    current_voting_comment, phase_entered_at, resolve_voting, start_voting,
    startable_voting_round, timer_elapsed,
};
use crate::platform::GovernancePlatform;
use crate::stale_sweep::sweep_stale_pull_requests;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub examined: usize,
    pub changed: usize,
}

impl SweepReport {
    fn merge(&mut self, other: SweepReport) {
        self.examined += other.examined;
        self.changed += other.changed;
    }
}

fn enumeration_failed(sweep: &'static str, repo: &str, error: impl std::fmt::Display) -> SweepError {
    let message = error.to_string();
    tracing::error!(repo, sweep, error = %message, "sweep could not enumerate items");
    SweepError::Partial {
        sweep,
        failures: vec![SweepFailure {
            item: repo.to_string(),
            message,
        }],
    }
}

async fn reconcile_candidate(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    context: &ReadinessContext,
) -> Result<MergeReadinessAction, EngineError> {
    let Some(result) = evaluate_preflight_checks(platform, config, context).await? else {
        return Ok(MergeReadinessAction::Noop { labeled: false });
    };
    reconcile_readiness_label(platform, config, context, &result).await
}

async fn open_voting_if_due(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
    round: VotingRound,
    after_minutes: u64,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let comments = platform.list_issue_comments(issue.number).await?;
    let due = phase_entered_at(issue, &comments, config.bot_login())
        .is_some_and(|since| timer_elapsed(since, after_minutes, now));
    if !due {
        return Ok(false);
    }
    start_voting(platform, config, issue, round).await?;
    Ok(true)
}

async fn resolve_voting_if_due(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
    round: VotingRound,
    after_minutes: u64,
    now: DateTime<Utc>,
) -> Result<bool, EngineError> {
    let comments = platform.list_issue_comments(issue.number).await?;
    let due = match current_voting_comment(&comments, issue.number, round, config.bot_login()) {
        Some(comment) => parse_github_timestamp(&comment.created_at)
            .is_some_and(|opened| timer_elapsed(opened, after_minutes, now)),
        // Missing or already-announced round: resolving converges or escalates.
        None => true,
    };
    if !due {
        return Ok(false);
    }
    resolve_voting(platform, config, issue).await?;
    Ok(true)
}

/// Reconciles the readiness label on every implementation candidate.
pub async fn sweep_merge_readiness(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
) -> Result<SweepReport, SweepError> {
    let mut report = SweepReport::default();
    if config.merge_readiness.is_none() {
        return Ok(report);
    }
    let repo = platform.repo().to_string();
    let pulls = platform
        .list_open_pull_requests()
        .await
        .map_err(|error| enumeration_failed("readiness", &repo, error))?;

    let mut failures = SweepFailures::default();
    for pr in pulls
        .iter()
        .filter(|pr| config.labels.has(LabelPurpose::Implementation, &pr.label_names()))
    {
        report.examined += 1;
        let context = ReadinessContext::without_head(pr.number, pr.user.login.clone(), pr.label_names());
        match reconcile_candidate(platform, config, &context).await {
            Ok(MergeReadinessAction::Added | MergeReadinessAction::Removed) => report.changed += 1,
            Ok(_) => {}
            Err(error) => failures.record(format!("{repo}#{}", pr.number), error),
        }
    }
    tracing::info!(
        repo = %repo,
        examined = report.examined,
        changed = report.changed,
        "readiness sweep finished"
    );
    failures.finish("readiness").map(|()| report)
}

/// Posts ready notifications and retries intake for every ready issue.
///
/// The notification and intake are independently idempotent; a failure in
/// one never prevents the other.
pub async fn sweep_ready_notifications(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    settings: LinkResolverSettings,
) -> Result<SweepReport, SweepError> {
    let mut report = SweepReport::default();
    if config.governance.is_none() {
        return Ok(report);
    }
    let repo = platform.repo().to_string();
    let issues = list_issues_with_purpose(platform, &config.labels, LabelPurpose::ReadyToImplement)
        .await
        .map_err(|error| enumeration_failed("notification", &repo, error))?;
    if issues.is_empty() {
        return Ok(report);
    }
    let mut open_pulls: Vec<GithubPullRequest> = platform
        .list_open_pull_requests()
        .await
        .map_err(|error| enumeration_failed("notification", &repo, error))?;

    let mut failures = SweepFailures::default();
    for issue in &issues {
        let resolution = match resolve_linked_pull_requests(platform, issue.number, settings).await {
            Ok(resolution) => resolution,
            Err(error) => {
                failures.record(format!("{repo}#{}", issue.number), error);
                continue;
            }
        };
        for pr_number in &resolution.linked {
            let Some(position) = open_pulls.iter().position(|pr| pr.number == *pr_number) else {
                continue;
            };
            let pr = open_pulls[position].clone();
            if config.labels.has(LabelPurpose::Implementation, &pr.label_names()) {
                continue;
            }
            report.examined += 1;
            let item = format!("{repo}#{pr_number}");

            match announce_ready_issue(platform, config, issue, &pr).await {
                Ok(post) if post.posted() => report.changed += 1,
                Ok(_) => {}
                Err(error) => failures.record(item.clone(), error),
            }

            match intake_pull_request(platform, config, issue, &pr, &resolution.linked, &open_pulls)
                .await
            {
                Ok(IntakeDecision::Accepted { .. }) => {
                    report.changed += 1;
                    open_pulls[position]
                        .labels
                        .push(GithubLabel {
                            name: config.labels.name(LabelPurpose::Implementation).to_string(),
                        });
                }
                Ok(_) => {}
                Err(error) => failures.record(item, error),
            }
        }
    }
    tracing::info!(
        repo = %repo,
        issues = issues.len(),
        examined = report.examined,
        changed = report.changed,
        "notification sweep finished"
    );
    failures.finish("notification").map(|()| report)
}

/// Applies threshold triggers: opens voting after the discussion timer and
/// resolves rounds whose voting timer elapsed.
pub async fn sweep_phase_timers(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    now: DateTime<Utc>,
) -> Result<SweepReport, SweepError> {
    let mut report = SweepReport::default();
    let Some(governance) = config.governance.as_ref() else {
        return Ok(report);
    };
    let repo = platform.repo().to_string();
    let mut failures = SweepFailures::default();

    if let Some(timer) = governance.discussion {
        for purpose in [LabelPurpose::Discussion, LabelPurpose::Inconclusive] {
            let issues = match list_issues_with_purpose(platform, &config.labels, purpose).await {
                Ok(issues) => issues,
                Err(error) => {
                    failures.record(format!("{repo} {}", config.labels.name(purpose)), error);
                    continue;
                }
            };
            for issue in issues {
                let labels = issue.label_names();
                let Some(round) = startable_voting_round(config, &labels) else {
                    continue;
                };
                report.examined += 1;
                match open_voting_if_due(platform, config, &issue, round, timer.after_minutes, now)
                    .await
                {
                    Ok(true) => report.changed += 1,
                    Ok(false) => {}
                    Err(error) => failures.record(format!("{repo}#{}", issue.number), error),
                }
            }
        }
    }

    for (purpose, timer) in [
        (LabelPurpose::Voting, governance.voting),
        (LabelPurpose::ExtendedVoting, governance.extended_voting),
    ] {
        let Some(timer) = timer else {
            continue;
        };
        let issues = match list_issues_with_purpose(platform, &config.labels, purpose).await {
            Ok(issues) => issues,
            Err(error) => {
                failures.record(format!("{repo} {}", config.labels.name(purpose)), error);
                continue;
            }
        };
        let round = match purpose {
            LabelPurpose::ExtendedVoting => VotingRound::Extended,
            _ => VotingRound::Initial,
        };
        for issue in issues {
            report.examined += 1;
            match resolve_voting_if_due(platform, config, &issue, round, timer.after_minutes, now)
                .await
            {
                Ok(true) => report.changed += 1,
                Ok(false) => {}
                Err(error) => failures.record(format!("{repo}#{}", issue.number), error),
            }
        }
    }

    tracing::info!(
        repo = %repo,
        examined = report.examined,
        changed = report.changed,
        "phase sweep finished"
    );
    failures.finish("phase").map(|()| report)
}

/// Runs every sweep for one repository, continuing past failures.
pub async fn run_reconciliation(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    settings: LinkResolverSettings,
    now: DateTime<Utc>,
) -> Result<SweepReport, SweepError> {
    let mut report = SweepReport::default();
    let mut failures = SweepFailures::default();
    let results = [
        sweep_phase_timers(platform, config, now).await,
        sweep_ready_notifications(platform, config, settings).await,
        sweep_merge_readiness(platform, config).await,
        sweep_stale_pull_requests(platform, config, now).await,
    ];
    for result in results {
        match result {
            Ok(partial) => report.merge(partial),
            Err(error) => failures.extend(error),
        }
    }
    failures.finish("reconciliation").map(|()| report)
}
