//! Webhook fast path.
//!
//! Decoded deliveries are mapped onto the same engine operations the sweeps
//! use, with whatever context the payload already carries. A delivery that is
//! lost or fails here is repaired by the next sweep.

use conclave_governance::github_types::{
    GithubComment, GithubIssue, GithubLabel, GithubPullRequest,
};
use conclave_governance::governance_command::{parse_governance_command, GovernanceCommand};
use conclave_governance::label_catalog::LabelPurpose;
use conclave_governance::notification_render::render_preflight_report;
use conclave_governance::repo_config::RepoConfig;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::engine_error::EngineError;
use crate::intake::{announce_ready_issue, intake_pull_request, IntakeDecision};
use crate::link_resolver::{
    closing_issues_for_pull_request, resolve_linked_pull_requests, LinkResolverSettings,
};
use crate::merge_readiness::{
    evaluate_merge_readiness, evaluate_preflight_checks, MergeReadinessAction, ReadinessContext,
};
use crate::phase_orchestrator::{
    resolve_voting, start_voting, startable_voting_round, VotingResolution, VotingStart,
};
use crate::platform::GovernancePlatform;

#[derive(Debug, Error)]
#[error("invalid {event} payload: {source}")]
pub struct WebhookPayloadError {
    pub event: String,
    #[source]
    pub source: serde_json::Error,
}

#[derive(Debug, Deserialize)]
struct IssueCommentPayload {
    action: String,
    issue: GithubIssue,
    comment: GithubComment,
}

#[derive(Debug, Deserialize)]
struct PullRequestPayload {
    action: String,
    pull_request: GithubPullRequest,
}

#[derive(Debug, Deserialize)]
struct PullRequestReviewPayload {
    action: String,
    pull_request: GithubPullRequest,
}

#[derive(Debug, Deserialize)]
struct PullRequestNumber {
    number: u64,
}

#[derive(Debug, Deserialize)]
struct CheckUnit {
    head_sha: String,
    #[serde(default)]
    pull_requests: Vec<PullRequestNumber>,
}

#[derive(Debug, Deserialize)]
struct CheckSuitePayload {
    action: String,
    check_suite: CheckUnit,
}

#[derive(Debug, Deserialize)]
struct CheckRunPayload {
    action: String,
    check_run: CheckUnit,
}

#[derive(Debug, Deserialize)]
struct StatusPayload {
    sha: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullRequestAction {
    Opened,
    Edited,
    Reopened,
    Synchronize,
    Labeled,
    Unlabeled,
}

impl PullRequestAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "opened" => Some(Self::Opened),
            "edited" => Some(Self::Edited),
            "reopened" => Some(Self::Reopened),
            "synchronize" => Some(Self::Synchronize),
            "labeled" => Some(Self::Labeled),
            "unlabeled" => Some(Self::Unlabeled),
            _ => None,
        }
    }

    /// Actions that can change which issues the pull request closes.
    fn affects_links(&self) -> bool {
        matches!(self, Self::Opened | Self::Edited | Self::Reopened)
    }
}

#[derive(Debug, Clone)]
pub enum GovernanceEvent {
    CommentCreated {
        issue: GithubIssue,
        comment: GithubComment,
    },
    PullRequestChanged {
        action: PullRequestAction,
        pull_request: GithubPullRequest,
    },
    ReviewSubmitted {
        pull_request: GithubPullRequest,
    },
    ChecksCompleted {
        head_sha: String,
        pull_requests: Vec<u64>,
    },
    StatusChanged {
        sha: String,
    },
}

fn decode<T: for<'de> Deserialize<'de>>(event: &str, payload: &Value) -> Result<T, WebhookPayloadError> {
    T::deserialize(payload).map_err(|source| WebhookPayloadError {
        event: event.to_string(),
        source,
    })
}

/// Maps a delivery (`X-GitHub-Event` name plus JSON body) to an engine event.
///
/// Returns `Ok(None)` for events and actions this engine does not act on.
pub fn parse_webhook_event(
    event_name: &str,
    payload: &Value,
) -> Result<Option<GovernanceEvent>, WebhookPayloadError> {
    let event = match event_name {
        "issue_comment" => {
            let payload: IssueCommentPayload = decode(event_name, payload)?;
            (payload.action == "created").then_some(GovernanceEvent::CommentCreated {
                issue: payload.issue,
                comment: payload.comment,
            })
        }
        "pull_request" => {
            let payload: PullRequestPayload = decode(event_name, payload)?;
            PullRequestAction::parse(&payload.action).map(|action| {
                GovernanceEvent::PullRequestChanged {
                    action,
                    pull_request: payload.pull_request,
                }
            })
        }
        "pull_request_review" => {
            let payload: PullRequestReviewPayload = decode(event_name, payload)?;
            (payload.action == "submitted").then_some(GovernanceEvent::ReviewSubmitted {
                pull_request: payload.pull_request,
            })
        }
        "check_suite" => {
            let payload: CheckSuitePayload = decode(event_name, payload)?;
            (payload.action == "completed").then(|| GovernanceEvent::ChecksCompleted {
                head_sha: payload.check_suite.head_sha,
                pull_requests: payload
                    .check_suite
                    .pull_requests
                    .iter()
                    .map(|pr| pr.number)
                    .collect(),
            })
        }
        "check_run" => {
            let payload: CheckRunPayload = decode(event_name, payload)?;
            (payload.action == "completed").then(|| GovernanceEvent::ChecksCompleted {
                head_sha: payload.check_run.head_sha,
                pull_requests: payload
                    .check_run
                    .pull_requests
                    .iter()
                    .map(|pr| pr.number)
                    .collect(),
            })
        }
        "status" => {
            let payload: StatusPayload = decode(event_name, payload)?;
            Some(GovernanceEvent::StatusChanged { sha: payload.sha })
        }
        _ => None,
    };
    Ok(event)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Ignored(&'static str),
    VotingStarted(VotingStart),
    VotingResolved(VotingResolution),
    PreflightPosted { comment_id: u64, passed: bool },
    PullRequestProcessed {
        intake: Vec<(u64, IntakeDecision)>,
        readiness: MergeReadinessAction,
    },
    Readiness(Vec<(u64, MergeReadinessAction)>),
}

pub async fn dispatch_event(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    settings: LinkResolverSettings,
    event: GovernanceEvent,
) -> Result<DispatchOutcome, EngineError> {
    match event {
        GovernanceEvent::CommentCreated { issue, comment } => {
            dispatch_command(platform, config, &issue, &comment).await
        }
        GovernanceEvent::PullRequestChanged {
            action,
            pull_request,
        } => dispatch_pull_request(platform, config, settings, action, &pull_request).await,
        GovernanceEvent::ReviewSubmitted { pull_request } => {
            // Review payloads omit mergeability, so the head is re-read.
            let context = ReadinessContext::without_head(
                pull_request.number,
                pull_request.user.login.clone(),
                pull_request.label_names(),
            );
            let action = evaluate_merge_readiness(platform, config, &context).await?;
            Ok(DispatchOutcome::Readiness(vec![(pull_request.number, action)]))
        }
        GovernanceEvent::ChecksCompleted {
            head_sha,
            pull_requests,
        } => dispatch_checks(platform, config, &head_sha, pull_requests).await,
        GovernanceEvent::StatusChanged { sha } => {
            dispatch_checks(platform, config, &sha, Vec::new()).await
        }
    }
}

async fn dispatch_command(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    issue: &GithubIssue,
    comment: &GithubComment,
) -> Result<DispatchOutcome, EngineError> {
    if comment.user.is_automation(config.bot_login()) {
        return Ok(DispatchOutcome::Ignored("automation comment"));
    }
    let Some(Ok(command)) = parse_governance_command(comment.body.as_deref().unwrap_or_default())
    else {
        return Ok(DispatchOutcome::Ignored("not a governance command"));
    };
    let Some(governance) = config.governance.as_ref() else {
        return Ok(DispatchOutcome::Ignored("governance disabled"));
    };
    if !governance.is_maintainer(&comment.user.login) {
        tracing::debug!(
            issue = issue.number,
            actor = %comment.user.login,
            command = command.as_str(),
            "ignoring command from non-maintainer"
        );
        return Ok(DispatchOutcome::Ignored("actor is not a maintainer"));
    }

    match command {
        GovernanceCommand::Vote => {
            if issue.is_pull_request() {
                return Ok(DispatchOutcome::Ignored("vote on pull request"));
            }
            let Some(round) = startable_voting_round(config, &issue.label_names()) else {
                return Ok(DispatchOutcome::Ignored("issue is not awaiting a vote"));
            };
            let started = start_voting(platform, config, issue, round).await?;
            Ok(DispatchOutcome::VotingStarted(started))
        }
        GovernanceCommand::Tally => {
            if issue.is_pull_request() {
                return Ok(DispatchOutcome::Ignored("tally on pull request"));
            }
            let resolution = resolve_voting(platform, config, issue).await?;
            Ok(DispatchOutcome::VotingResolved(resolution))
        }
        GovernanceCommand::Preflight => {
            if !issue.is_pull_request() {
                return Ok(DispatchOutcome::Ignored("preflight on issue"));
            }
            let context = ReadinessContext::without_head(
                issue.number,
                issue.user.login.clone(),
                issue.label_names(),
            );
            let Some(result) = evaluate_preflight_checks(platform, config, &context).await? else {
                return Ok(DispatchOutcome::Ignored("merge readiness disabled"));
            };
            let body = render_preflight_report(issue.number, &result);
            let comment_id = platform.create_comment(issue.number, &body).await?;
            Ok(DispatchOutcome::PreflightPosted {
                comment_id,
                passed: result.all_hard_checks_passed(),
            })
        }
    }
}

async fn dispatch_pull_request(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    settings: LinkResolverSettings,
    action: PullRequestAction,
    pull_request: &GithubPullRequest,
) -> Result<DispatchOutcome, EngineError> {
    if !pull_request.is_open() {
        return Ok(DispatchOutcome::Ignored("pull request is not open"));
    }
    let mut intake = Vec::new();
    let mut pull_request = pull_request.clone();
    if action.affects_links() && config.governance.is_some() {
        intake = admit_to_ready_issues(platform, config, settings, &pull_request).await?;
        if intake
            .iter()
            .any(|(_, decision)| matches!(decision, IntakeDecision::Accepted { .. }))
        {
            pull_request.labels.push(GithubLabel {
                name: config.labels.name(LabelPurpose::Implementation).to_string(),
            });
        }
    }
    let context = ReadinessContext::from_pull_request(&pull_request);
    let readiness = evaluate_merge_readiness(platform, config, &context).await?;
    Ok(DispatchOutcome::PullRequestProcessed { intake, readiness })
}

async fn admit_to_ready_issues(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    settings: LinkResolverSettings,
    pull_request: &GithubPullRequest,
) -> Result<Vec<(u64, IntakeDecision)>, EngineError> {
    if config
        .labels
        .has(LabelPurpose::Implementation, &pull_request.label_names())
    {
        return Ok(Vec::new());
    }
    let mut decisions = Vec::new();
    let mut open_pulls: Option<Vec<GithubPullRequest>> = None;
    for issue_number in closing_issues_for_pull_request(platform, pull_request).await? {
        let issue = platform.get_issue(issue_number).await?;
        if !issue.is_open()
            || !config
                .labels
                .has(LabelPurpose::ReadyToImplement, &issue.label_names())
        {
            continue;
        }
        if let Err(error) = announce_ready_issue(platform, config, &issue, pull_request).await {
            tracing::warn!(
                repo = %platform.repo(),
                issue = issue_number,
                pr = pull_request.number,
                error = %error,
                "ready announcement failed; continuing with intake"
            );
        }
        let resolution = resolve_linked_pull_requests(platform, issue_number, settings).await?;
        let pulls = match open_pulls.take() {
            Some(pulls) => pulls,
            None => platform.list_open_pull_requests().await?,
        };
        let decision = intake_pull_request(
            platform,
            config,
            &issue,
            pull_request,
            &resolution.linked,
            &pulls,
        )
        .await?;
        decisions.push((issue_number, decision));
        open_pulls = Some(pulls);
        if matches!(decision, IntakeDecision::Accepted { .. }) {
            break;
        }
    }
    Ok(decisions)
}

async fn dispatch_checks(
    platform: &dyn GovernancePlatform,
    config: &RepoConfig,
    head_sha: &str,
    pull_requests: Vec<u64>,
) -> Result<DispatchOutcome, EngineError> {
    if config.merge_readiness.is_none() {
        return Ok(DispatchOutcome::Ignored("merge readiness disabled"));
    }
    let mut targets = Vec::new();
    if pull_requests.is_empty() {
        // Fork heads and commit statuses do not name their pull requests.
        targets.extend(
            platform
                .list_open_pull_requests()
                .await?
                .into_iter()
                .filter(|pr| pr.head.sha == head_sha),
        );
    } else {
        for number in pull_requests {
            targets.push(platform.get_pull_request(number).await?);
        }
    }

    let mut actions = Vec::new();
    for pr in targets.iter().filter(|pr| pr.is_open()) {
        let context = ReadinessContext::from_pull_request(pr);
        actions.push((pr.number, evaluate_merge_readiness(platform, config, &context).await?));
    }
    Ok(DispatchOutcome::Readiness(actions))
}
