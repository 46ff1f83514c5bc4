use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use conclave_governance::notification_render::render_preflight_report;
use conclave_governance::preflight_checks::CheckSeverity;
use conclave_governance::repo_config::RepoConfig;
use conclave_governance::repo_ref::RepoRef;
use conclave_runtime::merge_readiness::{
    evaluate_preflight_checks, MergeReadinessAction, ReadinessContext,
};
use conclave_runtime::phase_orchestrator::{VotingResolution, VotingStart};
use conclave_runtime::reconciliation::{
    run_reconciliation, sweep_merge_readiness, sweep_phase_timers, sweep_ready_notifications,
    SweepReport,
};
use conclave_runtime::stale_sweep::sweep_stale_pull_requests;
use conclave_runtime::webhook_dispatch::{dispatch_event, parse_webhook_event, DispatchOutcome};
use conclave_runtime::{GithubApiClient, GovernancePlatform, RuntimeConfig};
use futures_util::stream::{self, StreamExt};

use crate::cli_args::{Cli, Command, PreflightArgs, SweepArgs, SweepKind, WebhookArgs};

pub async fn run_cli(cli: Cli) -> Result<()> {
    let runtime = cli.runtime_config();
    match cli.command {
        Command::Sweep(args) => run_sweep(&runtime, &args, Utc::now()).await,
        Command::Webhook(args) => run_webhook(&runtime, &args).await,
        Command::Preflight(args) => run_preflight(&runtime, &args).await,
    }
}

fn load_repo_config(path: &Path) -> Result<RepoConfig> {
    RepoConfig::load(path)
        .with_context(|| format!("failed to load repository config {}", path.display()))
}

/// Builds the client for `slug` and fills in the bot login when the config
/// leaves it out.
async fn open_repository(
    runtime: &RuntimeConfig,
    slug: &str,
    config: &RepoConfig,
) -> Result<(GithubApiClient, RepoConfig)> {
    let repo = RepoRef::parse(slug).with_context(|| format!("invalid repository '{slug}'"))?;
    let client = runtime.client_for(repo)?;
    let mut config = config.clone();
    if config.bot_login().is_none() {
        let login = client
            .resolve_bot_login()
            .await
            .context("failed to resolve bot login from the authenticated account")?;
        tracing::debug!(repo = slug, bot_login = %login, "resolved bot login");
        config.bot_login = Some(login);
    }
    Ok((client, config))
}

async fn sweep_repository(
    runtime: &RuntimeConfig,
    slug: &str,
    config: &RepoConfig,
    only: Option<SweepKind>,
    now: DateTime<Utc>,
) -> Result<SweepReport> {
    let (client, config) = open_repository(runtime, slug, config).await?;
    let settings = runtime.link_resolver_settings();
    let report = match only {
        None => run_reconciliation(&client, &config, settings, now).await?,
        Some(SweepKind::Phase) => sweep_phase_timers(&client, &config, now).await?,
        Some(SweepKind::Notifications) => {
            sweep_ready_notifications(&client, &config, settings).await?
        }
        Some(SweepKind::Readiness) => sweep_merge_readiness(&client, &config).await?,
        Some(SweepKind::Stale) => sweep_stale_pull_requests(&client, &config, now).await?,
    };
    Ok(report)
}

pub(crate) async fn run_sweep(
    runtime: &RuntimeConfig,
    args: &SweepArgs,
    now: DateTime<Utc>,
) -> Result<()> {
    let config = load_repo_config(&args.config)?;
    let results = stream::iter(args.repos.iter())
        .map(|slug| {
            let config = &config;
            async move {
                let result = sweep_repository(runtime, slug, config, args.only, now).await;
                (slug.as_str(), result)
            }
        })
        .buffer_unordered(runtime.repo_concurrency.max(1))
        .collect::<Vec<_>>()
        .await;

    let mut failed = Vec::new();
    for (slug, result) in results {
        match result {
            Ok(report) => {
                println!(
                    "{slug}: examined={} changed={}",
                    report.examined, report.changed
                );
            }
            Err(error) => {
                tracing::error!(repo = slug, error = %format!("{error:#}"), "repository sweep failed");
                failed.push(format!("{slug}: {error:#}"));
            }
        }
    }
    if failed.is_empty() {
        return Ok(());
    }
    failed.sort();
    Err(anyhow!(
        "sweep failed for {} of {} repositories:\n{}",
        failed.len(),
        args.repos.len(),
        failed.join("\n")
    ))
}

pub(crate) async fn run_webhook(runtime: &RuntimeConfig, args: &WebhookArgs) -> Result<()> {
    let raw = tokio::fs::read_to_string(&args.payload)
        .await
        .with_context(|| format!("failed to read webhook payload {}", args.payload.display()))?;
    let payload: serde_json::Value = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse webhook payload {}", args.payload.display()))?;
    let Some(event) = parse_webhook_event(&args.event, &payload)? else {
        tracing::info!(event = %args.event, "ignoring unhandled webhook event");
        println!("ignored: unhandled {} delivery", args.event);
        return Ok(());
    };

    let config = load_repo_config(&args.config)?;
    let (client, config) = open_repository(runtime, &args.repo, &config).await?;
    let outcome = dispatch_event(&client, &config, runtime.link_resolver_settings(), event)
        .await
        .with_context(|| format!("failed to handle {} delivery for {}", args.event, args.repo))?;
    println!("{}", describe_outcome(&outcome));
    Ok(())
}

fn describe_readiness(action: MergeReadinessAction) -> String {
    match action {
        MergeReadinessAction::Skipped(reason) => format!("skipped ({})", reason.as_str()),
        MergeReadinessAction::Added => "label added".to_string(),
        MergeReadinessAction::Removed => "label removed".to_string(),
        MergeReadinessAction::Noop { labeled: true } => "unchanged (labelled)".to_string(),
        MergeReadinessAction::Noop { labeled: false } => "unchanged (not labelled)".to_string(),
    }
}

pub(crate) fn describe_outcome(outcome: &DispatchOutcome) -> String {
    match outcome {
        DispatchOutcome::Ignored(reason) => format!("ignored: {reason}"),
        DispatchOutcome::VotingStarted(VotingStart::Started {
            cycle,
            comment_id,
            reused_comment,
            ..
        }) => format!(
            "voting started: cycle={cycle} comment={comment_id} reused={reused_comment}"
        ),
        DispatchOutcome::VotingStarted(VotingStart::Disabled) => {
            "ignored: governance disabled".to_string()
        }
        DispatchOutcome::VotingStarted(VotingStart::NotInEntryPhase) => {
            "ignored: issue is not awaiting a vote".to_string()
        }
        DispatchOutcome::VotingResolved(VotingResolution::Resolved {
            outcome,
            next_phase,
            ..
        }) => format!(
            "voting resolved: outcome={} next_phase={}",
            outcome.as_str(),
            next_phase.as_str()
        ),
        DispatchOutcome::VotingResolved(VotingResolution::Skipped { escalation_posted }) => {
            format!("voting skipped: escalation_posted={escalation_posted}")
        }
        DispatchOutcome::VotingResolved(VotingResolution::Disabled) => {
            "ignored: governance disabled".to_string()
        }
        DispatchOutcome::VotingResolved(VotingResolution::NotVoting) => {
            "ignored: issue is not being voted on".to_string()
        }
        DispatchOutcome::PreflightPosted { comment_id, passed } => {
            format!("preflight posted: comment={comment_id} passed={passed}")
        }
        DispatchOutcome::PullRequestProcessed { intake, readiness } => {
            let intake = intake
                .iter()
                .map(|(issue, decision)| format!("#{issue}={decision:?}"))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "pull request processed: intake=[{intake}] readiness={}",
                describe_readiness(*readiness)
            )
        }
        DispatchOutcome::Readiness(actions) => actions
            .iter()
            .map(|(pr, action)| format!("#{pr}: {}", describe_readiness(*action)))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub(crate) async fn run_preflight(runtime: &RuntimeConfig, args: &PreflightArgs) -> Result<()> {
    let output = preflight_output(runtime, args).await?;
    println!("{output}");
    Ok(())
}

async fn preflight_output(runtime: &RuntimeConfig, args: &PreflightArgs) -> Result<String> {
    let config = load_repo_config(&args.config)?;
    let (client, config) = open_repository(runtime, &args.repo, &config).await?;
    // Author and labels are re-read together with the head.
    let context = ReadinessContext::without_head(args.pr, String::new(), Vec::new());
    let Some(result) = evaluate_preflight_checks(&client, &config, &context)
        .await
        .with_context(|| format!("preflight failed for {}#{}", args.repo, args.pr))?
    else {
        bail!("merge readiness is not configured for {}", args.repo);
    };

    let report = render_preflight_report(args.pr, &result);
    if args.post {
        let comment_id = client
            .create_comment(args.pr, &report)
            .await
            .with_context(|| format!("failed to post preflight report on #{}", args.pr))?;
        tracing::info!(repo = %args.repo, pr = args.pr, comment_id, "posted preflight report");
    }
    if args.fail_on_blocked && !result.all_hard_checks_passed() {
        let blocked = result
            .failed()
            .filter(|check| check.severity == CheckSeverity::Hard)
            .map(|check| check.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        bail!("pull request #{} is blocked by: {blocked}", args.pr);
    }
    if args.json {
        return serde_json::to_string_pretty(&result).context("failed to encode preflight result");
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::{DateTime, Utc};
    use conclave_runtime::merge_readiness::MergeReadinessAction;
    use conclave_runtime::webhook_dispatch::DispatchOutcome;
    use conclave_runtime::RuntimeConfig;
    use httpmock::prelude::*;
    use serde_json::json;
    use tempfile::TempDir;

    use super::{describe_outcome, preflight_output, run_sweep, run_webhook};
    use crate::cli_args::{PreflightArgs, SweepArgs, SweepKind, WebhookArgs};

    fn runtime(api_base: String) -> RuntimeConfig {
        RuntimeConfig {
            api_base,
            token: "test-token".to_string(),
            request_timeout_ms: 2_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
            verification_batch_width: 2,
            repo_concurrency: 2,
        }
    }

    fn write_config(dir: &TempDir, raw: &str) -> PathBuf {
        let path = dir.path().join("conclave.toml");
        std::fs::write(&path, raw).expect("write config");
        path
    }

    fn now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-03-02T00:00:00Z")
            .expect("timestamp")
            .with_timezone(&Utc)
    }

    fn pull_request_json(number: u64, labels: &[&str]) -> serde_json::Value {
        json!({
            "number": number,
            "title": "Implement the proposal",
            "body": "Fixes #1",
            "state": "open",
            "mergeable": true,
            "user": {"login": "carol"},
            "labels": labels.iter().map(|name| json!({"name": name})).collect::<Vec<_>>(),
            "head": {"sha": "abc123", "ref": "feature"},
            "created_at": "2026-03-01T00:00:00Z",
            "updated_at": "2026-03-01T00:00:00Z"
        })
    }

    fn preflight_args(config: PathBuf) -> PreflightArgs {
        PreflightArgs {
            repo: "hivemind/colony".to_string(),
            config,
            pr: 7,
            post: false,
            json: false,
            fail_on_blocked: false,
        }
    }

    #[tokio::test]
    async fn integration_preflight_resolves_bot_login_and_renders_report() {
        let server = MockServer::start();
        let viewer = server.mock(|when, then| {
            when.method(GET).path("/user");
            then.status(200).json_body(json!({"login": "conclave-bot"}));
        });
        let pull = server.mock(|when, then| {
            when.method(GET).path("/repos/hivemind/colony/pulls/7");
            then.status(200)
                .json_body(pull_request_json(7, &["implementation"]));
        });
        let reviews = server.mock(|when, then| {
            when.method(GET).path("/repos/hivemind/colony/pulls/7/reviews");
            then.status(200).json_body(json!([{
                "id": 1,
                "user": {"login": "alice"},
                "state": "APPROVED",
                "submitted_at": "2026-03-01T01:00:00Z"
            }]));
        });
        let runs = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/hivemind/colony/commits/abc123/check-runs");
            then.status(200).json_body(json!({
                "total_count": 1,
                "check_runs": [{"id": 1, "name": "build", "status": "completed", "conclusion": "success"}]
            }));
        });
        let status = server.mock(|when, then| {
            when.method(GET)
                .path("/repos/hivemind/colony/commits/abc123/status");
            then.status(200)
                .json_body(json!({"state": "pending", "total_count": 0, "statuses": []}));
        });
        let dir = TempDir::new().expect("tempdir");
        let config = write_config(&dir, "[merge_readiness]\ntrusted_reviewers = [\"alice\"]\n");

        let report = preflight_output(&runtime(server.base_url()), &preflight_args(config))
            .await
            .expect("preflight");

        assert!(report.starts_with("## Preflight for #7: all hard checks passed"));
        viewer.assert_calls(1);
        pull.assert_calls(1);
        reviews.assert_calls(1);
        runs.assert_calls(1);
        status.assert_calls(1);
    }

    #[tokio::test]
    async fn functional_preflight_fail_on_blocked_names_failing_checks() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/repos/hivemind/colony/pulls/7");
            then.status(200).json_body(pull_request_json(7, &[]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/repos/hivemind/colony/pulls/7/reviews");
            then.status(200).json_body(json!([]));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/hivemind/colony/commits/abc123/check-runs");
            then.status(200)
                .json_body(json!({"total_count": 0, "check_runs": []}));
        });
        server.mock(|when, then| {
            when.method(GET)
                .path("/repos/hivemind/colony/commits/abc123/status");
            then.status(200)
                .json_body(json!({"state": "pending", "total_count": 0, "statuses": []}));
        });
        let post = server.mock(|when, then| {
            when.method(POST)
                .path("/repos/hivemind/colony/issues/7/comments")
                .body_includes("blocked");
            then.status(201).json_body(json!({"id": 900}));
        });
        let dir = TempDir::new().expect("tempdir");
        let config = write_config(
            &dir,
            "bot_login = \"conclave-bot\"\n[merge_readiness]\ntrusted_reviewers = [\"alice\"]\n",
        );
        let mut args = preflight_args(config);
        args.post = true;
        args.fail_on_blocked = true;

        let error = preflight_output(&runtime(server.base_url()), &args)
            .await
            .expect_err("blocked");

        let message = error.to_string();
        assert!(message.starts_with("pull request #7 is blocked by:"));
        assert!(message.contains("approvals"));
        assert!(!message.contains("implementation-label"));
        post.assert_calls(1);
    }

    #[tokio::test]
    async fn regression_preflight_without_readiness_config_is_an_error() {
        let server = MockServer::start();
        let dir = TempDir::new().expect("tempdir");
        let config = write_config(&dir, "bot_login = \"conclave-bot\"\n");

        let error = preflight_output(&runtime(server.base_url()), &preflight_args(config))
            .await
            .expect_err("not configured");

        assert_eq!(
            error.to_string(),
            "merge readiness is not configured for hivemind/colony"
        );
    }

    #[tokio::test]
    async fn unit_unhandled_webhook_event_makes_no_api_calls() {
        let server = MockServer::start();
        let any = server.mock(|when, then| {
            when.any_request();
            then.status(500);
        });
        let dir = TempDir::new().expect("tempdir");
        let payload = dir.path().join("event.json");
        std::fs::write(&payload, r#"{"action": "created"}"#).expect("write payload");
        let args = WebhookArgs {
            repo: "hivemind/colony".to_string(),
            config: dir.path().join("missing.toml"),
            event: "fork".to_string(),
            payload,
        };

        run_webhook(&runtime(server.base_url()), &args)
            .await
            .expect("ignored");

        any.assert_calls(0);
    }

    #[tokio::test]
    async fn regression_malformed_webhook_payload_reports_path() {
        let server = MockServer::start();
        let dir = TempDir::new().expect("tempdir");
        let payload = dir.path().join("event.json");
        std::fs::write(&payload, "{not json").expect("write payload");
        let args = WebhookArgs {
            repo: "hivemind/colony".to_string(),
            config: dir.path().join("conclave.toml"),
            event: "issue_comment".to_string(),
            payload: payload.clone(),
        };

        let error = run_webhook(&runtime(server.base_url()), &args)
            .await
            .expect_err("malformed");

        assert!(error
            .to_string()
            .contains(&payload.display().to_string()));
    }

    #[tokio::test]
    async fn functional_sweep_reports_every_failed_repository_and_runs_the_rest() {
        let server = MockServer::start();
        let pulls = server.mock(|when, then| {
            when.method(GET).path("/repos/hivemind/colony/pulls");
            then.status(200).json_body(json!([]));
        });
        let broken = server.mock(|when, then| {
            when.method(GET).path("/repos/hivemind/broken/pulls");
            then.status(403).body("resource not accessible by integration");
        });
        let dir = TempDir::new().expect("tempdir");
        let config = write_config(
            &dir,
            "bot_login = \"conclave-bot\"\n[merge_readiness]\ntrusted_reviewers = [\"alice\"]\n",
        );
        let args = SweepArgs {
            repos: vec![
                "hivemind/colony".to_string(),
                "hivemind/broken".to_string(),
                "not-a-slug".to_string(),
            ],
            config,
            only: Some(SweepKind::Readiness),
        };

        let error = run_sweep(&runtime(server.base_url()), &args, now())
            .await
            .expect_err("partial failure");

        let message = format!("{error:#}");
        assert!(message.starts_with("sweep failed for 2 of 3 repositories"));
        assert!(message.contains("hivemind/broken"));
        assert!(message.contains("not-a-slug"));
        pulls.assert_calls(1);
        broken.assert_calls(1);
    }

    #[test]
    fn unit_describe_outcome_summarises_readiness_actions() {
        let outcome = DispatchOutcome::Readiness(vec![
            (4, MergeReadinessAction::Added),
            (5, MergeReadinessAction::Noop { labeled: false }),
        ]);

        assert_eq!(
            describe_outcome(&outcome),
            "#4: label added\n#5: unchanged (not labelled)"
        );
        assert_eq!(
            describe_outcome(&DispatchOutcome::Ignored("automation comment")),
            "ignored: automation comment"
        );
    }
}
