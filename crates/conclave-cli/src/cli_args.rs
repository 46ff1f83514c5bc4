use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use conclave_runtime::runtime_config::{RuntimeConfig, DEFAULT_API_BASE};

fn parse_positive_usize(value: &str) -> Result<usize, String> {
    let parsed = value
        .parse::<usize>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

fn parse_positive_u64(value: &str) -> Result<u64, String> {
    let parsed = value
        .parse::<u64>()
        .map_err(|error| format!("failed to parse integer: {error}"))?;
    if parsed == 0 {
        return Err("value must be greater than 0".to_string());
    }
    Ok(parsed)
}

#[derive(Debug, Parser)]
#[command(
    name = "conclave",
    about = "Governance and merge-readiness reconciliation for GitHub repositories",
    version
)]
pub struct Cli {
    #[arg(
        long = "github-token",
        env = "GITHUB_TOKEN",
        hide_env_values = true,
        help = "GitHub token used for every API call"
    )]
    pub github_token: String,

    #[arg(
        long = "github-api-base",
        env = "CONCLAVE_API_BASE",
        default_value = DEFAULT_API_BASE,
        help = "GitHub API base URL; GraphQL requests go to <base>/graphql"
    )]
    pub github_api_base: String,

    #[arg(
        long = "request-timeout-ms",
        env = "CONCLAVE_REQUEST_TIMEOUT_MS",
        default_value_t = 30_000,
        value_parser = parse_positive_u64,
        help = "Per-request HTTP timeout in milliseconds"
    )]
    pub request_timeout_ms: u64,

    #[arg(
        long = "retry-max-attempts",
        env = "CONCLAVE_RETRY_MAX_ATTEMPTS",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Attempts per request for transient failures, including the first"
    )]
    pub retry_max_attempts: usize,

    #[arg(
        long = "retry-base-delay-ms",
        env = "CONCLAVE_RETRY_BASE_DELAY_MS",
        default_value_t = 500,
        value_parser = parse_positive_u64,
        help = "Base delay for exponential retry backoff in milliseconds"
    )]
    pub retry_base_delay_ms: u64,

    #[arg(
        long = "verification-batch-width",
        env = "CONCLAVE_VERIFICATION_BATCH_WIDTH",
        default_value_t = 5,
        value_parser = parse_positive_usize,
        help = "Candidate pull requests verified concurrently per batch"
    )]
    pub verification_batch_width: usize,

    #[arg(
        long = "repo-concurrency",
        env = "CONCLAVE_REPO_CONCURRENCY",
        default_value_t = 4,
        value_parser = parse_positive_usize,
        help = "Repositories swept concurrently"
    )]
    pub repo_concurrency: usize,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn runtime_config(&self) -> RuntimeConfig {
        RuntimeConfig {
            api_base: self.github_api_base.trim().to_string(),
            token: self.github_token.clone(),
            request_timeout_ms: self.request_timeout_ms,
            retry_max_attempts: self.retry_max_attempts,
            retry_base_delay_ms: self.retry_base_delay_ms,
            verification_batch_width: self.verification_batch_width,
            repo_concurrency: self.repo_concurrency,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reconcile one or more repositories against their current GitHub state.
    Sweep(SweepArgs),
    /// Handle a single webhook delivery read from disk.
    Webhook(WebhookArgs),
    /// Run every merge-readiness check for one pull request.
    Preflight(PreflightArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SweepKind {
    Phase,
    Notifications,
    Readiness,
    Stale,
}

#[derive(Debug, Args)]
pub struct SweepArgs {
    #[arg(
        long = "repo",
        required = true,
        value_delimiter = ',',
        help = "Repository slug (owner/name); repeat or comma-separate for several"
    )]
    pub repos: Vec<String>,

    #[arg(
        long = "config",
        env = "CONCLAVE_CONFIG",
        help = "Repository configuration TOML shared by every swept repository"
    )]
    pub config: PathBuf,

    #[arg(
        long = "only",
        value_enum,
        help = "Run a single sweep instead of the full reconciliation"
    )]
    pub only: Option<SweepKind>,
}

#[derive(Debug, Args)]
pub struct WebhookArgs {
    #[arg(long = "repo", env = "GITHUB_REPOSITORY", help = "Repository slug (owner/name)")]
    pub repo: String,

    #[arg(long = "config", env = "CONCLAVE_CONFIG", help = "Repository configuration TOML")]
    pub config: PathBuf,

    #[arg(
        long = "event",
        env = "GITHUB_EVENT_NAME",
        help = "Webhook event name as sent in X-GitHub-Event"
    )]
    pub event: String,

    #[arg(
        long = "payload",
        env = "GITHUB_EVENT_PATH",
        help = "Path to the JSON delivery body"
    )]
    pub payload: PathBuf,
}

#[derive(Debug, Args)]
pub struct PreflightArgs {
    #[arg(long = "repo", env = "GITHUB_REPOSITORY", help = "Repository slug (owner/name)")]
    pub repo: String,

    #[arg(long = "config", env = "CONCLAVE_CONFIG", help = "Repository configuration TOML")]
    pub config: PathBuf,

    #[arg(long = "pr", value_parser = parse_positive_u64, help = "Pull request number")]
    pub pr: u64,

    #[arg(long = "post", help = "Also post the report as a pull request comment")]
    pub post: bool,

    #[arg(long = "json", help = "Print the check results as JSON instead of markdown")]
    pub json: bool,

    #[arg(
        long = "fail-on-blocked",
        help = "Exit non-zero when any hard check fails"
    )]
    pub fail_on_blocked: bool,
}
