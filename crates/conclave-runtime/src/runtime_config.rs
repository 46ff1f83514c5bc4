//! Process-level settings shared by every repository in a run.

use anyhow::Result;
use conclave_governance::repo_ref::RepoRef;

use crate::github_api_client::GithubApiClient;
use crate::link_resolver::{LinkResolverSettings, DEFAULT_CROSS_REFERENCE_EVENT_CAP};

pub const DEFAULT_API_BASE: &str = "https://api.github.com";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub api_base: String,
    pub token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
    pub verification_batch_width: usize,
    /// Repositories processed concurrently by multi-repository sweeps.
    pub repo_concurrency: usize,
}

impl RuntimeConfig {
    pub fn link_resolver_settings(&self) -> LinkResolverSettings {
        LinkResolverSettings {
            verification_batch_width: self.verification_batch_width.max(1),
            max_cross_reference_events: DEFAULT_CROSS_REFERENCE_EVENT_CAP,
        }
    }

    pub fn client_for(&self, repo: RepoRef) -> Result<GithubApiClient> {
        GithubApiClient::new(
            self.api_base.clone(),
            self.token.clone(),
            repo,
            self.request_timeout_ms,
            self.retry_max_attempts,
            self.retry_base_delay_ms,
        )
    }
}
