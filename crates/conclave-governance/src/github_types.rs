//! Wire shapes for the GitHub REST payloads the governance engine reads, plus
//! the normalised reference-graph records produced by the GraphQL queries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubUser {
    pub login: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub account_type: Option<String>,
}

impl GithubUser {
    pub fn new(login: impl Into<String>) -> Self {
        Self {
            login: login.into(),
            account_type: None,
        }
    }

    /// True for GitHub App accounts and for the configured automation login.
    pub fn is_automation(&self, bot_login: Option<&str>) -> bool {
        if self.account_type.as_deref() == Some("Bot") || self.login.ends_with("[bot]") {
            return true;
        }
        bot_login.is_some_and(|bot| self.login.eq_ignore_ascii_case(bot.trim()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubLabel {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubIssue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub locked: bool,
    pub created_at: String,
    pub updated_at: String,
    pub user: GithubUser,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    #[serde(default)]
    pub pull_request: Option<Value>,
}

impl GithubIssue {
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }

    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|label| label.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubComment {
    pub id: u64,
    pub body: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub user: GithubUser,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubReaction {
    pub content: String,
    pub user: GithubUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubPullRequestHead {
    pub sha: String,
    #[serde(rename = "ref", default)]
    pub ref_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubPullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub state: String,
    #[serde(default)]
    pub merged: bool,
    #[serde(default)]
    pub merged_at: Option<String>,
    /// `None` while GitHub is still computing mergeability.
    #[serde(default)]
    pub mergeable: Option<bool>,
    #[serde(default)]
    pub draft: bool,
    pub user: GithubUser,
    #[serde(default)]
    pub labels: Vec<GithubLabel>,
    pub head: GithubPullRequestHead,
    pub created_at: String,
    pub updated_at: String,
}

impl GithubPullRequest {
    pub fn is_open(&self) -> bool {
        self.state.eq_ignore_ascii_case("open")
    }

    /// The list endpoint omits `merged`, so `merged_at` is consulted as well.
    pub fn is_merged(&self) -> bool {
        self.merged || self.merged_at.is_some()
    }

    pub fn label_names(&self) -> Vec<String> {
        self.labels.iter().map(|label| label.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GithubReview {
    pub id: u64,
    /// Reviews by deleted accounts arrive with a null user.
    #[serde(default)]
    pub user: Option<GithubUser>,
    pub state: String,
    #[serde(default)]
    pub submitted_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubCheckRun {
    pub id: u64,
    pub name: String,
    pub status: String,
    #[serde(default)]
    pub conclusion: Option<String>,
}

/// One page of check runs plus the total GitHub reports for the ref.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CheckRunListing {
    pub total_count: u64,
    #[serde(default)]
    pub check_runs: Vec<GithubCheckRun>,
}

impl CheckRunListing {
    /// True when the listing was capped and some runs were never observed.
    pub fn is_truncated(&self) -> bool {
        self.total_count > self.check_runs.len() as u64
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct GithubCommitStatus {
    pub context: String,
    pub state: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct GithubCombinedStatus {
    pub state: String,
    #[serde(default)]
    pub total_count: u64,
    #[serde(default)]
    pub statuses: Vec<GithubCommitStatus>,
}

impl GithubCombinedStatus {
    pub fn is_truncated(&self) -> bool {
        self.total_count > self.statuses.len() as u64
    }
}

/// A cross-reference from some issue or pull request to the issue under
/// resolution, flattened out of the GraphQL timeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrossReference {
    pub source_number: Option<u64>,
    pub source_is_pull_request: bool,
    pub source_state: String,
    pub source_repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosingIssueReference {
    pub number: u64,
    pub repository: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestActivity {
    pub kind: String,
    pub actor: Option<GithubUser>,
    pub occurred_at: DateTime<Utc>,
}

/// Parses GitHub's RFC 3339 timestamps into UTC.
pub fn parse_github_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|value| value.with_timezone(&Utc))
}

pub fn has_label<'a>(labels: impl IntoIterator<Item = &'a GithubLabel>, name: &str) -> bool {
    labels
        .into_iter()
        .any(|label| label.name.eq_ignore_ascii_case(name))
}
