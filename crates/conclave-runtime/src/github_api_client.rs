//! reqwest-backed [`GovernancePlatform`] for GitHub REST and GraphQL.
//!
//! Transport retries with backoff live here and only here; the engine never
//! retries and relies on the next sweep instead.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use conclave_governance::github_transport_helpers::{
    classify_github_status, is_retryable_github_status, is_retryable_transport_error,
    parse_retry_after, rate_limit_exhausted, retry_delay, truncate_for_error, StatusClass,
};
use conclave_governance::github_types::{
    parse_github_timestamp, CheckRunListing, ClosingIssueReference, CrossReference,
    GithubComment, GithubCombinedStatus, GithubIssue, GithubPullRequest, GithubReaction,
    GithubReview, GithubUser, PullRequestActivity,
};
use conclave_governance::repo_ref::RepoRef;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api_error::{ApiError, LabelChange};
use crate::platform::GovernancePlatform;

const PAGE_SIZE: usize = 100;
const MAX_PAGES: u32 = 50;
const CROSS_REFERENCE_PAGE_SIZE: usize = 100;
const CLOSING_REFERENCE_LIMIT: usize = 50;
const ERROR_BODY_MAX_CHARS: usize = 800;

const CROSS_REFERENCES_QUERY: &str = r#"
query($owner: String!, $name: String!, $number: Int!, $first: Int!, $after: String) {
  repository(owner: $owner, name: $name) {
    issue(number: $number) {
      timelineItems(itemTypes: [CROSS_REFERENCED_EVENT], first: $first, after: $after) {
        pageInfo { hasNextPage endCursor }
        nodes {
          ... on CrossReferencedEvent {
            source {
              __typename
              ... on PullRequest { number state repository { nameWithOwner } }
              ... on Issue { number state repository { nameWithOwner } }
            }
          }
        }
      }
    }
  }
}"#;

const CLOSING_REFERENCES_QUERY: &str = r#"
query($owner: String!, $name: String!, $number: Int!, $first: Int!) {
  repository(owner: $owner, name: $name) {
    pullRequest(number: $number) {
      closingIssuesReferences(first: $first) {
        nodes { number repository { nameWithOwner } }
      }
    }
  }
}"#;

#[derive(Debug, Deserialize)]
struct CommentCreateResponse {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct GraphqlErrorEntry {
    message: String,
    #[serde(rename = "type", default)]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlErrorEntry>,
}

#[derive(Clone)]
pub struct GithubApiClient {
    http: reqwest::Client,
    api_base: String,
    graphql_url: String,
    repo: RepoRef,
    retry_max_attempts: usize,
    retry_base_delay_ms: u64,
}

impl GithubApiClient {
    pub fn new(
        api_base: String,
        token: String,
        repo: RepoRef,
        request_timeout_ms: u64,
        retry_max_attempts: usize,
        retry_base_delay_ms: u64,
    ) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_static("conclave-governance"),
        );
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "x-github-api-version",
            reqwest::header::HeaderValue::from_static("2022-11-28"),
        );
        let auth_header = format!("Bearer {}", token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&auth_header)
                .context("invalid github authorization header")?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .context("failed to create github api client")?;
        let api_base = api_base.trim_end_matches('/').to_string();
        Ok(Self {
            http: client,
            graphql_url: graphql_url_for(&api_base),
            api_base,
            repo,
            retry_max_attempts: retry_max_attempts.max(1),
            retry_base_delay_ms: retry_base_delay_ms.max(1),
        })
    }

    /// Login of the authenticated account, used when no bot login is configured.
    pub async fn resolve_bot_login(&self) -> Result<String, ApiError> {
        #[derive(Deserialize)]
        struct Viewer {
            login: String,
        }

        let url = format!("{}/user", self.api_base);
        let viewer: Viewer = self
            .request_json("resolve bot login", || self.http.get(&url))
            .await?;
        Ok(viewer.login)
    }

    fn repo_url(&self, suffix: &str) -> String {
        format!(
            "{}/repos/{}/{}{}",
            self.api_base, self.repo.owner, self.repo.name, suffix
        )
    }

    async fn send<F>(&self, operation: &str, mut request_builder: F) -> Result<reqwest::Response, ApiError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            attempt = attempt.saturating_add(1);
            let response = request_builder()
                .header(
                    "x-conclave-retry-attempt",
                    attempt.saturating_sub(1).to_string(),
                )
                .send()
                .await;
            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let exhausted = rate_limit_exhausted(response.headers());
                    let retry_after = parse_retry_after(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.retry_max_attempts
                        && is_retryable_github_status(status.as_u16(), exhausted)
                    {
                        tokio::time::sleep(retry_delay(
                            self.retry_base_delay_ms,
                            attempt,
                            retry_after,
                        ))
                        .await;
                        continue;
                    }
                    return Err(api_error_for_status(
                        operation,
                        status.as_u16(),
                        exhausted,
                        &body,
                    ));
                }
                Err(error) => {
                    if attempt < self.retry_max_attempts && is_retryable_transport_error(&error) {
                        tokio::time::sleep(retry_delay(self.retry_base_delay_ms, attempt, None))
                            .await;
                        continue;
                    }
                    return Err(ApiError::transient(operation, error.to_string()));
                }
            }
        }
    }

    async fn request_json<T, F>(&self, operation: &str, request_builder: F) -> Result<T, ApiError>
    where
        T: DeserializeOwned,
        F: FnMut() -> reqwest::RequestBuilder,
    {
        let response = self.send(operation, request_builder).await?;
        response.json::<T>().await.map_err(|error| ApiError::Decode {
            operation: operation.to_string(),
            message: error.to_string(),
        })
    }

    async fn request_empty<F>(&self, operation: &str, request_builder: F) -> Result<(), ApiError>
    where
        F: FnMut() -> reqwest::RequestBuilder,
    {
        self.send(operation, request_builder).await.map(|_| ())
    }

    async fn paginate<T>(
        &self,
        operation: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, ApiError>
    where
        T: DeserializeOwned,
    {
        let mut rows = Vec::new();
        for page in 1..=MAX_PAGES {
            let page_value = page.to_string();
            let per_page = PAGE_SIZE.to_string();
            let chunk: Vec<T> = self
                .request_json(operation, || {
                    self.http.get(url).query(query).query(&[
                        ("per_page", per_page.as_str()),
                        ("page", page_value.as_str()),
                    ])
                })
                .await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PAGE_SIZE {
                break;
            }
        }
        Ok(rows)
    }

    async fn graphql(&self, operation: &str, query: &str, variables: Value) -> Result<Value, ApiError> {
        let payload = json!({ "query": query, "variables": variables });
        let response: GraphqlResponse = self
            .request_json(operation, || self.http.post(&self.graphql_url).json(&payload))
            .await
            .map_err(|error| match error {
                ApiError::NotFound { operation } => ApiError::Unsupported {
                    operation,
                    message: "graphql endpoint is unavailable".to_string(),
                },
                other => other,
            })?;
        graphql_data(operation, response)
    }
}

fn graphql_url_for(api_base: &str) -> String {
    match api_base.strip_suffix("/api/v3") {
        Some(host) => format!("{host}/api/graphql"),
        None => format!("{api_base}/graphql"),
    }
}

fn api_error_for_status(operation: &str, status: u16, exhausted: bool, body: &str) -> ApiError {
    let operation = operation.to_string();
    let message = truncate_for_error(body, ERROR_BODY_MAX_CHARS);
    match classify_github_status(status, exhausted) {
        StatusClass::NotFound => ApiError::NotFound { operation },
        StatusClass::Conflict => ApiError::Conflict { operation, message },
        StatusClass::Transient => ApiError::Transient {
            operation,
            message: format!("status {status}: {message}"),
        },
        StatusClass::Rejected => ApiError::Rejected {
            operation,
            status,
            message,
        },
    }
}

fn graphql_data(operation: &str, response: GraphqlResponse) -> Result<Value, ApiError> {
    let operation_name = operation.to_string();
    if !response.errors.is_empty() {
        let message = response
            .errors
            .iter()
            .map(|error| error.message.as_str())
            .collect::<Vec<_>>()
            .join("; ");
        let kinds = response
            .errors
            .iter()
            .filter_map(|error| error.kind.as_deref())
            .collect::<Vec<_>>();
        if kinds.contains(&"NOT_FOUND") {
            return Err(ApiError::NotFound {
                operation: operation_name,
            });
        }
        if kinds.contains(&"RATE_LIMITED") {
            return Err(ApiError::transient(operation_name, message));
        }
        if kinds.contains(&"undefinedField") || message.contains("doesn't exist on type") {
            return Err(ApiError::unsupported(operation_name, message));
        }
        return Err(ApiError::Rejected {
            operation: operation_name,
            status: 200,
            message: truncate_for_error(&message, ERROR_BODY_MAX_CHARS),
        });
    }
    response.data.ok_or_else(|| ApiError::Decode {
        operation: operation_name,
        message: "graphql response carried no data".to_string(),
    })
}

fn cross_reference_from_node(node: &Value) -> Option<CrossReference> {
    let source = node.get("source")?;
    let typename = source.get("__typename")?.as_str()?;
    Some(CrossReference {
        source_number: source.get("number").and_then(Value::as_u64),
        source_is_pull_request: typename == "PullRequest",
        source_state: source
            .get("state")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        source_repository: source
            .pointer("/repository/nameWithOwner")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    })
}

fn activity_from_timeline_item(item: &Value) -> Option<PullRequestActivity> {
    let kind = item.get("event")?.as_str()?.to_string();
    let actor = item
        .get("actor")
        .or_else(|| item.get("user"))
        .filter(|value| !value.is_null())
        .and_then(|value| serde_json::from_value::<GithubUser>(value.clone()).ok());
    let occurred_at = ["/created_at", "/submitted_at", "/committer/date", "/author/date"]
        .iter()
        .find_map(|pointer| item.pointer(pointer).and_then(Value::as_str))
        .and_then(parse_github_timestamp)?;
    Some(PullRequestActivity {
        kind,
        actor,
        occurred_at,
    })
}

#[async_trait]
impl GovernancePlatform for GithubApiClient {
    fn repo(&self) -> &RepoRef {
        &self.repo
    }

    async fn get_issue(&self, number: u64) -> Result<GithubIssue, ApiError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        self.request_json("get issue", || self.http.get(&url)).await
    }

    async fn list_open_issues_with_label(&self, label: &str) -> Result<Vec<GithubIssue>, ApiError> {
        let url = self.repo_url("/issues");
        let rows: Vec<GithubIssue> = self
            .paginate(
                "list labelled issues",
                &url,
                &[("state", "open"), ("labels", label)],
            )
            .await?;
        Ok(rows
            .into_iter()
            .filter(|issue| !issue.is_pull_request())
            .collect())
    }

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<GithubComment>, ApiError> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        self.paginate("list issue comments", &url, &[]).await
    }

    async fn create_comment(&self, number: u64, body: &str) -> Result<u64, ApiError> {
        let url = self.repo_url(&format!("/issues/{number}/comments"));
        let payload = json!({ "body": body });
        let created: CommentCreateResponse = self
            .request_json("create issue comment", || {
                self.http.post(&url).json(&payload)
            })
            .await?;
        Ok(created.id)
    }

    async fn add_label(&self, number: u64, label: &str) -> Result<LabelChange, ApiError> {
        let url = self.repo_url(&format!("/issues/{number}/labels"));
        let payload = json!({ "labels": [label] });
        match self
            .request_empty("add label", || self.http.post(&url).json(&payload))
            .await
        {
            Ok(()) => Ok(LabelChange::Added),
            Err(ApiError::Conflict { .. }) => Ok(LabelChange::AlreadyPresent),
            Err(error) => Err(error),
        }
    }

    async fn remove_label(&self, number: u64, label: &str) -> Result<LabelChange, ApiError> {
        let url = self.repo_url(&format!(
            "/issues/{number}/labels/{}",
            urlencoding::encode(label)
        ));
        match self
            .request_empty("remove label", || self.http.delete(&url))
            .await
        {
            Ok(()) => Ok(LabelChange::Removed),
            Err(ApiError::NotFound { .. }) => Ok(LabelChange::AlreadyAbsent),
            Err(error) => Err(error),
        }
    }

    async fn close_issue(&self, number: u64) -> Result<(), ApiError> {
        let url = self.repo_url(&format!("/issues/{number}"));
        let payload = json!({ "state": "closed" });
        self.request_empty("close issue", || self.http.patch(&url).json(&payload))
            .await
    }

    async fn lock_issue(&self, number: u64) -> Result<(), ApiError> {
        let url = self.repo_url(&format!("/issues/{number}/lock"));
        let payload = json!({ "lock_reason": "resolved" });
        self.request_empty("lock issue", || self.http.put(&url).json(&payload))
            .await
    }

    async fn unlock_issue(&self, number: u64) -> Result<(), ApiError> {
        let url = self.repo_url(&format!("/issues/{number}/lock"));
        self.request_empty("unlock issue", || self.http.delete(&url))
            .await
    }

    async fn list_comment_reactions(&self, comment_id: u64) -> Result<Vec<GithubReaction>, ApiError> {
        let url = self.repo_url(&format!("/issues/comments/{comment_id}/reactions"));
        self.paginate("list comment reactions", &url, &[]).await
    }

    async fn list_open_pull_requests(&self) -> Result<Vec<GithubPullRequest>, ApiError> {
        let url = self.repo_url("/pulls");
        self.paginate("list pull requests", &url, &[("state", "open")])
            .await
    }

    async fn get_pull_request(&self, number: u64) -> Result<GithubPullRequest, ApiError> {
        let url = self.repo_url(&format!("/pulls/{number}"));
        self.request_json("get pull request", || self.http.get(&url))
            .await
    }

    async fn list_reviews(&self, number: u64) -> Result<Vec<GithubReview>, ApiError> {
        let url = self.repo_url(&format!("/pulls/{number}/reviews"));
        self.paginate("list reviews", &url, &[]).await
    }

    async fn list_check_runs(&self, sha: &str) -> Result<CheckRunListing, ApiError> {
        let url = self.repo_url(&format!("/commits/{sha}/check-runs"));
        let per_page = PAGE_SIZE.to_string();
        self.request_json("list check runs", || {
            self.http
                .get(&url)
                .query(&[("per_page", per_page.as_str()), ("filter", "latest")])
        })
        .await
    }

    async fn get_combined_status(&self, sha: &str) -> Result<GithubCombinedStatus, ApiError> {
        let url = self.repo_url(&format!("/commits/{sha}/status"));
        self.request_json("get combined status", || {
            self.http.get(&url).query(&[("per_page", "100")])
        })
        .await
    }

    async fn list_cross_references(
        &self,
        issue_number: u64,
        max_events: usize,
    ) -> Result<Vec<CrossReference>, ApiError> {
        let mut references = Vec::new();
        let mut scanned = 0_usize;
        let mut after: Option<String> = None;
        while scanned < max_events {
            let first = CROSS_REFERENCE_PAGE_SIZE.min(max_events - scanned);
            let data = self
                .graphql(
                    "list cross references",
                    CROSS_REFERENCES_QUERY,
                    json!({
                        "owner": self.repo.owner,
                        "name": self.repo.name,
                        "number": issue_number,
                        "first": first,
                        "after": after,
                    }),
                )
                .await?;
            let timeline = data
                .pointer("/repository/issue/timelineItems")
                .filter(|value| !value.is_null())
                .ok_or_else(|| ApiError::not_found("list cross references"))?;
            let nodes = timeline
                .get("nodes")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            scanned = scanned.saturating_add(nodes.len().max(1));
            references.extend(nodes.iter().filter_map(cross_reference_from_node));
            let has_next = timeline
                .pointer("/pageInfo/hasNextPage")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            after = timeline
                .pointer("/pageInfo/endCursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_next || after.is_none() {
                break;
            }
        }
        Ok(references)
    }

    async fn list_closing_issue_references(
        &self,
        pr_number: u64,
    ) -> Result<Vec<ClosingIssueReference>, ApiError> {
        let data = self
            .graphql(
                "list closing issue references",
                CLOSING_REFERENCES_QUERY,
                json!({
                    "owner": self.repo.owner,
                    "name": self.repo.name,
                    "number": pr_number,
                    "first": CLOSING_REFERENCE_LIMIT,
                }),
            )
            .await?;
        let pull_request = data
            .pointer("/repository/pullRequest")
            .filter(|value| !value.is_null())
            .ok_or_else(|| ApiError::not_found("list closing issue references"))?;
        let nodes = pull_request
            .pointer("/closingIssuesReferences/nodes")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(nodes
            .iter()
            .filter_map(|node| {
                Some(ClosingIssueReference {
                    number: node.get("number")?.as_u64()?,
                    repository: node
                        .pointer("/repository/nameWithOwner")?
                        .as_str()?
                        .to_string(),
                })
            })
            .collect())
    }

    async fn list_pull_request_activity(
        &self,
        pr_number: u64,
    ) -> Result<Vec<PullRequestActivity>, ApiError> {
        let url = self.repo_url(&format!("/issues/{pr_number}/timeline"));
        let items: Vec<Value> = self.paginate("list timeline", &url, &[]).await?;
        Ok(items.iter().filter_map(activity_from_timeline_item).collect())
    }
}
