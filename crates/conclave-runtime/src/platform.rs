//! The platform seam consumed by the engine.
//!
//! One implementation is bound to one repository. The engine keeps no private
//! state: every "already done?" decision is re-derived through these reads.

use async_trait::async_trait;
use conclave_governance::github_types::{
    CheckRunListing, ClosingIssueReference, CrossReference, GithubComment, GithubCombinedStatus,
    GithubIssue, GithubPullRequest, GithubReaction, GithubReview, PullRequestActivity,
};
use conclave_governance::repo_ref::RepoRef;

use crate::api_error::{ApiError, LabelChange};

#[async_trait]
pub trait GovernancePlatform: Send + Sync {
    fn repo(&self) -> &RepoRef;

    async fn get_issue(&self, number: u64) -> Result<GithubIssue, ApiError>;

    /// Open issues (pull requests excluded) carrying `label`.
    async fn list_open_issues_with_label(&self, label: &str)
        -> Result<Vec<GithubIssue>, ApiError>;

    async fn list_issue_comments(&self, number: u64) -> Result<Vec<GithubComment>, ApiError>;

    /// Returns the id of the created comment.
    async fn create_comment(&self, number: u64, body: &str) -> Result<u64, ApiError>;

    async fn add_label(&self, number: u64, label: &str) -> Result<LabelChange, ApiError>;

    async fn remove_label(&self, number: u64, label: &str) -> Result<LabelChange, ApiError>;

    /// Closes an issue or pull request.
    async fn close_issue(&self, number: u64) -> Result<(), ApiError>;

    async fn lock_issue(&self, number: u64) -> Result<(), ApiError>;

    async fn unlock_issue(&self, number: u64) -> Result<(), ApiError>;

    async fn list_comment_reactions(&self, comment_id: u64)
        -> Result<Vec<GithubReaction>, ApiError>;

    async fn list_open_pull_requests(&self) -> Result<Vec<GithubPullRequest>, ApiError>;

    async fn get_pull_request(&self, number: u64) -> Result<GithubPullRequest, ApiError>;

    async fn list_reviews(&self, number: u64) -> Result<Vec<GithubReview>, ApiError>;

    /// A single capped page; callers must honour [`CheckRunListing::is_truncated`].
    async fn list_check_runs(&self, sha: &str) -> Result<CheckRunListing, ApiError>;

    async fn get_combined_status(&self, sha: &str) -> Result<GithubCombinedStatus, ApiError>;

    /// Cross-reference events naming the issue, at most `max_events`.
    ///
    /// Fails with [`ApiError::Unsupported`] where the reference graph is unavailable.
    async fn list_cross_references(
        &self,
        issue_number: u64,
        max_events: usize,
    ) -> Result<Vec<CrossReference>, ApiError>;

    /// Issues the pull request will close when merged.
    ///
    /// Fails with [`ApiError::NotFound`] when the pull request no longer
    /// resolves and [`ApiError::Unsupported`] where the query is unavailable.
    async fn list_closing_issue_references(
        &self,
        pr_number: u64,
    ) -> Result<Vec<ClosingIssueReference>, ApiError>;

    async fn list_pull_request_activity(
        &self,
        pr_number: u64,
    ) -> Result<Vec<PullRequestActivity>, ApiError>;
}
