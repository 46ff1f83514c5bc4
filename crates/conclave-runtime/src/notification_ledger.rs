//! Read-then-decide posting of automated comments.
//!
//! The comment thread is the ledger: a notification counts as posted when an
//! automation-authored comment carries its marker or a legacy signature.

use conclave_governance::github_types::GithubComment;
use conclave_governance::notification_marker::{
    find_notification, NotificationMatch, NotificationRecord,
};

use crate::api_error::ApiError;
use crate::platform::GovernancePlatform;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationPost {
    Posted { comment_id: u64 },
    AlreadyPosted(NotificationMatch),
}

impl NotificationPost {
    pub fn posted(&self) -> bool {
        matches!(self, Self::Posted { .. })
    }
}

pub async fn find_posted_notification(
    platform: &dyn GovernancePlatform,
    target_number: u64,
    record: NotificationRecord,
    bot_login: Option<&str>,
) -> Result<Option<NotificationMatch>, ApiError> {
    let comments = platform.list_issue_comments(target_number).await?;
    Ok(find_notification(&comments, record, bot_login).map(|(_, matched)| matched))
}

/// Posts `body` on `target_number` unless the record is already present.
pub async fn post_notification_once(
    platform: &dyn GovernancePlatform,
    target_number: u64,
    record: NotificationRecord,
    body: &str,
    bot_login: Option<&str>,
) -> Result<NotificationPost, ApiError> {
    let comments = platform.list_issue_comments(target_number).await?;
    post_with_comments(platform, target_number, &comments, record, body, bot_login).await
}

/// Same as [`post_notification_once`] against an already fetched thread.
pub async fn post_with_comments(
    platform: &dyn GovernancePlatform,
    target_number: u64,
    comments: &[GithubComment],
    record: NotificationRecord,
    body: &str,
    bot_login: Option<&str>,
) -> Result<NotificationPost, ApiError> {
    if let Some((existing, matched)) = find_notification(comments, record, bot_login) {
        tracing::debug!(
            target_number,
            kind = record.kind.as_str(),
            reference = record.reference_number,
            comment_id = existing.id,
            legacy = matched == NotificationMatch::LegacySignature,
            "notification already posted"
        );
        return Ok(NotificationPost::AlreadyPosted(matched));
    }
    let comment_id = platform.create_comment(target_number, body).await?;
    tracing::info!(
        target_number,
        kind = record.kind.as_str(),
        reference = record.reference_number,
        comment_id,
        "posted notification"
    );
    Ok(NotificationPost::Posted { comment_id })
}
