//! Machine-readable markers embedded in automated comments.
//!
//! Every comment that must be posted at most once carries a hidden
//! `{kind, ref}` record. Comments posted before markers existed are still
//! recognised through per-kind legacy text signatures.

use serde::{Deserialize, Serialize};

use crate::github_types::GithubComment;

pub const NOTIFICATION_MARKER_PREFIX: &str = "<!-- conclave-notification:";
pub const NOTIFICATION_MARKER_SUFFIX: &str = " -->";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    Voting,
    ExtendedVoting,
    VotingOutcome,
    VotingCommentMissing,
    IssueReady,
    IntakeAccepted,
    IntakeCapReached,
    StaleWarning,
    StaleClosed,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Voting => "voting",
            Self::ExtendedVoting => "extended-voting",
            Self::VotingOutcome => "voting-outcome",
            Self::VotingCommentMissing => "voting-comment-missing",
            Self::IssueReady => "issue-ready",
            Self::IntakeAccepted => "intake-accepted",
            Self::IntakeCapReached => "intake-cap-reached",
            Self::StaleWarning => "stale-warning",
            Self::StaleClosed => "stale-closed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub kind: NotificationKind,
    #[serde(rename = "ref")]
    pub reference_number: u64,
}

impl NotificationRecord {
    pub fn new(kind: NotificationKind, reference_number: u64) -> Self {
        Self {
            kind,
            reference_number,
        }
    }
}

/// How an existing comment was recognised as a prior notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationMatch {
    Metadata,
    LegacySignature,
}

pub fn render_notification_marker(record: NotificationRecord) -> String {
    let payload = serde_json::json!({
        "kind": record.kind,
        "ref": record.reference_number,
    });
    format!("{NOTIFICATION_MARKER_PREFIX} {payload}{NOTIFICATION_MARKER_SUFFIX}")
}

/// Appends the hidden marker to a rendered comment body.
pub fn with_notification_marker(body: &str, record: NotificationRecord) -> String {
    format!(
        "{}\n\n{}",
        body.trim_end(),
        render_notification_marker(record)
    )
}

pub fn extract_notification_records(text: &str) -> Vec<NotificationRecord> {
    let mut records = Vec::new();
    let mut cursor = text;
    while let Some(start) = cursor.find(NOTIFICATION_MARKER_PREFIX) {
        let after_start = &cursor[start + NOTIFICATION_MARKER_PREFIX.len()..];
        let Some(end) = after_start.find(NOTIFICATION_MARKER_SUFFIX) else {
            break;
        };
        if let Ok(record) = serde_json::from_str::<NotificationRecord>(after_start[..end].trim())
        {
            records.push(record);
        }
        cursor = &after_start[end + NOTIFICATION_MARKER_SUFFIX.len()..];
    }
    records
}

/// Plain-text fingerprints of comments posted before markers were embedded.
pub fn legacy_signatures(record: NotificationRecord) -> Vec<String> {
    let number = record.reference_number;
    match record.kind {
        NotificationKind::Voting => vec!["Voting phase has started".to_string()],
        NotificationKind::ExtendedVoting => vec!["Extended voting has started".to_string()],
        NotificationKind::VotingOutcome => Vec::new(),
        NotificationKind::VotingCommentMissing => {
            vec!["could not locate the voting comment".to_string()]
        }
        NotificationKind::IssueReady => vec![
            format!("Issue #{number} is ready for implementation"),
            format!("issue #{number} is now ready for implementation"),
        ],
        NotificationKind::IntakeAccepted => {
            vec![format!("accepted as an implementation candidate for #{number}")]
        }
        NotificationKind::IntakeCapReached => {
            vec![format!("already has the maximum number of competing implementations for #{number}")]
        }
        NotificationKind::StaleWarning => vec!["has had no activity for".to_string()],
        NotificationKind::StaleClosed => vec!["Closing this pull request after".to_string()],
    }
}

/// Classifies a single comment against a notification record.
pub fn comment_matches(
    comment: &GithubComment,
    record: NotificationRecord,
    bot_login: Option<&str>,
) -> Option<NotificationMatch> {
    if !comment.user.is_automation(bot_login) {
        return None;
    }
    let body = comment.body.as_deref().unwrap_or_default();
    if extract_notification_records(body).contains(&record) {
        return Some(NotificationMatch::Metadata);
    }
    let lowered = body.to_ascii_lowercase();
    legacy_signatures(record)
        .iter()
        .any(|signature| contains_signature(&lowered, &signature.to_ascii_lowercase()))
        .then_some(NotificationMatch::LegacySignature)
}

/// A signature ending in `#N` must not run on into a longer number.
fn contains_signature(haystack: &str, signature: &str) -> bool {
    haystack.match_indices(signature).any(|(start, matched)| {
        !haystack[start + matched.len()..].starts_with(|next: char| next.is_ascii_digit())
    })
}

/// Finds the earliest prior comment for the record, current scheme first.
pub fn find_notification<'a>(
    comments: &'a [GithubComment],
    record: NotificationRecord,
    bot_login: Option<&str>,
) -> Option<(&'a GithubComment, NotificationMatch)> {
    let classified = comments
        .iter()
        .filter_map(|comment| {
            comment_matches(comment, record, bot_login).map(|matched| (comment, matched))
        })
        .collect::<Vec<_>>();
    classified
        .iter()
        .find(|(_, matched)| *matched == NotificationMatch::Metadata)
        .or_else(|| classified.first())
        .copied()
}

/// Most recent comment for the record, by comment id.
pub fn latest_notification<'a>(
    comments: &'a [GithubComment],
    record: NotificationRecord,
    bot_login: Option<&str>,
) -> Option<&'a GithubComment> {
    comments
        .iter()
        .filter(|comment| comment_matches(comment, record, bot_login).is_some())
        .max_by_key(|comment| comment.id)
}

pub fn count_notifications(
    comments: &[GithubComment],
    record: NotificationRecord,
    bot_login: Option<&str>,
) -> usize {
    comments
        .iter()
        .filter(|comment| comment_matches(comment, record, bot_login).is_some())
        .count()
}
