//! Label mutations addressed by logical purpose.
//!
//! Additions always use the current name. Removals target whichever literal
//! (current or legacy) is present on the item.

use conclave_governance::github_types::GithubIssue;
use conclave_governance::label_catalog::{LabelCatalog, LabelPurpose};

use crate::api_error::{ApiError, LabelChange};
use crate::platform::GovernancePlatform;

pub async fn add_purpose_label<S: AsRef<str>>(
    platform: &dyn GovernancePlatform,
    catalog: &LabelCatalog,
    number: u64,
    purpose: LabelPurpose,
    current_labels: &[S],
) -> Result<LabelChange, ApiError> {
    if catalog.has(purpose, current_labels) {
        return Ok(LabelChange::AlreadyPresent);
    }
    platform
        .add_label(number, catalog.name(purpose))
        .await
}

pub async fn remove_purpose_label<S: AsRef<str>>(
    platform: &dyn GovernancePlatform,
    catalog: &LabelCatalog,
    number: u64,
    purpose: LabelPurpose,
    current_labels: &[S],
) -> Result<LabelChange, ApiError> {
    let spec = catalog.spec(purpose);
    let mut change = LabelChange::AlreadyAbsent;
    for label in current_labels
        .iter()
        .map(AsRef::as_ref)
        .filter(|label| spec.matches(label))
    {
        if platform.remove_label(number, label).await? == LabelChange::Removed {
            change = LabelChange::Removed;
        }
    }
    Ok(change)
}

/// Open issues carrying any literal of `purpose`, deduplicated by number.
pub async fn list_issues_with_purpose(
    platform: &dyn GovernancePlatform,
    catalog: &LabelCatalog,
    purpose: LabelPurpose,
) -> Result<Vec<GithubIssue>, ApiError> {
    let spec = catalog.spec(purpose);
    let mut issues: Vec<GithubIssue> = Vec::new();
    for label in std::iter::once(&spec.name).chain(spec.legacy.iter()) {
        for issue in platform.list_open_issues_with_label(label).await? {
            if !issues.iter().any(|seen| seen.number == issue.number) {
                issues.push(issue);
            }
        }
    }
    issues.sort_by_key(|issue| issue.number);
    Ok(issues)
}
