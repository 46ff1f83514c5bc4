//! Resolves which open pull requests actually close an issue.
//!
//! Discovery reads cross-reference events (anything that mentions the issue);
//! verification asks each candidate for its own closing-issue list. A
//! candidate that no longer resolves is stale noise. Any other verification
//! failure is a hard failure, and when every candidate hard-fails the whole
//! resolution fails instead of reporting "no linked pull requests".

use conclave_governance::closing_keywords::closing_issue_numbers;
use conclave_governance::github_types::{CrossReference, GithubPullRequest};
use conclave_governance::repo_ref::RepoRef;
use futures_util::future::join_all;

use crate::api_error::ApiError;
use crate::engine_error::LinkResolutionError;
use crate::platform::GovernancePlatform;

pub const DEFAULT_VERIFICATION_BATCH_WIDTH: usize = 5;
pub const DEFAULT_CROSS_REFERENCE_EVENT_CAP: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkResolverSettings {
    pub verification_batch_width: usize,
    pub max_cross_reference_events: usize,
}

impl Default for LinkResolverSettings {
    fn default() -> Self {
        Self {
            verification_batch_width: DEFAULT_VERIFICATION_BATCH_WIDTH,
            max_cross_reference_events: DEFAULT_CROSS_REFERENCE_EVENT_CAP,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscoverySource {
    ReferenceGraph,
    DescriptionScan,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkResolution {
    pub issue_number: u64,
    pub source: DiscoverySource,
    pub candidates: Vec<u64>,
    /// Verified closers, in discovery order.
    pub linked: Vec<u64>,
    pub stale: Vec<u64>,
    pub failures: Vec<(u64, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Verification {
    Closes,
    DoesNotClose,
    Stale,
    Failed(String),
}

/// Same-repository open pull requests, deduplicated in first-seen order.
pub fn filter_candidates(repo: &RepoRef, references: &[CrossReference]) -> Vec<u64> {
    let mut candidates = Vec::new();
    for reference in references {
        let Some(number) = reference.source_number else {
            continue;
        };
        if !reference.source_is_pull_request
            || !reference.source_state.eq_ignore_ascii_case("open")
            || !repo.matches_slug(&reference.source_repository)
        {
            continue;
        }
        if !candidates.contains(&number) {
            candidates.push(number);
        }
    }
    candidates
}

async fn discover_candidates(
    platform: &dyn GovernancePlatform,
    issue_number: u64,
    settings: LinkResolverSettings,
) -> Result<(DiscoverySource, Vec<u64>), LinkResolutionError> {
    match platform
        .list_cross_references(issue_number, settings.max_cross_reference_events)
        .await
    {
        Ok(references) => Ok((
            DiscoverySource::ReferenceGraph,
            filter_candidates(platform.repo(), &references),
        )),
        Err(error) if error.is_unsupported() => {
            tracing::debug!(
                issue = issue_number,
                "reference graph unavailable; scanning open pull request descriptions"
            );
            let pulls = platform
                .list_open_pull_requests()
                .await
                .map_err(|source| LinkResolutionError::Discovery {
                    issue: issue_number,
                    source,
                })?;
            let candidates = pulls
                .iter()
                .filter(|pr| {
                    closing_issue_numbers(pr.body.as_deref().unwrap_or_default(), platform.repo())
                        .contains(&issue_number)
                })
                .map(|pr| pr.number)
                .collect();
            Ok((DiscoverySource::DescriptionScan, candidates))
        }
        Err(source) => Err(LinkResolutionError::Discovery {
            issue: issue_number,
            source,
        }),
    }
}

/// Closing issues parsed from the description, each confirmed individually.
///
/// Fails on the first fetch error rather than returning a partial list.
pub async fn closing_issues_from_description(
    platform: &dyn GovernancePlatform,
    pr: &GithubPullRequest,
) -> Result<Vec<u64>, LinkResolutionError> {
    let mut confirmed = Vec::new();
    for number in closing_issue_numbers(pr.body.as_deref().unwrap_or_default(), platform.repo()) {
        let issue = platform
            .get_issue(number)
            .await
            .map_err(|source| LinkResolutionError::FallbackFetch {
                pr: pr.number,
                issue: number,
                source,
            })?;
        if !issue.is_pull_request() {
            confirmed.push(number);
        }
    }
    Ok(confirmed)
}

/// Issues in this repository that `pr` closes, from the reference graph or,
/// where that is unavailable, from its description.
pub async fn closing_issues_for_pull_request(
    platform: &dyn GovernancePlatform,
    pr: &GithubPullRequest,
) -> Result<Vec<u64>, LinkResolutionError> {
    match platform.list_closing_issue_references(pr.number).await {
        Ok(references) => {
            let mut numbers = Vec::new();
            for reference in references {
                if platform.repo().matches_slug(&reference.repository)
                    && !numbers.contains(&reference.number)
                {
                    numbers.push(reference.number);
                }
            }
            Ok(numbers)
        }
        Err(error) if error.is_unsupported() => closing_issues_from_description(platform, pr).await,
        Err(source) => Err(LinkResolutionError::ClosingReferences {
            pr: pr.number,
            source,
        }),
    }
}

async fn verify_candidate(
    platform: &dyn GovernancePlatform,
    issue_number: u64,
    pr_number: u64,
) -> Verification {
    let closing = match platform.list_closing_issue_references(pr_number).await {
        Ok(references) => references
            .iter()
            .any(|reference| {
                reference.number == issue_number
                    && platform.repo().matches_slug(&reference.repository)
            }),
        Err(ApiError::NotFound { .. }) => return Verification::Stale,
        Err(error) if error.is_unsupported() => {
            let pr = match platform.get_pull_request(pr_number).await {
                Ok(pr) => pr,
                Err(error) if error.is_not_found() => return Verification::Stale,
                Err(error) => return Verification::Failed(error.to_string()),
            };
            match closing_issues_from_description(platform, &pr).await {
                Ok(numbers) => numbers.contains(&issue_number),
                Err(error) => return Verification::Failed(error.to_string()),
            }
        }
        Err(error) => return Verification::Failed(error.to_string()),
    };
    if closing {
        Verification::Closes
    } else {
        Verification::DoesNotClose
    }
}

pub async fn resolve_linked_pull_requests(
    platform: &dyn GovernancePlatform,
    issue_number: u64,
    settings: LinkResolverSettings,
) -> Result<LinkResolution, LinkResolutionError> {
    let (source, candidates) = discover_candidates(platform, issue_number, settings).await?;
    let mut resolution = LinkResolution {
        issue_number,
        source,
        candidates: candidates.clone(),
        linked: Vec::new(),
        stale: Vec::new(),
        failures: Vec::new(),
    };
    let mut verified = 0_usize;

    for batch in candidates.chunks(settings.verification_batch_width.max(1)) {
        let outcomes = join_all(
            batch
                .iter()
                .map(|pr_number| verify_candidate(platform, issue_number, *pr_number)),
        )
        .await;
        for (pr_number, outcome) in batch.iter().copied().zip(outcomes) {
            match outcome {
                Verification::Closes => {
                    verified += 1;
                    resolution.linked.push(pr_number);
                }
                Verification::DoesNotClose => verified += 1,
                Verification::Stale => resolution.stale.push(pr_number),
                Verification::Failed(message) => resolution.failures.push((pr_number, message)),
            }
        }
    }

    if verified == 0 {
        if let Some((_, first_error)) = resolution.failures.first() {
            return Err(LinkResolutionError::AllVerificationsFailed {
                issue: issue_number,
                attempted: resolution.failures.len(),
                first_error: first_error.clone(),
            });
        }
    }
    if !resolution.failures.is_empty() {
        tracing::warn!(
            repo = %platform.repo(),
            issue = issue_number,
            failed = resolution.failures.len(),
            verified,
            "some candidate verifications failed; continuing with verified subset"
        );
    }
    tracing::debug!(
        issue = issue_number,
        candidates = resolution.candidates.len(),
        linked = resolution.linked.len(),
        stale = resolution.stale.len(),
        "resolved linked pull requests"
    );
    Ok(resolution)
}

#[cfg(test)]
mod tests {
    use conclave_governance::github_types::CrossReference;
    use conclave_governance::repo_ref::RepoRef;

    use super::filter_candidates;

    fn reference(number: Option<u64>, is_pr: bool, state: &str, repo: &str) -> CrossReference {
        CrossReference {
            source_number: number,
            source_is_pull_request: is_pr,
            source_state: state.to_string(),
            source_repository: repo.to_string(),
        }
    }

    #[test]
    fn unit_filter_candidates_keeps_open_same_repo_pull_requests_once() {
        let repo = RepoRef::parse("hivemind/colony").expect("repo");
        let references = vec![
            reference(Some(7), true, "OPEN", "hivemind/colony"),
            reference(Some(7), true, "OPEN", "Hivemind/Colony"),
            reference(Some(8), true, "CLOSED", "hivemind/colony"),
            reference(Some(9), false, "OPEN", "hivemind/colony"),
            reference(Some(10), true, "OPEN", "other/fork"),
            reference(None, true, "OPEN", "hivemind/colony"),
            reference(Some(3), true, "OPEN", "hivemind/colony"),
        ];
        assert_eq!(filter_candidates(&repo, &references), vec![7, 3]);
    }
}
