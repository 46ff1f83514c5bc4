use conclave_governance::github_types::ClosingIssueReference;

use super::{cross_reference, issue, pull, pull_as_issue, FakePlatform};
use crate::api_error::ApiError;
use crate::engine_error::LinkResolutionError;
use crate::link_resolver::{
    closing_issues_for_pull_request, resolve_linked_pull_requests, DiscoverySource,
    LinkResolverSettings,
};

fn settings() -> LinkResolverSettings {
    LinkResolverSettings {
        verification_batch_width: 2,
        ..LinkResolverSettings::default()
    }
}

fn ready_issue_with_candidates(platform: &FakePlatform, issue_number: u64, prs: &[u64]) {
    platform.insert_issue(issue(issue_number, &["phase:ready-to-implement"]));
    platform.set_cross_references(
        issue_number,
        Ok(prs.iter().copied().map(cross_reference).collect()),
    );
}

#[tokio::test]
async fn functional_every_genuine_closer_is_linked_across_batches() {
    let platform = FakePlatform::new();
    ready_issue_with_candidates(&platform, 40, &[41, 42, 43]);
    for number in [41, 42, 43] {
        platform.insert_pull(pull(number, "Fixes #40", &[]));
    }

    let resolution = resolve_linked_pull_requests(&platform, 40, settings())
        .await
        .expect("resolve");

    assert_eq!(resolution.source, DiscoverySource::ReferenceGraph);
    assert_eq!(resolution.candidates, vec![41, 42, 43]);
    assert_eq!(resolution.linked, vec![41, 42, 43]);
    assert!(resolution.failures.is_empty());
}

#[tokio::test]
async fn functional_mentions_without_closing_keyword_are_not_links() {
    let platform = FakePlatform::new();
    ready_issue_with_candidates(&platform, 44, &[45]);
    platform.insert_pull(pull(45, "Related to #44 but does not close it", &[]));

    let resolution = resolve_linked_pull_requests(&platform, 44, settings())
        .await
        .expect("resolve");

    assert_eq!(resolution.candidates, vec![45]);
    assert!(resolution.linked.is_empty());
}

#[tokio::test]
async fn regression_all_verifications_failing_is_an_error_not_an_empty_set() {
    let platform = FakePlatform::new();
    ready_issue_with_candidates(&platform, 46, &[47, 48]);
    platform.fail(
        "list_closing_issue_references",
        ApiError::transient("closing references", "secondary rate limit"),
    );

    let error = resolve_linked_pull_requests(&platform, 46, settings())
        .await
        .expect_err("must fail");

    match error {
        LinkResolutionError::AllVerificationsFailed {
            issue,
            attempted,
            first_error,
        } => {
            assert_eq!(issue, 46);
            assert_eq!(attempted, 2);
            assert!(first_error.contains("secondary rate limit"));
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[tokio::test]
async fn functional_partial_verification_failure_returns_verified_subset() {
    let platform = FakePlatform::new();
    ready_issue_with_candidates(&platform, 50, &[51, 52]);
    platform.insert_pull(pull(51, "Closes #50", &[]));
    platform.insert_pull(pull(52, "Closes #50", &[]));
    platform.fail_for(
        "list_closing_issue_references",
        52,
        ApiError::transient("closing references", "502"),
    );

    let resolution = resolve_linked_pull_requests(&platform, 50, settings())
        .await
        .expect("resolve");

    assert_eq!(resolution.linked, vec![51]);
    assert_eq!(resolution.failures.len(), 1);
    assert_eq!(resolution.failures[0].0, 52);
}

#[tokio::test]
async fn regression_deleted_candidates_are_dropped_not_failed() {
    let platform = FakePlatform::new();
    ready_issue_with_candidates(&platform, 53, &[54, 55]);
    platform.insert_pull(pull(54, "Resolves #53", &[]));

    let resolution = resolve_linked_pull_requests(&platform, 53, settings())
        .await
        .expect("resolve");

    assert_eq!(resolution.linked, vec![54]);
    assert_eq!(resolution.stale, vec![55]);
    assert!(resolution.failures.is_empty());

    let only_stale = FakePlatform::new();
    ready_issue_with_candidates(&only_stale, 53, &[55]);
    let resolution = resolve_linked_pull_requests(&only_stale, 53, settings())
        .await
        .expect("stale-only candidates are not a failure");
    assert!(resolution.linked.is_empty());
    assert_eq!(resolution.stale, vec![55]);
}

#[tokio::test]
async fn functional_unsupported_graph_falls_back_to_descriptions() {
    let platform = FakePlatform::new();
    platform.insert_issue(issue(60, &["phase:ready-to-implement"]));
    platform.insert_pull(pull(61, "This fixes #60", &[]));
    platform.insert_pull(pull(62, "Unrelated cleanup", &[]));
    platform.set_cross_references(
        60,
        Err(ApiError::unsupported("cross references", "timelineItems")),
    );
    platform.fail(
        "list_closing_issue_references",
        ApiError::unsupported("closing references", "closingIssuesReferences"),
    );

    let resolution = resolve_linked_pull_requests(&platform, 60, settings())
        .await
        .expect("resolve");

    assert_eq!(resolution.source, DiscoverySource::DescriptionScan);
    assert_eq!(resolution.candidates, vec![61]);
    assert_eq!(resolution.linked, vec![61]);
    assert!(platform.calls().contains(&"get_issue:60".to_string()));
}

#[tokio::test]
async fn regression_description_fallback_fails_closed_on_issue_fetch_error() {
    let platform = FakePlatform::new();
    ready_issue_with_candidates(&platform, 63, &[64]);
    platform.insert_pull(pull(64, "Closes #63", &[]));
    platform.fail(
        "list_closing_issue_references",
        ApiError::unsupported("closing references", "closingIssuesReferences"),
    );
    platform.fail_for("get_issue", 63, ApiError::transient("get issue", "timeout"));

    let error = resolve_linked_pull_requests(&platform, 63, settings())
        .await
        .expect_err("fallback fetch failure must not look like no links");

    assert!(matches!(
        error,
        LinkResolutionError::AllVerificationsFailed { attempted: 1, .. }
    ));
}

#[tokio::test]
async fn regression_description_fallback_ignores_pull_request_numbers() {
    let platform = FakePlatform::new();
    let other = pull(66, "Other implementation", &[]);
    platform.insert_issue(pull_as_issue(&other));
    platform.insert_issue(issue(65, &["phase:ready-to-implement"]));
    let pr = pull(67, "Fixes #65, fixes #66", &[]);
    platform.insert_pull(pr.clone());
    platform.fail(
        "list_closing_issue_references",
        ApiError::unsupported("closing references", "closingIssuesReferences"),
    );

    let closing = closing_issues_for_pull_request(&platform, &pr)
        .await
        .expect("closing issues");

    assert_eq!(closing, vec![65]);
}

#[tokio::test]
async fn unit_closing_references_from_other_repositories_are_ignored() {
    let platform = FakePlatform::new();
    let pr = pull(68, "", &[]);
    platform.insert_pull(pr.clone());
    platform.set_closing_references(
        68,
        Ok(vec![
            ClosingIssueReference {
                number: 5,
                repository: "hivemind/colony".to_string(),
            },
            ClosingIssueReference {
                number: 6,
                repository: "someone/fork".to_string(),
            },
        ]),
    );

    let closing = closing_issues_for_pull_request(&platform, &pr)
        .await
        .expect("closing issues");

    assert_eq!(closing, vec![5]);
}

#[tokio::test]
async fn unit_discovery_failure_surfaces_as_discovery_error() {
    let platform = FakePlatform::new();
    platform.set_cross_references(70, Err(ApiError::transient("cross references", "502")));

    let error = resolve_linked_pull_requests(&platform, 70, settings())
        .await
        .expect_err("discovery failure");

    assert!(matches!(
        error,
        LinkResolutionError::Discovery { issue: 70, .. }
    ));
}
