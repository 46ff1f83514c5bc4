use conclave_governance::notification_render::render_issue_ready_notification;
use conclave_governance::repo_config::RepoConfig;
use conclave_governance::repo_ref::RepoRef;
use conclave_runtime::link_resolver::LinkResolverSettings;
use conclave_runtime::phase_orchestrator::VotingStart;
use conclave_runtime::reconciliation::{sweep_merge_readiness, sweep_ready_notifications};
use conclave_runtime::webhook_dispatch::{dispatch_event, parse_webhook_event, DispatchOutcome};
use conclave_runtime::GithubApiClient;
use httpmock::prelude::*;
use serde_json::{json, Value};

const CONFIG: &str = r#"
bot_login = "conclave-bot"

[governance]
maintainers = ["maya"]

[merge_readiness]
trusted_reviewers = ["alice"]

[intake]
max_competing_prs = 2
"#;

fn client(server: &MockServer) -> GithubApiClient {
    GithubApiClient::new(
        server.base_url(),
        "integration-token".to_string(),
        RepoRef::parse("hivemind/colony").expect("repo"),
        2_000,
        2,
        1,
    )
    .expect("client")
}

fn config() -> RepoConfig {
    RepoConfig::from_toml_str(CONFIG).expect("config")
}

fn labels(names: &[&str]) -> Vec<Value> {
    names.iter().map(|name| json!({"name": name})).collect()
}

fn issue_json(number: u64, label_names: &[&str]) -> Value {
    json!({
        "number": number,
        "title": "Proposal: adopt a lighter review flow",
        "body": "Details in the thread.",
        "state": "open",
        "locked": false,
        "created_at": "2026-03-01T00:00:00Z",
        "updated_at": "2026-03-01T00:00:00Z",
        "user": {"login": "dana"},
        "labels": labels(label_names)
    })
}

fn pull_json(number: u64, body: &str, label_names: &[&str]) -> Value {
    json!({
        "number": number,
        "title": "Implement the lighter review flow",
        "body": body,
        "state": "open",
        "mergeable": true,
        "user": {"login": "carol"},
        "labels": labels(label_names),
        "head": {"sha": format!("sha-{number}"), "ref": "feature"},
        "created_at": "2026-03-01T00:00:00Z",
        "updated_at": "2026-03-01T00:00:00Z"
    })
}

#[tokio::test]
async fn integration_readiness_sweep_labels_green_candidate() {
    let server = MockServer::start();
    let listing = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/hivemind/colony/pulls")
            .query_param("state", "open");
        then.status(200).json_body(json!([
            pull_json(21, "Fixes #20", &["implementation"]),
            pull_json(22, "Drive-by typo fix", &[]),
        ]));
    });
    let pull = server.mock(|when, then| {
        when.method(GET).path("/repos/hivemind/colony/pulls/21");
        then.status(200)
            .json_body(pull_json(21, "Fixes #20", &["implementation"]));
    });
    let reviews = server.mock(|when, then| {
        when.method(GET).path("/repos/hivemind/colony/pulls/21/reviews");
        then.status(200).json_body(json!([{
            "id": 1,
            "user": {"login": "alice"},
            "state": "APPROVED",
            "submitted_at": "2026-03-01T02:00:00Z"
        }]));
    });
    let runs = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/hivemind/colony/commits/sha-21/check-runs");
        then.status(200).json_body(json!({
            "total_count": 2,
            "check_runs": [
                {"id": 1, "name": "build", "status": "completed", "conclusion": "success"},
                {"id": 2, "name": "lint", "status": "completed", "conclusion": "neutral"}
            ]
        }));
    });
    let status = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/hivemind/colony/commits/sha-21/status");
        then.status(200)
            .json_body(json!({"state": "pending", "total_count": 0, "statuses": []}));
    });
    let add_label = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/hivemind/colony/issues/21/labels")
            .json_body(json!({"labels": ["merge-ready"]}));
        then.status(200).json_body(json!([{"name": "merge-ready"}]));
    });

    let report = sweep_merge_readiness(&client(&server), &config())
        .await
        .expect("sweep");

    assert_eq!((report.examined, report.changed), (1, 1));
    listing.assert_calls(1);
    pull.assert_calls(1);
    reviews.assert_calls(1);
    runs.assert_calls(1);
    status.assert_calls(1);
    add_label.assert_calls(1);
}

#[tokio::test]
async fn integration_notification_sweep_respects_recorded_announcement() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET)
            .path("/repos/hivemind/colony/issues")
            .query_param("labels", "phase:ready-to-implement");
        then.status(200)
            .json_body(json!([issue_json(30, &["phase:ready-to-implement"])]));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/repos/hivemind/colony/issues")
            .query_param("labels", "ready-to-implement");
        then.status(200).json_body(json!([]));
    });
    server.mock(|when, then| {
        when.method(GET).path("/repos/hivemind/colony/pulls");
        then.status(200)
            .json_body(json!([pull_json(31, "Closes #30", &[])]));
    });
    let cross_references = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("CROSS_REFERENCED_EVENT");
        then.status(200).json_body(json!({
            "data": {"repository": {"issue": {"timelineItems": {
                "pageInfo": {"hasNextPage": false, "endCursor": null},
                "nodes": [{"source": {
                    "__typename": "PullRequest",
                    "number": 31,
                    "state": "OPEN",
                    "repository": {"nameWithOwner": "hivemind/colony"}
                }}]
            }}}}
        }));
    });
    let closing = server.mock(|when, then| {
        when.method(POST)
            .path("/graphql")
            .body_includes("closingIssuesReferences");
        then.status(200).json_body(json!({
            "data": {"repository": {"pullRequest": {"closingIssuesReferences": {
                "nodes": [{"number": 30, "repository": {"nameWithOwner": "hivemind/colony"}}]
            }}}}
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/repos/hivemind/colony/issues/31/comments");
        then.status(200).json_body(json!([{
            "id": 700,
            "body": render_issue_ready_notification(30, 31),
            "created_at": "2026-03-02T00:00:00Z",
            "updated_at": "2026-03-02T00:00:00Z",
            "user": {"login": "conclave-bot", "type": "Bot"}
        }]));
    });
    let label = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/hivemind/colony/issues/31/labels")
            .json_body(json!({"labels": ["implementation"]}));
        then.status(200).json_body(json!([{"name": "implementation"}]));
    });
    let comment = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/hivemind/colony/issues/31/comments")
            .body_includes("intake-accepted");
        then.status(201).json_body(json!({"id": 701}));
    });

    let report = sweep_ready_notifications(&client(&server), &config(), LinkResolverSettings::default())
        .await
        .expect("sweep");

    assert_eq!((report.examined, report.changed), (1, 1));
    cross_references.assert_calls(1);
    closing.assert_calls(1);
    label.assert_calls(1);
    comment.assert_calls(1);
}

#[tokio::test]
async fn integration_vote_command_delivery_opens_voting() {
    let server = MockServer::start();
    let comments = server.mock(|when, then| {
        when.method(GET)
            .path("/repos/hivemind/colony/issues/5/comments");
        then.status(200).json_body(json!([]));
    });
    let voting_comment = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/hivemind/colony/issues/5/comments");
        then.status(201).json_body(json!({"id": 800}));
    });
    let add_label = server.mock(|when, then| {
        when.method(POST)
            .path("/repos/hivemind/colony/issues/5/labels")
            .json_body(json!({"labels": ["phase:voting"]}));
        then.status(200).json_body(json!([{"name": "phase:voting"}]));
    });
    let remove_label = server.mock(|when, then| {
        when.method(DELETE)
            .path("/repos/hivemind/colony/issues/5/labels/phase%3Adiscussion");
        then.status(200).json_body(json!([]));
    });
    let payload = json!({
        "action": "created",
        "issue": issue_json(5, &["phase:discussion"]),
        "comment": {
            "id": 42,
            "body": "/conclave vote",
            "created_at": "2026-03-03T00:00:00Z",
            "updated_at": "2026-03-03T00:00:00Z",
            "user": {"login": "maya", "type": "User"}
        }
    });
    let event = parse_webhook_event("issue_comment", &payload)
        .expect("payload")
        .expect("handled");

    let outcome = dispatch_event(
        &client(&server),
        &config(),
        LinkResolverSettings::default(),
        event,
    )
    .await
    .expect("dispatch");

    assert!(matches!(
        outcome,
        DispatchOutcome::VotingStarted(VotingStart::Started {
            cycle: 1,
            comment_id: 800,
            reused_comment: false,
            ..
        })
    ));
    comments.assert_calls(1);
    voting_comment.assert_calls(1);
    add_label.assert_calls(1);
    remove_label.assert_calls(1);
}

#[tokio::test]
async fn regression_status_delivery_with_unknown_sha_changes_nothing() {
    let server = MockServer::start();
    let listing = server.mock(|when, then| {
        when.method(GET).path("/repos/hivemind/colony/pulls");
        then.status(200)
            .json_body(json!([pull_json(40, "Fixes #1", &["implementation"])]));
    });
    let event = parse_webhook_event("status", &json!({"sha": "unrelated", "state": "success"}))
        .expect("payload")
        .expect("handled");

    let outcome = dispatch_event(
        &client(&server),
        &config(),
        LinkResolverSettings::default(),
        event,
    )
    .await
    .expect("dispatch");

    assert_eq!(outcome, DispatchOutcome::Readiness(Vec::new()));
    listing.assert_calls(1);
}
