//! Individual merge-readiness checks as pure functions over fetched state.

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;

use crate::github_types::{CheckRunListing, GithubCombinedStatus, GithubReview};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckSeverity {
    Hard,
    Advisory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PreflightCheckName {
    PullRequestOpen,
    Approvals,
    NoConflicts,
    ContinuousIntegration,
    ImplementationLabel,
    MergeReadyLabel,
}

impl PreflightCheckName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PullRequestOpen => "pr-open",
            Self::Approvals => "approvals",
            Self::NoConflicts => "no-conflicts",
            Self::ContinuousIntegration => "ci",
            Self::ImplementationLabel => "implementation-label",
            Self::MergeReadyLabel => "merge-ready-label",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::PullRequestOpen => "Pull request is open",
            Self::Approvals => "Trusted approvals",
            Self::NoConflicts => "No merge conflicts",
            Self::ContinuousIntegration => "CI is green",
            Self::ImplementationLabel => "Implementation candidate",
            Self::MergeReadyLabel => "Merge-ready label",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreflightCheckItem {
    pub name: PreflightCheckName,
    pub passed: bool,
    pub severity: CheckSeverity,
    pub detail: String,
}

impl PreflightCheckItem {
    fn hard(name: PreflightCheckName, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed,
            severity: CheckSeverity::Hard,
            detail: detail.into(),
        }
    }

    fn advisory(name: PreflightCheckName, passed: bool, detail: impl Into<String>) -> Self {
        Self {
            name,
            passed,
            severity: CheckSeverity::Advisory,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PreflightResult {
    pub checks: Vec<PreflightCheckItem>,
}

impl PreflightResult {
    /// AND over the hard subset only; advisory failures never block.
    pub fn all_hard_checks_passed(&self) -> bool {
        self.checks
            .iter()
            .filter(|check| check.severity == CheckSeverity::Hard)
            .all(|check| check.passed)
    }

    pub fn check(&self, name: PreflightCheckName) -> Option<&PreflightCheckItem> {
        self.checks.iter().find(|check| check.name == name)
    }

    pub fn failed(&self) -> impl Iterator<Item = &PreflightCheckItem> {
        self.checks.iter().filter(|check| !check.passed)
    }
}

pub fn check_pull_request_open(state: &str, merged: bool) -> PreflightCheckItem {
    let open = state.eq_ignore_ascii_case("open") && !merged;
    let detail = if merged {
        "pull request is already merged".to_string()
    } else if open {
        "pull request is open".to_string()
    } else {
        format!("pull request is {}", state.to_ascii_lowercase())
    };
    PreflightCheckItem::hard(PreflightCheckName::PullRequestOpen, open, detail)
}

/// Reviewers whose most recent decisive review is an approval.
///
/// Only logins on the trusted list count, and the PR author never counts.
/// `COMMENTED` reviews do not change a reviewer's standing.
pub fn trusted_approvers(
    reviews: &[GithubReview],
    author: &str,
    trusted_reviewers: &[String],
) -> Vec<String> {
    let trusted = trusted_reviewers
        .iter()
        .map(|login| login.trim().to_ascii_lowercase())
        .filter(|login| !login.is_empty())
        .collect::<HashSet<_>>();
    let author = author.trim().to_ascii_lowercase();
    let mut standing: BTreeMap<String, bool> = BTreeMap::new();
    for review in reviews {
        let Some(user) = review.user.as_ref() else {
            continue;
        };
        let login = user.login.to_ascii_lowercase();
        if login == author || !trusted.contains(&login) {
            continue;
        }
        match review.state.to_ascii_uppercase().as_str() {
            "APPROVED" => {
                standing.insert(login, true);
            }
            "CHANGES_REQUESTED" | "DISMISSED" => {
                standing.insert(login, false);
            }
            _ => {}
        }
    }
    standing
        .into_iter()
        .filter_map(|(login, approved)| approved.then_some(login))
        .collect()
}

pub fn check_approvals(
    reviews: &[GithubReview],
    author: &str,
    trusted_reviewers: &[String],
    min_approvals: usize,
) -> PreflightCheckItem {
    let approvers = trusted_approvers(reviews, author, trusted_reviewers);
    let passed = approvers.len() >= min_approvals;
    let detail = if approvers.is_empty() {
        format!("0/{min_approvals} trusted approvals")
    } else {
        format!(
            "{}/{min_approvals} trusted approvals ({})",
            approvers.len(),
            approvers.join(", ")
        )
    };
    PreflightCheckItem::hard(PreflightCheckName::Approvals, passed, detail)
}

/// `None` means GitHub has not computed mergeability yet and is not a failure.
pub fn check_mergeable(mergeable: Option<bool>) -> PreflightCheckItem {
    let (passed, detail) = match mergeable {
        Some(true) => (true, "no merge conflicts"),
        Some(false) => (false, "pull request has merge conflicts"),
        None => (true, "mergeability not yet computed by GitHub"),
    };
    PreflightCheckItem::hard(PreflightCheckName::NoConflicts, passed, detail)
}

const PASSING_CONCLUSIONS: [&str; 3] = ["success", "neutral", "skipped"];

/// Union of the check-run list and the legacy combined status.
///
/// A capped check-run listing fails closed because unseen runs cannot be
/// verified. No runs and no statuses at all means no CI is configured.
pub fn check_ci(runs: &CheckRunListing, combined: &GithubCombinedStatus) -> PreflightCheckItem {
    let name = PreflightCheckName::ContinuousIntegration;
    if runs.is_truncated() {
        return PreflightCheckItem::hard(
            name,
            false,
            format!(
                "cannot verify all check runs: saw {} of {}",
                runs.check_runs.len(),
                runs.total_count
            ),
        );
    }
    if combined.is_truncated() {
        return PreflightCheckItem::hard(
            name,
            false,
            format!(
                "cannot verify all commit statuses: saw {} of {}",
                combined.statuses.len(),
                combined.total_count
            ),
        );
    }

    let mut failing = Vec::new();
    let mut pending = Vec::new();
    for run in &runs.check_runs {
        if !run.status.eq_ignore_ascii_case("completed") {
            pending.push(run.name.clone());
            continue;
        }
        let conclusion = run
            .conclusion
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        if !PASSING_CONCLUSIONS.contains(&conclusion.as_str()) {
            failing.push(run.name.clone());
        }
    }
    for status in &combined.statuses {
        match status.state.to_ascii_lowercase().as_str() {
            "success" => {}
            "pending" => pending.push(status.context.clone()),
            _ => failing.push(status.context.clone()),
        }
    }

    if !failing.is_empty() {
        return PreflightCheckItem::hard(name, false, format!("failing: {}", failing.join(", ")));
    }
    if !pending.is_empty() {
        return PreflightCheckItem::hard(name, false, format!("pending: {}", pending.join(", ")));
    }
    if runs.check_runs.is_empty() && combined.statuses.is_empty() {
        return PreflightCheckItem::hard(name, true, "no CI configured");
    }
    PreflightCheckItem::hard(
        name,
        true,
        format!(
            "{} check run(s) and {} status(es) green",
            runs.check_runs.len(),
            combined.statuses.len()
        ),
    )
}

pub fn check_implementation_label(present: bool, label: &str) -> PreflightCheckItem {
    let detail = if present {
        format!("labelled `{label}`")
    } else {
        format!("missing `{label}`")
    };
    PreflightCheckItem::advisory(PreflightCheckName::ImplementationLabel, present, detail)
}

pub fn check_merge_ready_label(present: bool, label: &str) -> PreflightCheckItem {
    let detail = if present {
        format!("`{label}` already applied")
    } else {
        format!("`{label}` not applied")
    };
    PreflightCheckItem::advisory(PreflightCheckName::MergeReadyLabel, present, detail)
}

#[cfg(test)]
mod tests {
    use super::{
        check_approvals, check_ci, check_implementation_label, check_mergeable,
        check_pull_request_open, trusted_approvers, CheckSeverity, PreflightCheckName,
        PreflightResult,
    };
    use crate::github_types::{
        CheckRunListing, GithubCheckRun, GithubCombinedStatus, GithubCommitStatus, GithubReview,
        GithubUser,
    };

    fn review(id: u64, login: &str, state: &str) -> GithubReview {
        GithubReview {
            id,
            user: Some(GithubUser::new(login)),
            state: state.to_string(),
            submitted_at: None,
        }
    }

    fn run(name: &str, status: &str, conclusion: Option<&str>) -> GithubCheckRun {
        GithubCheckRun {
            id: 1,
            name: name.to_string(),
            status: status.to_string(),
            conclusion: conclusion.map(str::to_string),
        }
    }

    fn listing(runs: Vec<GithubCheckRun>) -> CheckRunListing {
        CheckRunListing {
            total_count: runs.len() as u64,
            check_runs: runs,
        }
    }

    fn statuses(states: &[(&str, &str)]) -> GithubCombinedStatus {
        GithubCombinedStatus {
            state: "pending".to_string(),
            total_count: states.len() as u64,
            statuses: states
                .iter()
                .map(|(context, state)| GithubCommitStatus {
                    context: context.to_string(),
                    state: state.to_string(),
                    description: None,
                })
                .collect(),
        }
    }

    fn trusted() -> Vec<String> {
        vec!["alice".to_string(), "Bob".to_string(), "author".to_string()]
    }

    #[test]
    fn unit_check_pull_request_open_rejects_closed_and_merged() {
        assert!(check_pull_request_open("open", false).passed);
        assert!(!check_pull_request_open("closed", false).passed);
        let merged = check_pull_request_open("closed", true);
        assert!(!merged.passed);
        assert!(merged.detail.contains("merged"));
    }

    #[test]
    fn functional_trusted_approvers_ignore_self_and_untrusted_reviews() {
        let reviews = vec![
            review(1, "author", "APPROVED"),
            review(2, "mallory", "APPROVED"),
            review(3, "bob", "APPROVED"),
        ];
        assert_eq!(
            trusted_approvers(&reviews, "author", &trusted()),
            vec!["bob".to_string()]
        );
    }

    #[test]
    fn integration_trusted_approvers_use_latest_decisive_review() {
        let reviews = vec![
            review(1, "alice", "APPROVED"),
            review(2, "alice", "CHANGES_REQUESTED"),
            review(3, "bob", "APPROVED"),
            review(4, "bob", "COMMENTED"),
        ];
        let check = check_approvals(&reviews, "author", &trusted(), 2);
        assert!(!check.passed);
        assert_eq!(check.detail, "1/2 trusted approvals (bob)");
        assert_eq!(check.severity, CheckSeverity::Hard);
    }

    #[test]
    fn unit_check_mergeable_treats_unknown_as_passing() {
        assert!(check_mergeable(Some(true)).passed);
        assert!(check_mergeable(None).passed);
        assert!(!check_mergeable(Some(false)).passed);
    }

    #[test]
    fn functional_check_ci_distinguishes_pending_from_failing() {
        let pending = check_ci(
            &listing(vec![run("build", "in_progress", None)]),
            &statuses(&[]),
        );
        assert!(!pending.passed);
        assert!(pending.detail.starts_with("pending:"));

        let failing = check_ci(
            &listing(vec![
                run("build", "in_progress", None),
                run("lint", "completed", Some("failure")),
            ]),
            &statuses(&[]),
        );
        assert!(!failing.passed);
        assert!(failing.detail.starts_with("failing: lint"));
    }

    #[test]
    fn integration_check_ci_unions_check_runs_and_legacy_statuses() {
        let green_runs = listing(vec![
            run("build", "completed", Some("success")),
            run("docs", "completed", Some("skipped")),
            run("bench", "completed", Some("neutral")),
        ]);
        assert!(check_ci(&green_runs, &statuses(&[("ci/legacy", "success")])).passed);
        let legacy_red = check_ci(&green_runs, &statuses(&[("ci/legacy", "error")]));
        assert!(!legacy_red.passed);
        assert!(legacy_red.detail.contains("ci/legacy"));
        let legacy_pending = check_ci(&green_runs, &statuses(&[("ci/legacy", "pending")]));
        assert!(legacy_pending.detail.starts_with("pending:"));
    }

    #[test]
    fn regression_check_ci_fails_closed_on_truncated_listing_even_when_visible_runs_pass() {
        let mut capped = listing(vec![run("build", "completed", Some("success"))]);
        capped.total_count = 120;
        let check = check_ci(&capped, &statuses(&[("ci/legacy", "success")]));
        assert!(!check.passed);
        assert!(check.detail.contains("1 of 120"));
    }

    #[test]
    fn regression_check_ci_fails_closed_when_commit_statuses_are_paged_out() {
        let mut partial = statuses(&[("ci/a", "success")]);
        partial.state = "failure".to_string();
        partial.total_count = 40;
        let check = check_ci(&CheckRunListing::default(), &partial);
        assert!(!check.passed);
        assert_eq!(check.detail, "cannot verify all commit statuses: saw 1 of 40");
    }

    #[test]
    fn unit_check_ci_without_any_signal_means_no_ci_configured() {
        let check = check_ci(&CheckRunListing::default(), &GithubCombinedStatus::default());
        assert!(check.passed);
        assert_eq!(check.detail, "no CI configured");
    }

    #[test]
    fn functional_all_hard_checks_passed_ignores_advisory_failures() {
        let result = PreflightResult {
            checks: vec![
                check_mergeable(Some(true)),
                check_implementation_label(false, "implementation"),
            ],
        };
        assert!(result.all_hard_checks_passed());
        assert_eq!(result.failed().count(), 1);
        assert!(result
            .check(PreflightCheckName::ImplementationLabel)
            .is_some_and(|check| check.severity == CheckSeverity::Advisory));
    }
}
