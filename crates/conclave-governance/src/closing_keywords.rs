//! Closing-keyword extraction from pull request descriptions.
//!
//! Mirrors GitHub's auto-close grammar (`close`, `fix`, `resolve` and their
//! inflections, followed by an issue reference) while ignoring text that
//! GitHub itself would not act on: fenced code blocks, inline code spans, and
//! quoted lines.

use std::sync::OnceLock;

use regex::Regex;

use crate::repo_ref::RepoRef;

const CLOSING_REFERENCE_PATTERN: &str = r"(?i)\b(?:close[sd]?|fix(?:e[sd])?|resolve[sd]?):?\s+(?:#(?P<local>\d+)\b|(?P<owner>[A-Za-z0-9_.-]+)/(?P<repo>[A-Za-z0-9_.-]+)#(?P<qualified>\d+)\b|https?://[^\s/]+/(?P<url_owner>[A-Za-z0-9_.-]+)/(?P<url_repo>[A-Za-z0-9_.-]+)/issues/(?P<url_number>\d+)\b)";
const INLINE_CODE_PATTERN: &str = r"`[^`\n]*`";

fn closing_reference_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(CLOSING_REFERENCE_PATTERN).ok())
        .as_ref()
}

fn inline_code_regex() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(INLINE_CODE_PATTERN).ok())
        .as_ref()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosingReference {
    /// `owner/repo` when the reference is qualified, `None` for `#123`.
    pub repository: Option<String>,
    pub number: u64,
}

impl ClosingReference {
    pub fn targets(&self, repo: &RepoRef) -> bool {
        match self.repository.as_deref() {
            None => true,
            Some(slug) => repo.matches_slug(slug),
        }
    }
}

/// Removes fenced blocks, quoted lines, and inline code spans.
pub fn strip_non_actionable_text(body: &str) -> String {
    let mut kept = Vec::new();
    let mut open_fence: Option<&str> = None;
    for line in body.lines() {
        let trimmed = line.trim_start();
        let fence = if trimmed.starts_with("```") {
            Some("```")
        } else if trimmed.starts_with("~~~") {
            Some("~~~")
        } else {
            None
        };
        match (open_fence, fence) {
            (None, Some(marker)) => {
                open_fence = Some(marker);
                continue;
            }
            (Some(open), Some(marker)) if open == marker => {
                open_fence = None;
                continue;
            }
            (Some(_), _) => continue,
            (None, None) => {}
        }
        if trimmed.starts_with('>') {
            continue;
        }
        kept.push(line);
    }
    let joined = kept.join("\n");
    match inline_code_regex() {
        Some(pattern) => pattern.replace_all(&joined, " ").into_owned(),
        None => joined,
    }
}

pub fn parse_closing_references(body: &str) -> Vec<ClosingReference> {
    let Some(pattern) = closing_reference_regex() else {
        return Vec::new();
    };
    let actionable = strip_non_actionable_text(body);
    let mut references = Vec::new();
    for captures in pattern.captures_iter(&actionable) {
        let parsed = if let Some(number) = captures.name("local") {
            number.as_str().parse::<u64>().ok().map(|number| ClosingReference {
                repository: None,
                number,
            })
        } else if let (Some(owner), Some(repo), Some(number)) = (
            captures.name("owner"),
            captures.name("repo"),
            captures.name("qualified"),
        ) {
            number.as_str().parse::<u64>().ok().map(|number| ClosingReference {
                repository: Some(format!("{}/{}", owner.as_str(), repo.as_str())),
                number,
            })
        } else if let (Some(owner), Some(repo), Some(number)) = (
            captures.name("url_owner"),
            captures.name("url_repo"),
            captures.name("url_number"),
        ) {
            number.as_str().parse::<u64>().ok().map(|number| ClosingReference {
                repository: Some(format!("{}/{}", owner.as_str(), repo.as_str())),
                number,
            })
        } else {
            None
        };
        if let Some(reference) = parsed.filter(|reference| reference.number > 0) {
            if !references.contains(&reference) {
                references.push(reference);
            }
        }
    }
    references
}

/// Issue numbers in `repo` that merging a PR with this description would close.
pub fn closing_issue_numbers(body: &str, repo: &RepoRef) -> Vec<u64> {
    let mut numbers = Vec::new();
    for reference in parse_closing_references(body) {
        if reference.targets(repo) && !numbers.contains(&reference.number) {
            numbers.push(reference.number);
        }
    }
    numbers
}

#[cfg(test)]
mod tests {
    use super::{
        closing_issue_numbers, closing_reference_regex, inline_code_regex,
        parse_closing_references, strip_non_actionable_text, ClosingReference,
    };
    use crate::repo_ref::RepoRef;

    fn repo() -> RepoRef {
        RepoRef::parse("hivemind/colony").expect("repo")
    }

    #[test]
    fn unit_patterns_compile() {
        assert!(closing_reference_regex().is_some());
        assert!(inline_code_regex().is_some());
    }

    #[test]
    fn unit_parse_closing_references_accepts_keyword_inflections_case_insensitively() {
        let body = "FIXES #1\ncloses #2, Resolved: #3\nfix #4 and Close #5";
        let numbers = closing_issue_numbers(body, &repo());
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn functional_parse_closing_references_distinguishes_mentions_from_closes() {
        let body = "Related to #7. See also #8.\nThis fixes #9.";
        assert_eq!(closing_issue_numbers(body, &repo()), vec![9]);
    }

    #[test]
    fn integration_parse_closing_references_ignores_code_and_quotes() {
        let body = "\
Implements the proposal.

```text
fixes #10
```

~~~
closes #11
~~~

> Fixes #12 was the old plan

Use `fixes #13` in your PR. Actually resolves #14.";
        assert_eq!(closing_issue_numbers(body, &repo()), vec![14]);
    }

    #[test]
    fn functional_parse_closing_references_filters_to_same_repository() {
        let body = "Fixes hivemind/colony#20\nFixes other/repo#21\nCloses https://github.com/HiveMind/Colony/issues/22\nCloses https://github.com/other/repo/issues/23";
        assert_eq!(closing_issue_numbers(body, &repo()), vec![20, 22]);
        let references = parse_closing_references(body);
        assert!(references.contains(&ClosingReference {
            repository: Some("other/repo".to_string()),
            number: 21,
        }));
    }

    #[test]
    fn regression_parse_closing_references_deduplicates_and_rejects_zero() {
        let body = "Fixes #30\nfixes #30\nFixes #0\nprefixes #31\nfixes#32";
        assert_eq!(closing_issue_numbers(body, &repo()), vec![30]);
    }

    #[test]
    fn regression_unterminated_fence_hides_the_rest_of_the_body() {
        let body = "Fixes #40\n```\nfixes #41";
        assert_eq!(closing_issue_numbers(body, &repo()), vec![40]);
        assert!(!strip_non_actionable_text(body).contains("#41"));
    }
}
