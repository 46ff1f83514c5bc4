//! Stale pull request lifecycle: `Active -> Warned -> Closed`, with
//! `Warned -> Active` when non-automated activity resumes.
//!
//! The stale label is the only memory of a prior warning.

use chrono::{DateTime, Utc};

use crate::github_types::PullRequestActivity;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleState {
    Active,
    Warned,
}

impl StaleState {
    pub fn from_label(labeled: bool) -> Self {
        if labeled {
            Self::Warned
        } else {
            Self::Active
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleAction {
    None,
    Warn,
    Close,
    Recover,
}

impl StaleAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Warn => "warn",
            Self::Close => "close",
            Self::Recover => "recover",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaleThresholds {
    pub warn_at_days: u64,
}

impl StaleThresholds {
    pub fn close_at_days(&self) -> u64 {
        self.warn_at_days.saturating_mul(2)
    }
}

pub fn decide_stale_action(
    state: StaleState,
    days_inactive: u64,
    thresholds: StaleThresholds,
) -> StaleAction {
    if thresholds.warn_at_days == 0 {
        return StaleAction::None;
    }
    match state {
        StaleState::Active if days_inactive >= thresholds.warn_at_days => StaleAction::Warn,
        StaleState::Active => StaleAction::None,
        StaleState::Warned if days_inactive >= thresholds.close_at_days() => StaleAction::Close,
        StaleState::Warned if days_inactive < thresholds.warn_at_days => StaleAction::Recover,
        StaleState::Warned => StaleAction::None,
    }
}

/// Whole days elapsed; activity stamped in the future counts as zero.
pub fn whole_days_between(since: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    let elapsed = now.signed_duration_since(since).num_days();
    u64::try_from(elapsed).unwrap_or(0)
}

/// Latest activity not produced by automation, falling back to creation time.
pub fn last_human_activity(
    activity: &[PullRequestActivity],
    created_at: DateTime<Utc>,
    bot_login: Option<&str>,
) -> DateTime<Utc> {
    activity
        .iter()
        .filter(|event| {
            event
                .actor
                .as_ref()
                .map(|actor| !actor.is_automation(bot_login))
                .unwrap_or(true)
        })
        .map(|event| event.occurred_at)
        .chain(std::iter::once(created_at))
        .max()
        .unwrap_or(created_at)
}

#[cfg(test)]
mod tests {
    use super::{
        decide_stale_action, last_human_activity, whole_days_between, StaleAction, StaleState,
        StaleThresholds,
    };
    use crate::github_types::{parse_github_timestamp, GithubUser, PullRequestActivity};
    use chrono::Duration;

    const THRESHOLDS: StaleThresholds = StaleThresholds { warn_at_days: 7 };

    #[test]
    fn unit_active_pr_warns_exactly_at_threshold() {
        assert_eq!(
            decide_stale_action(StaleState::Active, 7, THRESHOLDS),
            StaleAction::Warn
        );
        assert_eq!(
            decide_stale_action(StaleState::Active, 6, THRESHOLDS),
            StaleAction::None
        );
    }

    #[test]
    fn functional_warned_pr_closes_exactly_at_double_threshold() {
        assert_eq!(
            decide_stale_action(StaleState::Warned, 14, THRESHOLDS),
            StaleAction::Close
        );
        assert_eq!(
            decide_stale_action(StaleState::Warned, 13, THRESHOLDS),
            StaleAction::None
        );
    }

    #[test]
    fn integration_unwarned_pr_is_warned_before_it_can_close() {
        assert_eq!(
            decide_stale_action(StaleState::Active, 40, THRESHOLDS),
            StaleAction::Warn
        );
    }

    #[test]
    fn functional_resumed_activity_recovers_warned_pr() {
        for days in 0..7 {
            assert_eq!(
                decide_stale_action(StaleState::Warned, days, THRESHOLDS),
                StaleAction::Recover
            );
        }
    }

    #[test]
    fn regression_zero_threshold_disables_lifecycle() {
        let disabled = StaleThresholds { warn_at_days: 0 };
        assert_eq!(
            decide_stale_action(StaleState::Warned, 100, disabled),
            StaleAction::None
        );
    }

    #[test]
    fn unit_whole_days_between_floors_and_clamps_future() {
        let start = parse_github_timestamp("2026-01-01T00:00:00Z").expect("start");
        assert_eq!(whole_days_between(start, start + Duration::hours(47)), 1);
        assert_eq!(whole_days_between(start, start + Duration::days(7)), 7);
        assert_eq!(whole_days_between(start + Duration::days(1), start), 0);
    }

    #[test]
    fn functional_last_human_activity_skips_automation_events() {
        let created = parse_github_timestamp("2026-01-01T00:00:00Z").expect("created");
        let activity = vec![
            PullRequestActivity {
                kind: "commented".to_string(),
                actor: Some(GithubUser::new("alice")),
                occurred_at: created + Duration::days(2),
            },
            PullRequestActivity {
                kind: "labeled".to_string(),
                actor: Some(GithubUser::new("conclave-bot")),
                occurred_at: created + Duration::days(9),
            },
            PullRequestActivity {
                kind: "committed".to_string(),
                actor: None,
                occurred_at: created + Duration::days(1),
            },
        ];
        assert_eq!(
            last_human_activity(&activity, created, Some("conclave-bot")),
            created + Duration::days(2)
        );
        assert_eq!(last_human_activity(&[], created, None), created);
    }
}
