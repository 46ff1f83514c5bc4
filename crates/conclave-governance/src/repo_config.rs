//! Per-repository automation settings.
//!
//! Each automation is an optional section. A missing section disables that
//! automation entirely and every consumer treats it as a silent no-op.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::label_catalog::LabelCatalog;

#[derive(Debug, Error)]
pub enum RepoConfigError {
    #[error("failed to read repository config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse repository config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid repository config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepoConfig {
    /// Login used by this automation; its comments and reactions are never
    /// treated as human activity or votes.
    pub bot_login: Option<String>,
    pub labels: LabelCatalog,
    pub governance: Option<GovernanceConfig>,
    pub merge_readiness: Option<MergeReadinessConfig>,
    pub intake: Option<IntakeConfig>,
    pub stale: Option<StaleConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceConfig {
    /// Logins allowed to trigger phase changes by command.
    #[serde(default)]
    pub maintainers: Vec<String>,
    /// Threshold trigger for Discussion -> Voting; manual only when absent.
    #[serde(default)]
    pub discussion: Option<PhaseTimer>,
    #[serde(default)]
    pub voting: Option<PhaseTimer>,
    #[serde(default)]
    pub extended_voting: Option<PhaseTimer>,
}

impl GovernanceConfig {
    pub fn is_maintainer(&self, login: &str) -> bool {
        self.maintainers
            .iter()
            .any(|maintainer| maintainer.trim().eq_ignore_ascii_case(login.trim()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseTimer {
    pub after_minutes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeReadinessConfig {
    pub trusted_reviewers: Vec<String>,
    #[serde(default = "default_min_approvals")]
    pub min_approvals: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeConfig {
    #[serde(default = "default_max_competing_prs")]
    pub max_competing_prs: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleConfig {
    pub warn_after_days: u64,
}

fn default_min_approvals() -> usize {
    1
}

fn default_max_competing_prs() -> usize {
    3
}

impl RepoConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, RepoConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, RepoConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| RepoConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn bot_login(&self) -> Option<&str> {
        self.bot_login
            .as_deref()
            .map(str::trim)
            .filter(|login| !login.is_empty())
    }

    pub fn validate(&self) -> Result<(), RepoConfigError> {
        if let Some(readiness) = &self.merge_readiness {
            if readiness.min_approvals > 0 && readiness.trusted_reviewers.is_empty() {
                return Err(RepoConfigError::Invalid(
                    "merge_readiness.trusted_reviewers must list at least one reviewer".to_string(),
                ));
            }
        }
        if let Some(intake) = &self.intake {
            if intake.max_competing_prs == 0 {
                return Err(RepoConfigError::Invalid(
                    "intake.max_competing_prs must be greater than 0".to_string(),
                ));
            }
        }
        if let Some(stale) = &self.stale {
            if stale.warn_after_days == 0 {
                return Err(RepoConfigError::Invalid(
                    "stale.warn_after_days must be greater than 0".to_string(),
                ));
            }
        }
        if let Some(governance) = &self.governance {
            let timers = [
                ("discussion", governance.discussion),
                ("voting", governance.voting),
                ("extended_voting", governance.extended_voting),
            ];
            for (name, timer) in timers {
                if timer.is_some_and(|timer| timer.after_minutes == 0) {
                    return Err(RepoConfigError::Invalid(format!(
                        "governance.{name}.after_minutes must be greater than 0"
                    )));
                }
            }
        }
        Ok(())
    }
}
