use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid repository '{raw}', expected owner/repo")]
pub struct RepoRefParseError {
    pub raw: String,
}

/// Repository coordinates shared by every issue and pull request reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn parse(raw: &str) -> Result<Self, RepoRefParseError> {
        let trimmed = raw.trim();
        let invalid = || RepoRefParseError {
            raw: raw.to_string(),
        };
        let (owner, name) = trimmed.split_once('/').ok_or_else(invalid)?;
        let owner = owner.trim();
        let name = name.trim();
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return Err(invalid());
        }
        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn as_slug(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }

    /// GitHub compares `owner/name` case-insensitively.
    pub fn matches_slug(&self, slug: &str) -> bool {
        slug.trim().eq_ignore_ascii_case(&self.as_slug())
    }

    pub fn issue(&self, number: u64) -> ItemRef {
        ItemRef {
            repo: self.clone(),
            number,
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// `(owner, repo, number)` identity of an issue or pull request.
///
/// Numbers are assigned by the platform and never reused, so the triple is a
/// stable key for every idempotency check.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemRef {
    pub repo: RepoRef,
    pub number: u64,
}

impl fmt::Display for ItemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}
