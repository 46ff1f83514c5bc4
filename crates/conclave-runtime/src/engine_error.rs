use thiserror::Error;

use crate::api_error::ApiError;

/// Failure of candidate-link resolution. Never conflated with "no links".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkResolutionError {
    #[error("issue #{issue}: all {attempted} candidate verifications failed: {first_error}")]
    AllVerificationsFailed {
        issue: u64,
        attempted: usize,
        first_error: String,
    },
    #[error("issue #{issue}: candidate discovery failed: {source}")]
    Discovery {
        issue: u64,
        #[source]
        source: ApiError,
    },
    #[error("pr #{pr}: closing issue lookup failed: {source}")]
    ClosingReferences {
        pr: u64,
        #[source]
        source: ApiError,
    },
    #[error("pr #{pr}: fallback verification failed for issue #{issue}: {source}")]
    FallbackFetch {
        pr: u64,
        issue: u64,
        #[source]
        source: ApiError,
    },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error(transparent)]
    LinkResolution(#[from] LinkResolutionError),
    #[error("{0}")]
    Inconsistent(String),
}

/// One failed unit inside a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepFailure {
    pub item: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SweepError {
    #[error("{sweep} sweep failed for {}: {}", failed_items(.failures), first_message(.failures))]
    Partial {
        sweep: &'static str,
        failures: Vec<SweepFailure>,
    },
}

impl SweepError {
    pub fn failures(&self) -> &[SweepFailure] {
        match self {
            Self::Partial { failures, .. } => failures,
        }
    }
}

fn failed_items(failures: &[SweepFailure]) -> String {
    failures
        .iter()
        .map(|failure| failure.item.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

fn first_message(failures: &[SweepFailure]) -> &str {
    failures
        .first()
        .map(|failure| failure.message.as_str())
        .unwrap_or("no failure detail")
}

/// Catch-and-collect accumulator used by every sweep.
#[derive(Debug, Default)]
pub struct SweepFailures {
    failures: Vec<SweepFailure>,
}

impl SweepFailures {
    pub fn record(&mut self, item: impl Into<String>, error: impl std::fmt::Display) {
        let item = item.into();
        let message = error.to_string();
        tracing::warn!(item = %item, error = %message, "sweep item failed");
        self.failures.push(SweepFailure { item, message });
    }

    pub fn extend(&mut self, error: SweepError) {
        let SweepError::Partial { failures, .. } = error;
        self.failures.extend(failures);
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn finish(self, sweep: &'static str) -> Result<(), SweepError> {
        if self.failures.is_empty() {
            return Ok(());
        }
        tracing::error!(
            sweep,
            failed = self.failures.len(),
            "sweep finished with failures"
        );
        Err(SweepError::Partial {
            sweep,
            failures: self.failures,
        })
    }
}
