//! Error taxonomy for the platform seam.
//!
//! HTTP status codes are classified once, inside the client. Outcomes that
//! are expected rather than exceptional (adding a label that is already
//! present, removing one that is already gone) are success values.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    #[error("github {operation}: not found")]
    NotFound { operation: String },
    #[error("github {operation}: conflict: {message}")]
    Conflict { operation: String, message: String },
    #[error("github {operation}: transient failure: {message}")]
    Transient { operation: String, message: String },
    #[error("github {operation}: rejected with status {status}: {message}")]
    Rejected {
        operation: String,
        status: u16,
        message: String,
    },
    #[error("github {operation}: not supported by this deployment: {message}")]
    Unsupported { operation: String, message: String },
    #[error("github {operation}: failed to decode response: {message}")]
    Decode { operation: String, message: String },
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }

    pub fn not_found(operation: impl Into<String>) -> Self {
        Self::NotFound {
            operation: operation.into(),
        }
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Effect of a label mutation; re-applying an existing state is not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelChange {
    Added,
    AlreadyPresent,
    Removed,
    AlreadyAbsent,
}

impl LabelChange {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Added | Self::Removed)
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiError, LabelChange};

    #[test]
    fn unit_api_error_predicates_match_variants() {
        assert!(ApiError::not_found("get issue").is_not_found());
        assert!(ApiError::transient("list reviews", "502").is_transient());
        assert!(ApiError::unsupported("graphql", "missing field").is_unsupported());
        let rejected = ApiError::Rejected {
            operation: "add label".to_string(),
            status: 401,
            message: "bad credentials".to_string(),
        };
        assert!(!rejected.is_transient());
        assert!(rejected.to_string().contains("status 401"));
    }

    #[test]
    fn unit_label_change_reports_only_real_mutations() {
        assert!(LabelChange::Added.changed());
        assert!(LabelChange::Removed.changed());
        assert!(!LabelChange::AlreadyPresent.changed());
        assert!(!LabelChange::AlreadyAbsent.changed());
    }
}
