//! Pure governance rules shared by the Conclave runtime crates.
//!
//! Covers vote tallying, the phase transition table, label naming, the
//! notification ledger marker format, closing-keyword parsing, stale
//! lifecycle decisions, preflight check builders, and repository config.

pub mod closing_keywords;
pub mod github_transport_helpers;
pub mod github_types;
pub mod governance_command;
pub mod label_catalog;
pub mod notification_marker;
pub mod notification_render;
pub mod phase_transition;
pub mod preflight_checks;
pub mod repo_config;
pub mod repo_ref;
pub mod stale_lifecycle;
pub mod vote_tally;
