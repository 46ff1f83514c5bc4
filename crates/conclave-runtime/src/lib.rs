//! Async governance engine: the platform seam, the GitHub client, and the
//! phase, readiness, link-resolution, intake, sweep and webhook workflows
//! built on top of `conclave-governance`.

pub mod api_error;
pub mod engine_error;
pub mod github_api_client;
pub mod intake;
pub mod label_ops;
pub mod link_resolver;
pub mod merge_readiness;
pub mod notification_ledger;
pub mod phase_orchestrator;
pub mod platform;
pub mod reconciliation;
pub mod runtime_config;
pub mod stale_sweep;
pub mod webhook_dispatch;

pub use api_error::{ApiError, LabelChange};
pub use engine_error::{EngineError, LinkResolutionError, SweepError};
pub use github_api_client::GithubApiClient;
pub use platform::GovernancePlatform;
pub use runtime_config::RuntimeConfig;
