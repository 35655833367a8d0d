//! Error types surfaced across the coordinator's public API.
//!
//! Internal plumbing (rate-string parsing helpers, store bookkeeping) uses
//! `anyhow` for quick context chaining; the boundary the application sees
//! is the typed [`CoordinatorError`] enum below, one variant per error
//! kind named in the spec's external-interfaces section.

use crate::work::WorkId;

/// Errors returned by the coordinator's public surface.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// A registration call conflicts with existing configuration: an
    /// already-registered service/task with different parameters, a
    /// duplicate name, or a second predicate/event callback registered
    /// where only one may exist.
    #[error("config error: {0}")]
    ConfigError(String),

    /// `submit` named a task that has not been registered.
    #[error("unknown task: {0}")]
    UnknownTask(String),

    /// `submit` was called after `stop()` completed.
    #[error("coordinator has shut down")]
    Shutdown,

    /// A rate-limit string did not match the accepted grammar.
    #[error("invalid rate format: {0}")]
    RateFormatError(String),

    /// `cancel`/`get` referenced a work id that was never submitted.
    #[error("unknown work id: {0}")]
    UnknownWorkId(WorkId),
}

pub type Result<T> = std::result::Result<T, CoordinatorError>;
