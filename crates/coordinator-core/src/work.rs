//! The [`WorkUnit`] record and its state machine.
//!
//! The coordinator owns every `WorkUnit`; clients only ever see snapshots (`WorkUnit` is
//! `Clone`, handed out by value so handlers and callbacks can't mutate
//! coordinator state through a borrow).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

/// Opaque work identifier. Backed by a v4 UUID, rendered as a string so
/// callers never depend on its internal shape.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WorkId(String);

impl WorkId {
    pub(crate) fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The lifecycle state of a [`WorkUnit`].
///
/// Valid transitions:
/// ```text
/// PENDING -> RUNNING
/// PENDING -> COMPLETED   (stale-skip, or retry ceiling not involved)
/// PENDING -> CANCELLED
/// RUNNING -> COMPLETED
/// RUNNING -> FAILED
/// RUNNING -> CANCELLED
/// RUNNING -> PENDING     (retry: failure with attempts remaining)
/// ```
/// There is no edge back out of `COMPLETED`, `FAILED`, or `CANCELLED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkState {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl fmt::Display for WorkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(s)
    }
}

impl WorkState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

/// The authoritative record for a single submitted unit of work.
///
/// `params` and `result`/`error`
/// are opaque JSON values: the coordinator never interprets them, only
/// passes them through to handlers and predicates.
#[derive(Debug, Clone)]
pub struct WorkUnit {
    pub id: WorkId,
    pub task: String,
    pub params: Value,
    pub state: WorkState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempt: u32,
    /// Earliest wall time at which a retry of this unit may be
    /// re-dispatched. `None` means immediately eligible.
    pub(crate) not_before: Option<DateTime<Utc>>,
    /// Set when `cancel` is called while this unit is `RUNNING`. Checked
    /// when the dispatcher's completion message arrives.
    pub(crate) cancel_requested: bool,
    /// Set once a pending-timeout warning has fired for this unit, so it
    /// only fires once.
    pub(crate) pending_warned: bool,
}

impl WorkUnit {
    pub(crate) fn new(task: String, params: Value, now: DateTime<Utc>) -> Self {
        Self {
            id: WorkId::new(),
            task,
            params,
            state: WorkState::Pending,
            created_at: now,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
            attempt: 0,
            not_before: None,
            cancel_requested: false,
            pending_warned: false,
        }
    }
}
