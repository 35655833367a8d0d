//! In-process work coordinator: admits, schedules, and dispatches work
//! units against named services under per-service concurrency and
//! sliding-window rate limits, honoring client-supplied readiness and
//! staleness predicates.
//!
//! The entry point is [`Coordinator`]. Build one with
//! [`Coordinator::new`], register services and task types, wire up any of
//! the optional predicate/event callbacks, call [`Coordinator::start`],
//! then [`Coordinator::submit`] work and poll [`Coordinator::get`] or
//! [`Coordinator::list`] for results.

mod admission;
mod callbacks;
mod config;
mod coordinator;
mod dispatch;
mod error;
mod handler;
mod priority;
mod scheduler;
mod service;
mod shared;
mod store;
mod task;
mod work;

pub use callbacks::{
    OnCompleteFn, OnFailureFn, OnSkipFn, OnStallWarningFn, OnStartFn, PriorityContext, PriorityFn, ReadyFn,
    StaleFn,
};
pub use config::CoordinatorConfig;
pub use coordinator::{BlockedUnit, Coordinator};
pub use error::{CoordinatorError, Result};
pub use handler::{AsyncHandler, Handler, SyncHandlerFn};
pub use service::{parse_rate, RateLimit};
pub use store::{CancelOutcome, ListFilter, Progress};
pub use work::{WorkId, WorkState, WorkUnit};
