//! Callback registry: the client-supplied predicates and event sinks.
//!
//! At most one `is_ready`, one `is_stale`, one `priority`, and one sink
//! per event type may be registered. Registering a second one is a
//! `CONFIG_ERROR`. All callbacks are plain synchronous closures: they are
//! expected to be short and non-blocking, so there is no async callback
//! surface; a callback that needs to do I/O should keep it quick or
//! precompute it outside the callback.

use std::sync::Arc;

use serde_json::Value;

use crate::error::CoordinatorError;
use crate::work::WorkUnit;

/// Context passed to the priority callback: how long the unit has been
/// waiting and how many other items are in the current pending scan.
#[derive(Debug, Clone, Copy)]
pub struct PriorityContext {
    pub wait_time: std::time::Duration,
    pub queue_depth: usize,
}

pub type ReadyFn = Arc<dyn Fn(&WorkUnit) -> anyhow::Result<bool> + Send + Sync>;
pub type StaleFn = Arc<dyn Fn(&WorkUnit) -> anyhow::Result<bool> + Send + Sync>;
pub type PriorityFn = Arc<dyn Fn(&WorkUnit, PriorityContext) -> anyhow::Result<f64> + Send + Sync>;

pub type OnStartFn = Arc<dyn Fn(&WorkUnit) + Send + Sync>;
pub type OnCompleteFn = Arc<dyn Fn(&WorkUnit, &Value, f64) + Send + Sync>;
pub type OnFailureFn = Arc<dyn Fn(&WorkUnit, &str) + Send + Sync>;
pub type OnSkipFn = Arc<dyn Fn(&WorkUnit) + Send + Sync>;
pub type OnStallWarningFn = Arc<dyn Fn(f64, usize) + Send + Sync>;

/// Holds the single optional predicate and event-sink callbacks for a
/// coordinator instance.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    pub(crate) is_ready: Option<ReadyFn>,
    pub(crate) is_stale: Option<StaleFn>,
    pub(crate) priority: Option<PriorityFn>,
    pub(crate) on_start: Option<OnStartFn>,
    pub(crate) on_complete: Option<OnCompleteFn>,
    pub(crate) on_failure: Option<OnFailureFn>,
    pub(crate) on_skip: Option<OnSkipFn>,
    pub(crate) on_stall_warning: Option<OnStallWarningFn>,
}

/// Macro-free boilerplate for "register unless already set" — there are
/// eight of these and they're all one line different, so a helper method
/// per field reads better here than a generic macro would.
impl CallbackRegistry {
    pub fn set_is_ready(&mut self, f: ReadyFn) -> Result<(), CoordinatorError> {
        if self.is_ready.is_some() {
            return Err(CoordinatorError::ConfigError(
                "is_ready is already registered".to_string(),
            ));
        }
        self.is_ready = Some(f);
        Ok(())
    }

    pub fn set_is_stale(&mut self, f: StaleFn) -> Result<(), CoordinatorError> {
        if self.is_stale.is_some() {
            return Err(CoordinatorError::ConfigError(
                "is_stale is already registered".to_string(),
            ));
        }
        self.is_stale = Some(f);
        Ok(())
    }

    pub fn set_priority(&mut self, f: PriorityFn) -> Result<(), CoordinatorError> {
        if self.priority.is_some() {
            return Err(CoordinatorError::ConfigError(
                "priority is already registered".to_string(),
            ));
        }
        self.priority = Some(f);
        Ok(())
    }

    pub fn set_on_start(&mut self, f: OnStartFn) -> Result<(), CoordinatorError> {
        if self.on_start.is_some() {
            return Err(CoordinatorError::ConfigError(
                "on_start is already registered".to_string(),
            ));
        }
        self.on_start = Some(f);
        Ok(())
    }

    pub fn set_on_complete(&mut self, f: OnCompleteFn) -> Result<(), CoordinatorError> {
        if self.on_complete.is_some() {
            return Err(CoordinatorError::ConfigError(
                "on_complete is already registered".to_string(),
            ));
        }
        self.on_complete = Some(f);
        Ok(())
    }

    pub fn set_on_failure(&mut self, f: OnFailureFn) -> Result<(), CoordinatorError> {
        if self.on_failure.is_some() {
            return Err(CoordinatorError::ConfigError(
                "on_failure is already registered".to_string(),
            ));
        }
        self.on_failure = Some(f);
        Ok(())
    }

    pub fn set_on_skip(&mut self, f: OnSkipFn) -> Result<(), CoordinatorError> {
        if self.on_skip.is_some() {
            return Err(CoordinatorError::ConfigError(
                "on_skip is already registered".to_string(),
            ));
        }
        self.on_skip = Some(f);
        Ok(())
    }

    pub fn set_on_stall_warning(&mut self, f: OnStallWarningFn) -> Result<(), CoordinatorError> {
        if self.on_stall_warning.is_some() {
            return Err(CoordinatorError::ConfigError(
                "on_stall_warning is already registered".to_string(),
            ));
        }
        self.on_stall_warning = Some(f);
        Ok(())
    }

    /// Fire `on_start`, catching and logging any callback error so it can
    /// never alter scheduling.
    pub(crate) fn fire_on_start(&self, work: &WorkUnit) {
        if let Some(f) = &self.on_start {
            f(work);
        }
    }

    pub(crate) fn fire_on_complete(&self, work: &WorkUnit, result: &Value, duration_secs: f64) {
        if let Some(f) = &self.on_complete {
            f(work, result, duration_secs);
        }
    }

    pub(crate) fn fire_on_failure(&self, work: &WorkUnit, error: &str) {
        if let Some(f) = &self.on_failure {
            f(work, error);
        }
    }

    pub(crate) fn fire_on_skip(&self, work: &WorkUnit) {
        if let Some(f) = &self.on_skip {
            f(work);
        }
    }

    pub(crate) fn fire_on_stall_warning(&self, seconds_since_progress: f64, pending_count: usize) {
        if let Some(f) = &self.on_stall_warning {
            f(seconds_since_progress, pending_count);
        }
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("is_ready", &self.is_ready.is_some())
            .field("is_stale", &self.is_stale.is_some())
            .field("priority", &self.priority.is_some())
            .field("on_start", &self.on_start.is_some())
            .field("on_complete", &self.on_complete.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .field("on_skip", &self.on_skip.is_some())
            .field("on_stall_warning", &self.on_stall_warning.is_some())
            .finish()
    }
}
