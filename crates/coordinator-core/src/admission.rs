//! Admission evaluator: the pure decision function that gates dispatch.
//!
//! Given a pending work unit and the current service/task/callback
//! state, decides whether it should be skipped, left pending (for one of
//! three reasons), or dispatched. Checks run in a fixed order —
//! readiness before staleness before service admission — because
//! `is_ready`/`is_stale` may perform client I/O whose cost the client
//! controls, and that ordering is observable to callers.

use chrono::{DateTime, Utc};

use crate::callbacks::CallbackRegistry;
use crate::service::ServiceTable;
use crate::task::TaskRegistry;
use crate::work::WorkUnit;

/// The decision produced by [`evaluate`] for one pending work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// `is_stale` (or its absence) said this unit's output is already
    /// current; it should be transitioned straight to `COMPLETED`
    /// without running.
    Skip,
    /// Ready to run: task known, ready, stale, and the service has room.
    Dispatch,
    /// `w.task` is not in the task registry. Exposed via `debug_blocked`;
    /// does not fail the unit (tasks may register after submit).
    UnknownTask,
    /// `is_ready` returned false, or raised (fail-closed).
    BlockedNotReady,
    /// Ready and stale, but the bound service has no free capacity.
    BlockedService,
}

/// Evaluate one pending unit against current coordinator state.
///
/// Mutates nothing — `can_admit` on `ServiceTable` only inspects and
/// evicts aged-out ring entries, it does not reserve anything.
pub fn evaluate(
    work: &WorkUnit,
    tasks: &TaskRegistry,
    services: &mut ServiceTable,
    callbacks: &CallbackRegistry,
    now: DateTime<Utc>,
) -> Outcome {
    // Respect the retry backoff deadline recorded on the unit.
    if let Some(not_before) = work.not_before {
        if now < not_before {
            return Outcome::BlockedNotReady;
        }
    }

    let Some(task) = tasks.get(&work.task) else {
        return Outcome::UnknownTask;
    };

    // 1. Readiness.
    if let Some(is_ready) = &callbacks.is_ready {
        match is_ready(work) {
            Ok(true) => {}
            Ok(false) => return Outcome::BlockedNotReady,
            Err(e) => {
                tracing::warn!(work_id = %work.id, error = %e, "is_ready callback raised; treating as not ready");
                return Outcome::BlockedNotReady;
            }
        }
    }

    // 2. Staleness.
    if let Some(is_stale) = &callbacks.is_stale {
        match is_stale(work) {
            Ok(false) => return Outcome::Skip,
            Ok(true) => {}
            Err(e) => {
                tracing::warn!(work_id = %work.id, error = %e, "is_stale callback raised; running fail-open");
            }
        }
    }

    // 3. Service admission.
    if !services.can_admit(&task.service, now) {
        return Outcome::BlockedService;
    }

    Outcome::Dispatch
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::Handler;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (TaskRegistry, ServiceTable) {
        let mut services = ServiceTable::new();
        services.register("api", Some(1), None).unwrap();
        let mut tasks = TaskRegistry::new();
        tasks
            .register(&services, "fetch", "api", None, Handler::sync(|_| Ok(json!(null))))
            .unwrap();
        (tasks, services)
    }

    #[test]
    fn unknown_task_does_not_block_permanently() {
        let (tasks, mut services) = setup();
        let callbacks = CallbackRegistry::default();
        let now = Utc::now();
        let work = WorkUnit::new("ghost".to_string(), json!({}), now);
        assert_eq!(
            evaluate(&work, &tasks, &mut services, &callbacks, now),
            Outcome::UnknownTask
        );
    }

    #[test]
    fn no_callbacks_dispatches_when_service_has_room() {
        let (tasks, mut services) = setup();
        let callbacks = CallbackRegistry::default();
        let now = Utc::now();
        let work = WorkUnit::new("fetch".to_string(), json!({}), now);
        assert_eq!(
            evaluate(&work, &tasks, &mut services, &callbacks, now),
            Outcome::Dispatch
        );
    }

    #[test]
    fn not_ready_blocks_before_touching_service() {
        let (tasks, mut services) = setup();
        let mut callbacks = CallbackRegistry::default();
        callbacks.set_is_ready(Arc::new(|_| Ok(false))).unwrap();
        let now = Utc::now();
        let work = WorkUnit::new("fetch".to_string(), json!({}), now);
        assert_eq!(
            evaluate(&work, &tasks, &mut services, &callbacks, now),
            Outcome::BlockedNotReady
        );
        // Service admission untouched: still no reservations.
        assert_eq!(services.active_count("api"), 0);
    }

    #[test]
    fn not_stale_skips_without_checking_service() {
        let (tasks, mut services) = setup();
        services.reserve("api", Utc::now()); // saturate the only slot
        let mut callbacks = CallbackRegistry::default();
        callbacks.set_is_stale(Arc::new(|_| Ok(false))).unwrap();
        let now = Utc::now();
        let work = WorkUnit::new("fetch".to_string(), json!({}), now);
        assert_eq!(
            evaluate(&work, &tasks, &mut services, &callbacks, now),
            Outcome::Skip
        );
    }

    #[test]
    fn is_ready_error_is_fail_closed() {
        let (tasks, mut services) = setup();
        let mut callbacks = CallbackRegistry::default();
        callbacks
            .set_is_ready(Arc::new(|_| anyhow::bail!("boom")))
            .unwrap();
        let now = Utc::now();
        let work = WorkUnit::new("fetch".to_string(), json!({}), now);
        assert_eq!(
            evaluate(&work, &tasks, &mut services, &callbacks, now),
            Outcome::BlockedNotReady
        );
    }

    #[test]
    fn is_stale_error_is_fail_open() {
        let (tasks, mut services) = setup();
        let mut callbacks = CallbackRegistry::default();
        callbacks
            .set_is_stale(Arc::new(|_| anyhow::bail!("boom")))
            .unwrap();
        let now = Utc::now();
        let work = WorkUnit::new("fetch".to_string(), json!({}), now);
        assert_eq!(
            evaluate(&work, &tasks, &mut services, &callbacks, now),
            Outcome::Dispatch
        );
    }

    #[test]
    fn saturated_service_blocks() {
        let (tasks, mut services) = setup();
        services.reserve("api", Utc::now());
        let callbacks = CallbackRegistry::default();
        let now = Utc::now();
        let work = WorkUnit::new("fetch".to_string(), json!({}), now);
        assert_eq!(
            evaluate(&work, &tasks, &mut services, &callbacks, now),
            Outcome::BlockedService
        );
    }
}
