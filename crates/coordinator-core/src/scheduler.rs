//! The scheduler loop.
//!
//! One loop task owns every mutation after startup: each iteration snapshots
//! the pending bag, sorts it by priority, walks it through the admission
//! evaluator, and spawns a dispatch task per admitted unit. Handler
//! completions come back over an mpsc channel and are applied by the same
//! loop, so every state transition in the coordinator happens inside this
//! one task — no work unit is ever touched from two places at once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::admission::{evaluate, Outcome};
use crate::config::CoordinatorConfig;
use crate::coordinator::Inner;
use crate::dispatch::{retry_delay, run_dispatch, DispatchDone};
use crate::priority::{sort_by_priority, PriorityKey};
use crate::shared::CoordinatorState;
use crate::work::WorkState;

/// Run the scheduler loop until `inner.shutdown` is cancelled.
///
/// `stop()` is responsible for waiting until no handlers are in flight
/// before it cancels the token, so by the time this loop observes
/// cancellation the completion channel is already empty.
pub(crate) async fn run(inner: Arc<Inner>) {
    let (tx, mut rx) = mpsc::channel::<DispatchDone>(1024);
    let mut tick = tokio::time::interval(inner.config.tick_interval);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        if inner.shutdown.is_cancelled() {
            break;
        }

        while let Ok(done) = rx.try_recv() {
            handle_completion(&inner, done);
        }

        run_iteration(&inner, &tx);

        tokio::select! {
            _ = inner.notify.notified() => {}
            _ = tick.tick() => {}
            Some(done) = rx.recv() => handle_completion(&inner, done),
            _ = inner.shutdown.cancelled() => {}
        }
    }

    while let Ok(done) = rx.try_recv() {
        handle_completion(&inner, done);
    }
}

/// One pass: snapshot pending, sort by priority, evaluate each unit, and
/// spawn a dispatch task for everything admitted. Holds the state lock for
/// the whole walk (synchronous work only, no `.await` inside) and releases
/// it before spawning.
fn run_iteration(inner: &Arc<Inner>, tx: &mpsc::Sender<DispatchDone>) {
    let now = Utc::now();
    let mut to_dispatch = Vec::new();

    {
        let mut state = inner.state.lock().unwrap();
        if state.stopping {
            return;
        }

        let mut pending = state.store.pending_snapshot();
        let queue_depth = pending.len();
        let mut keys = HashMap::with_capacity(pending.len());
        for unit in &pending {
            keys.insert(unit.id.clone(), PriorityKey::compute(unit, queue_depth, &state.callbacks, now));
        }
        sort_by_priority(&mut pending, &keys);

        for unit in pending {
            match evaluate(&unit, &state.tasks, &mut state.services, &state.callbacks, now) {
                Outcome::Skip => {
                    state.store.move_to_terminal(&unit.id, WorkState::Completed, None, None, now);
                    state.last_progress = now;
                    state.stall_warned = false;
                    if let Some(updated) = state.store.get(&unit.id) {
                        state.callbacks.fire_on_skip(&updated);
                    }
                }
                Outcome::Dispatch => {
                    let Some(task) = state.tasks.get(&unit.task).cloned() else {
                        continue; // raced with a concurrent deregistration; impossible today, but not our call to panic over
                    };
                    state.services.reserve(&task.service, now);
                    state.store.move_to_running(&unit.id, now);
                    if let Some(updated) = state.store.get(&unit.id) {
                        state.callbacks.fire_on_start(&updated);
                        to_dispatch.push((updated, task));
                    }
                }
                Outcome::UnknownTask | Outcome::BlockedNotReady | Outcome::BlockedService => {}
            }
        }

        check_pending_timeout(&mut state, &inner.config, now);
        check_stall_timeout(&mut state, &inner.config, now);
    }

    for (unit, task) in to_dispatch {
        tokio::spawn(run_dispatch(tx.clone(), task.handler.clone(), unit));
    }
}

/// Apply a handler's completion: release the service slot, then resolve to
/// `CANCELLED` (if cancellation was requested while it ran), `COMPLETED`,
/// a retry back to `PENDING`, or a terminal `FAILED`.
fn handle_completion(inner: &Arc<Inner>, done: DispatchDone) {
    let now = Utc::now();
    let mut state = inner.state.lock().unwrap();

    let Some(unit) = state.store.get(&done.id) else { return };
    let Some(task) = state.tasks.get(&unit.task).cloned() else { return };
    state.services.release(&task.service);

    if state.store.is_cancel_requested(&done.id) {
        state.store.move_to_terminal(&done.id, WorkState::Cancelled, None, None, now);
        state.last_progress = now;
        state.stall_warned = false;
        inner.notify.notify_one();
        return;
    }

    match done.outcome {
        Ok(value) => {
            state.store.move_to_terminal(&done.id, WorkState::Completed, Some(value.clone()), None, now);
            state.last_progress = now;
            state.stall_warned = false;
            if let Some(updated) = state.store.get(&done.id) {
                state.callbacks.fire_on_complete(&updated, &value, done.duration.as_secs_f64());
            }
        }
        Err(error) => {
            if unit.attempt < task.max_attempts {
                let not_before = now
                    + chrono::Duration::from_std(retry_delay(unit.attempt)).unwrap_or(chrono::Duration::zero());
                state.store.retry_to_pending(&done.id, Some(not_before));
            } else {
                state.store.move_to_terminal(&done.id, WorkState::Failed, None, Some(error.clone()), now);
                state.last_progress = now;
                state.stall_warned = false;
            }
            if let Some(updated) = state.store.get(&done.id) {
                state.callbacks.fire_on_failure(&updated, &error);
            }
        }
    }

    inner.notify.notify_one();
}

/// Fail or warn about units that have sat pending too long.
/// Skipped entirely while `stop()` is draining — stopped units stay
/// `PENDING` rather than being auto-failed.
fn check_pending_timeout(state: &mut CoordinatorState, config: &CoordinatorConfig, now: chrono::DateTime<Utc>) {
    if config.pending_timeout.is_none() && config.pending_warn_after.is_none() {
        return;
    }
    for unit in state.store.pending_snapshot() {
        let waited = (now - unit.created_at).to_std().unwrap_or_default();

        if let Some(timeout) = config.pending_timeout {
            if waited > timeout {
                state.store.move_to_terminal(
                    &unit.id,
                    WorkState::Failed,
                    None,
                    Some("pending timeout exceeded".to_string()),
                    now,
                );
                state.last_progress = now;
                state.stall_warned = false;
                if let Some(updated) = state.store.get(&unit.id) {
                    state.callbacks.fire_on_failure(&updated, "pending timeout exceeded");
                }
                continue;
            }
        }

        if let Some(warn_after) = config.pending_warn_after {
            if !unit.pending_warned && waited > warn_after {
                state.store.mark_pending_warned(&unit.id);
                let pending_count = state.store.progress().pending;
                tracing::warn!(work_id = %unit.id, waited_secs = waited.as_secs_f64(), "pending unit exceeded warn threshold");
                state.callbacks.fire_on_stall_warning(waited.as_secs_f64(), pending_count);
            }
        }
    }
}

/// Fail or warn about the whole pending bag once too long has elapsed
/// since the last terminal transition anywhere.
fn check_stall_timeout(state: &mut CoordinatorState, config: &CoordinatorConfig, now: chrono::DateTime<Utc>) {
    let pending_count = state.store.progress().pending;
    if pending_count == 0 {
        return;
    }
    let since = (now - state.last_progress).to_std().unwrap_or_default();

    if let Some(timeout) = config.stall_timeout {
        if since > timeout {
            for unit in state.store.pending_snapshot() {
                state.store.move_to_terminal(
                    &unit.id,
                    WorkState::Failed,
                    None,
                    Some("stall timeout exceeded".to_string()),
                    now,
                );
                if let Some(updated) = state.store.get(&unit.id) {
                    state.callbacks.fire_on_failure(&updated, "stall timeout exceeded");
                }
            }
            state.last_progress = now;
            state.stall_warned = false;
            tracing::warn!(pending_count, "stall timeout exceeded; failed all pending units");
            return;
        }
    }

    if let Some(warn_after) = config.stall_warn_after {
        if !state.stall_warned && since > warn_after {
            state.stall_warned = true;
            let secs = since.as_secs_f64();
            tracing::warn!(seconds_since_progress = secs, pending_count, "stall warning threshold crossed");
            state.callbacks.fire_on_stall_warning(secs, pending_count);
        }
    }
}
