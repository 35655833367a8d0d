//! Priority ordering for the scheduler's per-iteration pending walk.

use chrono::{DateTime, Utc};

use crate::callbacks::{CallbackRegistry, PriorityContext};
use crate::work::WorkUnit;

/// Sort key for one pending unit: higher `score` goes first; ties break
/// on `created_at` ascending (older first) to guarantee forward progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriorityKey {
    pub score: f64,
    pub created_at: DateTime<Utc>,
}

impl PriorityKey {
    /// Compute the key for `work` given the current pending-queue depth.
    ///
    /// With no priority callback registered, the key is `(wait_time,
    /// -created_at)` — effectively FIFO. A registered callback is
    /// expected to return a value in `[0, 1]`; errors default to `0.5`.
    pub fn compute(work: &WorkUnit, queue_depth: usize, callbacks: &CallbackRegistry, now: DateTime<Utc>) -> Self {
        let score = match &callbacks.priority {
            Some(f) => {
                let ctx = PriorityContext {
                    wait_time: (now - work.created_at).to_std().unwrap_or_default(),
                    queue_depth,
                };
                match f(work, ctx) {
                    Ok(v) => v.clamp(0.0, 1.0),
                    Err(e) => {
                        tracing::warn!(work_id = %work.id, error = %e, "priority callback raised; defaulting to 0.5");
                        0.5
                    }
                }
            }
            None => {
                let wait = (now - work.created_at).num_milliseconds().max(0) as f64 / 1000.0;
                wait
            }
        };
        PriorityKey { score, created_at: work.created_at }
    }
}

/// Sort pending units by decreasing priority, older-first on ties.
pub fn sort_by_priority(units: &mut [WorkUnit], keys: &std::collections::HashMap<crate::work::WorkId, PriorityKey>) {
    units.sort_by(|a, b| {
        let ka = &keys[&a.id];
        let kb = &keys[&b.id];
        kb.score
            .partial_cmp(&ka.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| ka.created_at.cmp(&kb.created_at))
    });
}
