//! Work store: in-memory id -> [`WorkUnit`] map plus the three disjoint
//! membership bags (pending / active / terminal).
//!
//! Every mutation here also keeps the bags consistent with
//! `WorkUnit::state`. The store has no concept of services or tasks; it
//! only knows about records and their lifecycle.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::work::{WorkId, WorkState, WorkUnit};

/// Filter for [`WorkStore::list`].
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub state: Option<WorkState>,
    pub task: Option<String>,
}

/// Aggregate counts used by the CLI's status display and by tests that
/// want to assert invariants without walking every unit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    pub pending: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// The result of a `cancel()` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The unit was pending and is now cancelled.
    CancelledImmediately,
    /// The unit was running; cancellation intent recorded, checked when
    /// the handler completes.
    CancelRequested,
    /// The unit was already terminal; no-op.
    AlreadyTerminal(WorkState),
}

#[derive(Default)]
pub struct WorkStore {
    units: HashMap<WorkId, WorkUnit>,
    pending: HashSet<WorkId>,
    active: HashSet<WorkId>,
    terminal: HashSet<WorkId>,
}

impl WorkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly submitted unit. Must be `PENDING`.
    pub fn insert(&mut self, unit: WorkUnit) -> WorkId {
        debug_assert_eq!(unit.state, WorkState::Pending);
        let id = unit.id.clone();
        self.pending.insert(id.clone());
        self.units.insert(id.clone(), unit);
        id
    }

    pub fn get(&self, id: &WorkId) -> Option<WorkUnit> {
        self.units.get(id).cloned()
    }

    pub fn contains(&self, id: &WorkId) -> bool {
        self.units.contains_key(id)
    }

    pub fn list(&self, filter: &ListFilter) -> Vec<WorkUnit> {
        self.units
            .values()
            .filter(|u| filter.state.is_none_or(|s| u.state == s))
            .filter(|u| filter.task.as_deref().is_none_or(|t| u.task == t))
            .cloned()
            .collect()
    }

    /// Snapshot every unit currently in the pending bag.
    pub fn pending_snapshot(&self) -> Vec<WorkUnit> {
        self.pending.iter().filter_map(|id| self.units.get(id)).cloned().collect()
    }

    pub fn progress(&self) -> Progress {
        let mut p = Progress::default();
        for unit in self.units.values() {
            match unit.state {
                WorkState::Pending => p.pending += 1,
                WorkState::Running => p.running += 1,
                WorkState::Completed => p.completed += 1,
                WorkState::Failed => p.failed += 1,
                WorkState::Cancelled => p.cancelled += 1,
            }
        }
        p
    }

    /// PENDING -> RUNNING. Sets `started_at`, increments `attempt`.
    pub fn move_to_running(&mut self, id: &WorkId, now: DateTime<Utc>) {
        self.pending.remove(id);
        self.active.insert(id.clone());
        if let Some(unit) = self.units.get_mut(id) {
            unit.state = WorkState::Running;
            unit.started_at = Some(now);
            unit.attempt += 1;
        }
    }

    /// RUNNING -> {COMPLETED, FAILED, CANCELLED}, or PENDING -> COMPLETED
    /// for the stale-skip path.
    pub fn move_to_terminal(
        &mut self,
        id: &WorkId,
        new_state: WorkState,
        result: Option<Value>,
        error: Option<String>,
        now: DateTime<Utc>,
    ) {
        debug_assert!(new_state.is_terminal());
        self.pending.remove(id);
        self.active.remove(id);
        self.terminal.insert(id.clone());
        if let Some(unit) = self.units.get_mut(id) {
            unit.state = new_state;
            unit.completed_at = Some(now);
            unit.result = result;
            unit.error = error;
        }
    }

    /// RUNNING -> PENDING for a retryable failure. Clears `started_at`
    /// and records the earliest time the scheduler may re-dispatch it.
    pub fn retry_to_pending(&mut self, id: &WorkId, not_before: Option<DateTime<Utc>>) {
        self.active.remove(id);
        self.pending.insert(id.clone());
        if let Some(unit) = self.units.get_mut(id) {
            unit.state = WorkState::Pending;
            unit.started_at = None;
            unit.not_before = not_before;
        }
    }

    /// Mark a pending-timeout warning as fired so it does not repeat.
    pub fn mark_pending_warned(&mut self, id: &WorkId) {
        if let Some(unit) = self.units.get_mut(id) {
            unit.pending_warned = true;
        }
    }

    /// `cancel`: immediate for pending, intent-recorded for running,
    /// no-op for terminal.
    pub fn cancel(&mut self, id: &WorkId, now: DateTime<Utc>) -> Option<CancelOutcome> {
        let state = self.units.get(id)?.state;
        match state {
            WorkState::Pending => {
                self.move_to_terminal(id, WorkState::Cancelled, None, None, now);
                Some(CancelOutcome::CancelledImmediately)
            }
            WorkState::Running => {
                if let Some(unit) = self.units.get_mut(id) {
                    unit.cancel_requested = true;
                }
                Some(CancelOutcome::CancelRequested)
            }
            terminal => Some(CancelOutcome::AlreadyTerminal(terminal)),
        }
    }

    pub fn is_cancel_requested(&self, id: &WorkId) -> bool {
        self.units.get(id).map(|u| u.cancel_requested).unwrap_or(false)
    }
}
