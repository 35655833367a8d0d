//! The coordinator's single piece of mutable state, and the lock that
//! serializes every mutation to it.
//!
//! Service counters, work-store membership, and the callback registry are
//! owned by the coordinator and mutated only by the scheduler loop (or by
//! submit/cancel). We realize that with one `std::sync::Mutex` guarding
//! all of it: every critical section here is synchronous bookkeeping with
//! no `.await` inside, so the lock is held for microseconds and never
//! across a suspension point — functionally equivalent to routing every
//! mutation through a single control thread.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::callbacks::CallbackRegistry;
use crate::service::ServiceTable;
use crate::store::WorkStore;
use crate::task::TaskRegistry;

pub(crate) struct CoordinatorState {
    pub services: ServiceTable,
    pub tasks: TaskRegistry,
    pub callbacks: CallbackRegistry,
    pub store: WorkStore,
    /// Wall time of the last terminal transition (completion, failure,
    /// skip, or cancellation) across the whole coordinator. Drives the
    /// stall-timeout policy.
    pub last_progress: DateTime<Utc>,
    /// Whether the stall-warning has already fired for the current
    /// uninterrupted stretch of no progress.
    pub stall_warned: bool,
    /// Set once `stop()` begins; `submit` rejects with `SHUTDOWN` after
    /// this flips.
    pub stopping: bool,
}

impl CoordinatorState {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            services: ServiceTable::new(),
            tasks: TaskRegistry::new(),
            callbacks: CallbackRegistry::default(),
            store: WorkStore::new(),
            last_progress: now,
            stall_warned: false,
            stopping: false,
        }
    }
}

pub(crate) type SharedState = Mutex<CoordinatorState>;
