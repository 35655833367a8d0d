//! The public entry point: [`Coordinator`].
//!
//! `Coordinator` is a thin, cloneable handle around an `Arc<Inner>`. All of
//! its methods either take a quick lock on the shared state for bookkeeping
//! or hand a message to the scheduler loop; none of them run client code
//! directly, so none of them can block on a slow callback or handler.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::admission::{evaluate, Outcome};
use crate::callbacks::{
    OnCompleteFn, OnFailureFn, OnSkipFn, OnStallWarningFn, OnStartFn, PriorityFn, ReadyFn, StaleFn,
};
use crate::config::CoordinatorConfig;
use crate::error::{CoordinatorError, Result};
use crate::handler::Handler;
use crate::scheduler;
use crate::service::{parse_rate, RateLimit};
use crate::shared::{CoordinatorState, SharedState};
use crate::store::{ListFilter, Progress};
use crate::work::{WorkId, WorkUnit};

pub(crate) struct Inner {
    pub(crate) state: SharedState,
    pub(crate) notify: Notify,
    pub(crate) shutdown: CancellationToken,
    pub(crate) config: CoordinatorConfig,
    loop_handle: AsyncMutex<Option<JoinHandle<()>>>,
}

/// A blocked pending unit surfaced by [`Coordinator::debug_blocked`], with
/// the reason it has not been dispatched yet.
#[derive(Debug, Clone)]
pub struct BlockedUnit {
    pub id: WorkId,
    pub task: String,
    pub reason: String,
}

/// The in-process work coordinator.
///
/// Cheap to clone: every clone shares the same scheduler loop and state.
/// Register services and tasks, optionally wire up the predicate and event
/// callbacks, call [`Coordinator::start`], then [`Coordinator::submit`]
/// work.
#[derive(Clone)]
pub struct Coordinator {
    inner: Arc<Inner>,
}

impl Coordinator {
    pub fn new(config: CoordinatorConfig) -> Self {
        let inner = Arc::new(Inner {
            state: StdMutex::new(CoordinatorState::new(Utc::now())),
            notify: Notify::new(),
            shutdown: CancellationToken::new(),
            config,
            loop_handle: AsyncMutex::new(None),
        });
        Self { inner }
    }

    /// Register a named service with an optional concurrency ceiling and
    /// an optional rate limit string (e.g. `"60/min"`).
    /// Re-registering the same name with the same limits is a no-op;
    /// different limits are a `ConfigError`.
    pub fn register_service(&self, name: &str, concurrent: Option<u32>, rate: Option<&str>) -> Result<()> {
        let rate: Option<RateLimit> = rate.map(parse_rate).transpose()?;
        self.inner.state.lock().unwrap().services.register(name, concurrent, rate)
    }

    /// Register a task type bound to a previously registered service.
    pub fn register_task(
        &self,
        name: &str,
        service: &str,
        max_attempts: Option<u32>,
        handler: Handler,
    ) -> Result<()> {
        let mut state = self.inner.state.lock().unwrap();
        state.tasks.register(&state.services, name, service, max_attempts, handler)
    }

    pub fn set_is_ready(&self, f: ReadyFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_is_ready(f)
    }

    pub fn set_is_stale(&self, f: StaleFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_is_stale(f)
    }

    pub fn set_priority(&self, f: PriorityFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_priority(f)
    }

    pub fn set_on_start(&self, f: OnStartFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_on_start(f)
    }

    pub fn set_on_complete(&self, f: OnCompleteFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_on_complete(f)
    }

    pub fn set_on_failure(&self, f: OnFailureFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_on_failure(f)
    }

    pub fn set_on_skip(&self, f: OnSkipFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_on_skip(f)
    }

    pub fn set_on_stall_warning(&self, f: OnStallWarningFn) -> Result<()> {
        self.inner.state.lock().unwrap().callbacks.set_on_stall_warning(f)
    }

    /// Submit a unit of work. `CoordinatorError::UnknownTask` if `task` was
    /// never registered; `CoordinatorError::Shutdown` after `stop()` has
    /// begun.
    pub fn submit(&self, task: &str, params: Value) -> Result<WorkId> {
        let mut state = self.inner.state.lock().unwrap();
        if state.stopping {
            return Err(CoordinatorError::Shutdown);
        }
        if !state.tasks.contains(task) {
            return Err(CoordinatorError::UnknownTask(task.to_string()));
        }
        let unit = WorkUnit::new(task.to_string(), params, Utc::now());
        let id = state.store.insert(unit);
        drop(state);
        self.inner.notify.notify_one();
        Ok(id)
    }

    /// Cancel a unit: immediate if pending, intent-recorded if running,
    /// no-op if already terminal.
    pub fn cancel(&self, id: &WorkId) -> Result<crate::store::CancelOutcome> {
        let mut state = self.inner.state.lock().unwrap();
        let outcome = state
            .store
            .cancel(id, Utc::now())
            .ok_or_else(|| CoordinatorError::UnknownWorkId(id.clone()))?;
        drop(state);
        self.inner.notify.notify_one();
        Ok(outcome)
    }

    pub fn get(&self, id: &WorkId) -> Result<WorkUnit> {
        self.inner
            .state
            .lock()
            .unwrap()
            .store
            .get(id)
            .ok_or_else(|| CoordinatorError::UnknownWorkId(id.clone()))
    }

    pub fn list(&self, filter: ListFilter) -> Vec<WorkUnit> {
        self.inner.state.lock().unwrap().store.list(&filter)
    }

    pub fn progress(&self) -> Progress {
        self.inner.state.lock().unwrap().store.progress()
    }

    /// Inspect every currently pending unit without dispatching anything,
    /// reporting why each one has not run yet. Intended for operators
    /// debugging a coordinator that looks stuck.
    pub fn debug_blocked(&self) -> Vec<BlockedUnit> {
        let mut state = self.inner.state.lock().unwrap();
        let now = Utc::now();
        let pending = state.store.pending_snapshot();
        let mut blocked = Vec::new();
        for unit in pending {
            let outcome = evaluate(&unit, &state.tasks, &mut state.services, &state.callbacks, now);
            let reason = match outcome {
                Outcome::UnknownTask => "task is not registered",
                Outcome::BlockedNotReady => "not ready, or waiting out a retry backoff",
                Outcome::BlockedService => "bound service is at capacity",
                Outcome::Skip | Outcome::Dispatch => continue,
            };
            blocked.push(BlockedUnit { id: unit.id, task: unit.task, reason: reason.to_string() });
        }
        blocked
    }

    /// Start the scheduler loop. Idempotent: a second call while the loop
    /// is already running is a no-op.
    pub async fn start(&self) {
        let mut handle = self.inner.loop_handle.lock().await;
        if handle.is_some() {
            return;
        }
        // Reset the stall clock here, not just at construction: time spent
        // registering services/tasks between `new()` and `start()` must not
        // count against the stall timeout.
        self.inner.state.lock().unwrap().last_progress = Utc::now();
        *handle = Some(tokio::spawn(scheduler::run(self.inner.clone())));
    }

    /// Stop accepting new dispatches, wait for active handlers to finish
    /// (up to `timeout`, or `config.default_stop_timeout` if `None`), then
    /// shut the scheduler loop down. Pending units are left `PENDING`, not
    /// auto-cancelled. `submit` returns `Shutdown` once this has started.
    pub async fn stop(&self, timeout: Option<Duration>) {
        {
            let mut state = self.inner.state.lock().unwrap();
            state.stopping = true;
        }
        self.inner.notify.notify_waiters();

        let deadline = tokio::time::Instant::now() + timeout.unwrap_or(self.inner.config.default_stop_timeout);
        loop {
            let running = self.inner.state.lock().unwrap().store.progress().running;
            if running == 0 {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                tracing::warn!(running, "stop timeout elapsed with handlers still active");
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        self.inner.shutdown.cancel();
        if let Some(handle) = self.inner.loop_handle.lock().await.take() {
            let _ = handle.await;
        }
    }
}
