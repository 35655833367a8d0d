//! Task handlers: the user code a dispatched work unit actually runs.
//!
//! Handlers come in two explicit kinds so callers never have to pick a
//! trait up front: a plain blocking closure, or an object-safe async-trait
//! adapter for suspendable work.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::work::WorkUnit;

/// Object-safe trait for a suspendable (async) handler. Implementors wrap
/// whatever `await`s a dispatched unit to its result; the scheduler
/// `await`s this to completion inside its own spawned task, so a handler
/// that itself suspends cooperatively never blocks the scheduler loop.
#[async_trait]
pub trait AsyncHandler: Send + Sync {
    async fn call(&self, work: &WorkUnit) -> anyhow::Result<Value>;
}

#[async_trait]
impl<F, Fut> AsyncHandler for F
where
    F: Fn(WorkUnit) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<Value>> + Send,
{
    async fn call(&self, work: &WorkUnit) -> anyhow::Result<Value> {
        (self)(work.clone()).await
    }
}

/// A plain blocking function. Run via `tokio::task::spawn_blocking` so it
/// never occupies the cooperative scheduler's own runtime thread.
pub type SyncHandlerFn = Arc<dyn Fn(WorkUnit) -> anyhow::Result<Value> + Send + Sync>;

/// A task's handler, in one of two kinds.
#[derive(Clone)]
pub enum Handler {
    /// Blocking handler, dispatched on a worker-pool thread.
    Sync(SyncHandlerFn),
    /// Suspendable handler, `await`ed on the scheduler's event loop.
    Async(Arc<dyn AsyncHandler>),
}

impl Handler {
    pub fn sync<F>(f: F) -> Self
    where
        F: Fn(WorkUnit) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        Handler::Sync(Arc::new(f))
    }

    pub fn asynchronous<H>(h: H) -> Self
    where
        H: AsyncHandler + 'static,
    {
        Handler::Async(Arc::new(h))
    }

    /// Invoke the handler, routing sync handlers to a blocking thread and
    /// async handlers straight onto the current runtime.
    pub(crate) async fn invoke(&self, work: WorkUnit) -> anyhow::Result<Value> {
        match self {
            Handler::Sync(f) => {
                let f = Arc::clone(f);
                tokio::task::spawn_blocking(move || f(work))
                    .await
                    .map_err(|e| anyhow::anyhow!("handler panicked: {e}"))?
            }
            Handler::Async(h) => h.call(&work).await,
        }
    }
}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Handler::Sync(_) => f.write_str("Handler::Sync(..)"),
            Handler::Async(_) => f.write_str("Handler::Async(..)"),
        }
    }
}
