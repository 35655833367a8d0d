//! Dispatcher / handler runner.
//!
//! One handler invocation per [`run_dispatch`] call: invoke the handler,
//! measure elapsed time, and report the outcome back to the scheduler
//! loop over a channel so every state transition and event firing for
//! the completion happens serialized inside the loop's own task.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::handler::Handler;
use crate::work::{WorkId, WorkUnit};

/// Message sent from a spawned dispatch task back to the scheduler loop.
pub(crate) struct DispatchDone {
    pub id: WorkId,
    pub duration: Duration,
    pub outcome: Result<Value, String>,
}

/// Run one handler invocation to completion and report the result.
///
/// Spawned by the scheduler loop immediately after it reserves a service
/// slot and moves the unit to `RUNNING`. Never panics the caller: a
/// handler panic inside `spawn_blocking` is converted to an error by
/// [`Handler::invoke`].
pub(crate) async fn run_dispatch(tx: mpsc::Sender<DispatchDone>, handler: Handler, work: WorkUnit) {
    let id = work.id.clone();
    let start = std::time::Instant::now();
    let outcome = handler.invoke(work).await.map_err(|e| format!("{e:#}"));
    let duration = start.elapsed();
    let _ = tx.send(DispatchDone { id, duration, outcome }).await;
}

/// Escalating retry delay: `min(2^(attempt-1), 30)` seconds. `attempt` is
/// the 1-based count of the attempt that just failed.
pub(crate) fn retry_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(5); // 2^5 = 32 already clamps past 30
    let secs = 2u64.saturating_pow(exp).min(30);
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_delay_escalates_and_caps() {
        assert_eq!(retry_delay(1), Duration::from_secs(1));
        assert_eq!(retry_delay(2), Duration::from_secs(2));
        assert_eq!(retry_delay(3), Duration::from_secs(4));
        assert_eq!(retry_delay(6), Duration::from_secs(30));
        assert_eq!(retry_delay(100), Duration::from_secs(30));
    }
}
