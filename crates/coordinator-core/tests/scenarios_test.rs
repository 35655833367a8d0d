//! End-to-end scenarios against the public `Coordinator` API: concurrency
//! and rate admission, readiness gating, staleness skipping, cross-task
//! gating, and the stall-timeout failsafe.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::json;

use coordinator_core::{CancelOutcome, Coordinator, CoordinatorConfig, Handler, WorkState};

fn fast_coordinator() -> Coordinator {
    Coordinator::new(CoordinatorConfig { tick_interval: Duration::from_millis(5), ..Default::default() })
}

async fn wait_until(deadline_after: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + deadline_after;
    loop {
        if check() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn max_concurrent_is_never_exceeded() {
    let c = fast_coordinator();
    c.register_service("svc", Some(2), None).unwrap();

    let current = Arc::new(AtomicUsize::new(0));
    let observed_max = Arc::new(AtomicUsize::new(0));
    let (cur, max) = (current.clone(), observed_max.clone());
    c.register_task(
        "t",
        "svc",
        None,
        Handler::sync(move |_| {
            let now = cur.fetch_add(1, Ordering::SeqCst) + 1;
            max.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(40));
            cur.fetch_sub(1, Ordering::SeqCst);
            Ok(json!(null))
        }),
    )
    .unwrap();
    c.start().await;

    let ids: Vec<_> = (0..6).map(|_| c.submit("t", json!({})).unwrap()).collect();

    wait_until(Duration::from_secs(3), || {
        ids.iter().all(|id| c.get(id).unwrap().state.is_terminal())
    })
    .await;

    assert!(observed_max.load(Ordering::SeqCst) <= 2, "concurrency ceiling was exceeded");
    for id in &ids {
        assert_eq!(c.get(id).unwrap().state, WorkState::Completed);
    }

    c.stop(None).await;
}

#[tokio::test]
async fn rate_limit_spreads_dispatch_over_the_window() {
    let c = fast_coordinator();
    c.register_service("svc", None, Some("2/sec")).unwrap();
    c.register_task("t", "svc", None, Handler::sync(|_| Ok(json!(null)))).unwrap();
    c.start().await;

    let ids: Vec<_> = (0..3).map(|_| c.submit("t", json!({})).unwrap()).collect();

    wait_until(Duration::from_secs(3), || {
        ids.iter().all(|id| c.get(id).unwrap().state.is_terminal())
    })
    .await;

    let completions: Vec<_> = ids.iter().map(|id| c.get(id).unwrap().completed_at.unwrap()).collect();
    let earliest = *completions.iter().min().unwrap();
    let latest = *completions.iter().max().unwrap();
    assert!(
        (latest - earliest).num_milliseconds() >= 700,
        "third dispatch should have waited out the rate window, got spread {:?}",
        latest - earliest
    );

    c.stop(None).await;
}

#[tokio::test]
async fn not_ready_unit_dispatches_once_it_becomes_ready() {
    let c = fast_coordinator();
    c.register_service("svc", None, None).unwrap();
    c.register_task("t", "svc", None, Handler::sync(|_| Ok(json!(null)))).unwrap();

    let ready = Arc::new(AtomicBool::new(false));
    let flag = ready.clone();
    c.set_is_ready(Arc::new(move |_| Ok(flag.load(Ordering::SeqCst)))).unwrap();

    let id = c.submit("t", json!({})).unwrap();
    c.start().await;

    tokio::time::sleep(Duration::from_millis(60)).await;
    assert_eq!(c.get(&id).unwrap().state, WorkState::Pending, "should stay pending while not ready");

    ready.store(true, Ordering::SeqCst);

    let finished = wait_until(Duration::from_secs(2), || c.get(&id).unwrap().state.is_terminal()).await;
    assert!(finished, "unit never dispatched after becoming ready");
    assert_eq!(c.get(&id).unwrap().state, WorkState::Completed);

    c.stop(None).await;
}

#[tokio::test]
async fn stale_unit_is_skipped_without_running_the_handler() {
    let c = fast_coordinator();
    c.register_service("svc", None, None).unwrap();
    let ran = Arc::new(AtomicBool::new(false));
    let flag = ran.clone();
    c.register_task(
        "t",
        "svc",
        None,
        Handler::sync(move |_| {
            flag.store(true, Ordering::SeqCst);
            Ok(json!(null))
        }),
    )
    .unwrap();
    c.set_is_stale(Arc::new(|_| Ok(false))).unwrap();

    let skipped = Arc::new(Mutex::new(Vec::new()));
    let sink = skipped.clone();
    c.set_on_skip(Arc::new(move |w| sink.lock().unwrap().push(w.id.clone()))).unwrap();

    let id = c.submit("t", json!({})).unwrap();
    c.start().await;

    let finished = wait_until(Duration::from_secs(2), || c.get(&id).unwrap().state.is_terminal()).await;
    assert!(finished);
    assert_eq!(c.get(&id).unwrap().state, WorkState::Completed);
    assert!(!ran.load(Ordering::SeqCst), "handler must not run for a skipped unit");
    assert_eq!(skipped.lock().unwrap().as_slice(), &[id]);

    c.stop(None).await;
}

#[tokio::test]
async fn downstream_task_is_gated_on_upstream_completion() {
    let c = fast_coordinator();
    c.register_service("svc", None, None).unwrap();
    c.register_task("a", "svc", None, Handler::sync(|_| Ok(json!(null)))).unwrap();
    c.register_task("b", "svc", None, Handler::sync(|_| Ok(json!(null)))).unwrap();

    let a_done = Arc::new(AtomicBool::new(false));
    let done_writer = a_done.clone();
    c.set_on_complete(Arc::new(move |w, _result, _duration| {
        if w.task == "a" {
            done_writer.store(true, Ordering::SeqCst);
        }
    }))
    .unwrap();

    let gate = a_done.clone();
    c.set_is_ready(Arc::new(move |w| Ok(w.task != "b" || gate.load(Ordering::SeqCst)))).unwrap();

    let id_b = c.submit("b", json!({})).unwrap();
    let id_a = c.submit("a", json!({})).unwrap();
    c.start().await;

    let finished = wait_until(Duration::from_secs(2), || {
        c.get(&id_a).unwrap().state.is_terminal() && c.get(&id_b).unwrap().state.is_terminal()
    })
    .await;
    assert!(finished);

    let a_completed_at = c.get(&id_a).unwrap().completed_at.unwrap();
    let b_started_at = c.get(&id_b).unwrap().started_at.unwrap();
    assert!(a_completed_at <= b_started_at, "b must not start before a completes");

    c.stop(None).await;
}

#[tokio::test]
async fn stall_timeout_fails_pending_work_that_never_becomes_admissible() {
    let c = Coordinator::new(CoordinatorConfig {
        tick_interval: Duration::from_millis(5),
        stall_timeout: Some(Duration::from_millis(80)),
        ..Default::default()
    });
    c.register_service("svc", None, None).unwrap();
    c.register_task("t", "svc", None, Handler::sync(|_| Ok(json!(null)))).unwrap();
    c.set_is_ready(Arc::new(|_| Ok(false))).unwrap();

    let id = c.submit("t", json!({})).unwrap();
    c.start().await;

    let finished = wait_until(Duration::from_secs(2), || c.get(&id).unwrap().state.is_terminal()).await;
    assert!(finished, "stalled unit should eventually be failed");
    let unit = c.get(&id).unwrap();
    assert_eq!(unit.state, WorkState::Failed);
    assert_eq!(unit.error.as_deref(), Some("stall timeout exceeded"));

    c.stop(None).await;
}

#[tokio::test]
async fn cancel_during_run_is_observed_on_completion() {
    let c = fast_coordinator();
    c.register_service("svc", None, None).unwrap();
    c.register_task(
        "t",
        "svc",
        None,
        Handler::sync(|_| {
            std::thread::sleep(Duration::from_millis(100));
            Ok(json!(null))
        }),
    )
    .unwrap();
    c.start().await;

    let id = c.submit("t", json!({})).unwrap();
    let started = wait_until(Duration::from_secs(1), || c.get(&id).unwrap().state == WorkState::Running).await;
    assert!(started);

    let outcome = c.cancel(&id).unwrap();
    assert_eq!(outcome, CancelOutcome::CancelRequested);

    let finished = wait_until(Duration::from_secs(2), || c.get(&id).unwrap().state.is_terminal()).await;
    assert!(finished);
    assert_eq!(c.get(&id).unwrap().state, WorkState::Cancelled);

    c.stop(None).await;
}
