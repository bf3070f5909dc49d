// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};

#[test]
fn settles_exactly_once() {
    let handle = TaskHandle::detached();
    assert!(handle.resolve(json!(7)));
    assert!(!handle.reject(TaskError::Cancelled));
    assert_eq!(handle.state(), SettleState::Resolved);
    assert_eq!(handle.try_result(), Some(Ok(json!(7))));
}

#[tokio::test]
async fn wait_returns_the_settlement() {
    let handle = TaskHandle::detached();
    let waiter = handle.clone();
    let join = tokio::spawn(async move { waiter.wait().await });
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    handle.resolve(json!("done"));
    assert_eq!(join.await.unwrap(), Ok(json!("done")));
}

#[tokio::test]
async fn wait_after_settlement_is_immediate() {
    let handle = TaskHandle::detached();
    handle.reject(TaskError::QueueFull);
    assert_eq!(handle.wait().await, Err(TaskError::QueueFull));
}

#[test]
fn on_settle_runs_once_for_late_and_early_registrations() {
    let fired = Arc::new(AtomicUsize::new(0));

    let handle = TaskHandle::detached();
    let n = fired.clone();
    handle.on_settle(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
    });
    handle.resolve(json!(null));
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // registration after settlement fires immediately
    let n = fired.clone();
    handle.on_settle(move |_| {
        n.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[test]
fn then_chains_ok_and_err_paths() {
    let handle = TaskHandle::detached();
    let doubled = handle.then(
        |v| Ok(json!(v.as_i64().unwrap_or(0) * 2)),
        Err,
    );
    handle.resolve(json!(21));
    assert_eq!(doubled.try_result(), Some(Ok(json!(42))));

    let handle = TaskHandle::detached();
    let recovered = handle.then(Ok, |_| Ok(json!("fallback")));
    handle.reject(TaskError::Cancelled);
    assert_eq!(recovered.try_result(), Some(Ok(json!("fallback"))));
}

#[test]
fn cancel_on_unbound_handle_rejects_with_cancelled() {
    let handle = TaskHandle::detached();
    handle.cancel();
    assert_eq!(handle.try_result(), Some(Err(TaskError::Cancelled)));
    // idempotent
    handle.cancel();
    assert_eq!(handle.state(), SettleState::Rejected);
}

struct RecordingScope {
    seen: Mutex<Vec<(RequestId, CancelCause)>>,
}

impl CancelScope for RecordingScope {
    fn cancel(&self, request: RequestId, cause: CancelCause) {
        self.seen.lock().push((request, cause));
    }
}

#[test]
fn cancel_routes_through_the_bound_scope() {
    let scope = Arc::new(RecordingScope { seen: Mutex::new(Vec::new()) });
    let handle = TaskHandle::detached();
    let weak: Weak<dyn CancelScope> = Arc::downgrade(&scope) as Weak<dyn CancelScope>;
    handle.bind(weak, RequestId(9));

    handle.cancel();
    assert_eq!(scope.seen.lock().as_slice(), &[(RequestId(9), CancelCause::Cancelled)]);
    // the scope is responsible for settling; the handle stays pending
    assert_eq!(handle.state(), SettleState::Pending);
}

#[test]
fn cancel_with_dropped_scope_settles_directly() {
    let handle = TaskHandle::detached();
    {
        let scope = Arc::new(RecordingScope { seen: Mutex::new(Vec::new()) });
        handle.bind(Arc::downgrade(&scope) as Weak<dyn CancelScope>, RequestId(1));
    }
    handle.cancel();
    assert_eq!(handle.try_result(), Some(Err(TaskError::Cancelled)));
}

#[tokio::test]
async fn timeout_fires_and_rejects_unbound_handle() {
    let handle = TaskHandle::detached();
    handle.timeout(std::time::Duration::from_millis(20));
    tokio::time::sleep(std::time::Duration::from_millis(80)).await;
    assert_eq!(handle.try_result(), Some(Err(TaskError::TimedOut)));
}

#[tokio::test]
async fn settlement_disarms_the_timer() {
    let handle = TaskHandle::detached();
    handle.timeout(std::time::Duration::from_millis(30));
    handle.resolve(json!(1));
    tokio::time::sleep(std::time::Duration::from_millis(60)).await;
    assert_eq!(handle.try_result(), Some(Ok(json!(1))));
}

#[tokio::test]
async fn mark_dispatched_restarts_the_budget() {
    let handle = TaskHandle::detached();
    handle.timeout(std::time::Duration::from_millis(50));
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    // dispatch near the end of the queued budget; the timer starts over
    handle.mark_dispatched();
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert_eq!(handle.state(), SettleState::Pending);
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    assert_eq!(handle.try_result(), Some(Err(TaskError::TimedOut)));
}

#[tokio::test]
async fn timeout_routes_through_scope_when_bound() {
    let scope = Arc::new(RecordingScope { seen: Mutex::new(Vec::new()) });
    let handle = TaskHandle::detached();
    handle.bind(Arc::downgrade(&scope) as Weak<dyn CancelScope>, RequestId(3));
    handle.timeout(std::time::Duration::from_millis(10));
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    assert_eq!(scope.seen.lock().as_slice(), &[(RequestId(3), CancelCause::TimedOut)]);
}
