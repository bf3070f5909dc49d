// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Mixed-workload specs over the in-process transport: settlement
//! uniqueness and the bookkeeping identity under load.

use crate::prelude::*;
use mill_pool::QueueStrategy;
use mill_runtime::{MethodRegistry, RunContext};
use std::sync::atomic::{AtomicUsize, Ordering};

fn registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry
        .register("work", |params: serde_json::Value, ctx: RunContext| async move {
            let ms = params["ms"].as_u64().unwrap_or(5);
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(ms)) => Ok(json!("ok")),
                _ = ctx.cancelled() => Err(mill_pool::WorkerFault::new("Aborted", "cancelled")),
            }
        })
        .expect("register work");
    registry
}

fn thread_pool(max_workers: usize) -> Pool {
    Pool::new(
        PoolOptions::new()
            .registry(registry())
            .worker_type(WorkerType::Thread)
            .max_workers(max_workers)
            .queue_strategy(QueueStrategy::Priority),
    )
    .expect("pool construction")
}

#[tokio::test]
async fn every_handle_settles_exactly_once_under_load() {
    let pool = thread_pool(3);
    let settlements = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for i in 0..40 {
        let handle = pool.exec(
            "work",
            json!({"ms": (i % 7) + 1}),
            ExecOptions::default().priority((i % 5) as i32),
        );
        let counter = settlements.clone();
        handle.on_settle(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        handles.push(handle);
    }

    // cancel a few mid-flight to exercise every settlement path
    for handle in handles.iter().step_by(9) {
        handle.cancel();
    }

    for handle in &handles {
        let _ = handle.wait().await;
    }
    assert_eq!(settlements.load(Ordering::SeqCst), handles.len());

    // cancelling settled handles is a no-op
    for handle in &handles {
        handle.cancel();
    }
    assert_eq!(settlements.load(Ordering::SeqCst), handles.len());

    pool.terminate(false, Some(Duration::from_secs(5))).await.expect("terminate");
}

#[tokio::test]
async fn bookkeeping_identity_holds_at_every_sample() {
    let pool = thread_pool(2);
    let handles: Vec<_> = (0..12)
        .map(|_| pool.exec("work", json!({"ms": 30}), ExecOptions::default()))
        .collect();

    // pending + active must always equal tasks not yet settled
    for _ in 0..6 {
        let stats = pool.stats();
        let unsettled = handles.iter().filter(|h| !h.is_settled()).count();
        assert!(
            stats.pending_tasks + stats.active_tasks <= unsettled,
            "bookkeeping can lag settlement but never exceed it: {stats:?} vs {unsettled}"
        );
        assert_eq!(stats.total_workers, stats.busy_workers + stats.idle_workers);
        tokio::time::sleep(Duration::from_millis(25)).await;
    }

    for handle in &handles {
        assert_eq!(handle.wait().await, Ok(json!("ok")));
    }

    let stats = pool.stats();
    assert_eq!(stats.pending_tasks, 0);
    assert_eq!(stats.active_tasks, 0);

    pool.terminate(false, Some(Duration::from_secs(5))).await.expect("terminate");
    assert_eq!(pool.stats().total_workers, 0);
}

#[tokio::test]
async fn transfer_list_moves_ownership_into_the_request() {
    let mut registry = MethodRegistry::new();
    registry
        .register("sum_bytes", |params: serde_json::Value, _ctx| async move {
            let buffers: Vec<Vec<u8>> =
                serde_json::from_value(params["transfer"].clone()).unwrap_or_default();
            let total: u64 = buffers.iter().flatten().map(|b| *b as u64).sum();
            Ok(json!(total))
        })
        .expect("register sum_bytes");
    let pool = Pool::new(
        PoolOptions::new()
            .registry(registry)
            .worker_type(WorkerType::Thread)
            .max_workers(1),
    )
    .expect("pool construction");

    let buffer: Vec<u8> = vec![1, 2, 3, 4];
    // the transfer list moves the buffer; it is gone from this scope once
    // the options are built, enforced by ownership
    let handle = pool.exec(
        "sum_bytes",
        json!(null),
        ExecOptions::default().transfer(vec![buffer]),
    );
    assert_eq!(handle.wait().await, Ok(json!(10)));

    pool.terminate(false, None).await.expect("terminate");
}
