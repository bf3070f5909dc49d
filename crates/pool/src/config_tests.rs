// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use mill_transport::Platform;

fn platform(cpus: usize) -> Platform {
    Platform { cpus, kinds: vec![TransportKind::Thread, TransportKind::Process] }
}

fn registry() -> MethodRegistry {
    let mut registry = MethodRegistry::new();
    registry
        .register("noop", |_p, _c| async { Ok(serde_json::Value::Null) })
        .expect("register noop");
    registry
}

#[test]
fn max_workers_defaults_to_cpus_minus_one() {
    let (resolved, _queue) =
        PoolOptions::new().registry(registry()).resolve(&platform(8)).unwrap();
    assert_eq!(resolved.max_workers, 7);

    let (resolved, _queue) =
        PoolOptions::new().registry(registry()).resolve(&platform(1)).unwrap();
    assert_eq!(resolved.max_workers, 1);
}

#[test]
fn zero_max_workers_is_rejected() {
    let err = PoolOptions::new()
        .registry(registry())
        .max_workers(0)
        .resolve(&platform(4))
        .err()
        .map(|e| e.to_string())
        .unwrap_or_default();
    assert!(err.contains("max_workers"), "unexpected error: {err}");
}

#[test]
fn min_workers_cannot_exceed_max() {
    let result = PoolOptions::new()
        .registry(registry())
        .max_workers(2)
        .min_workers(MinWorkers::Count(3))
        .resolve(&platform(4));
    assert!(matches!(result, Err(PoolError::Validation(_))));
}

#[test]
fn min_workers_max_expands_to_max_workers() {
    let (resolved, _queue) = PoolOptions::new()
        .registry(registry())
        .max_workers(3)
        .min_workers(MinWorkers::Max)
        .resolve(&platform(4))
        .unwrap();
    assert_eq!(resolved.min_workers, 3);
}

#[test]
fn auto_worker_type_prefers_the_registry() {
    let (resolved, _queue) = PoolOptions::new()
        .registry(registry())
        .worker_script("/bin/worker")
        .resolve(&platform(4))
        .unwrap();
    assert_eq!(resolved.kind, TransportKind::Thread);
}

#[test]
fn auto_worker_type_falls_back_to_the_script() {
    let (resolved, _queue) =
        PoolOptions::new().worker_script("/bin/worker").resolve(&platform(4)).unwrap();
    assert_eq!(resolved.kind, TransportKind::Process);
}

#[test]
fn auto_without_a_source_is_rejected() {
    let result = PoolOptions::new().resolve(&platform(4));
    assert!(matches!(result, Err(PoolError::Validation(_))));
}

#[test]
fn thread_type_requires_a_registry() {
    let result = PoolOptions::new()
        .worker_type(WorkerType::Thread)
        .worker_script("/bin/worker")
        .resolve(&platform(4));
    assert!(matches!(result, Err(PoolError::Validation(_))));
}

#[test]
fn process_type_requires_a_script() {
    let result = PoolOptions::new()
        .worker_type(WorkerType::Process)
        .registry(registry())
        .resolve(&platform(4));
    assert!(matches!(result, Err(PoolError::Validation(_))));
}

#[test]
fn unsupported_transport_is_rejected() {
    let thread_only = Platform { cpus: 4, kinds: vec![TransportKind::Thread] };
    let result = PoolOptions::new()
        .worker_type(WorkerType::Process)
        .worker_script("/bin/worker")
        .resolve(&thread_only);
    assert!(matches!(result, Err(PoolError::Validation(_))));
}

#[test]
fn zero_queue_cap_is_rejected() {
    let result =
        PoolOptions::new().registry(registry()).max_queue_size(0).resolve(&platform(4));
    assert!(matches!(result, Err(PoolError::Validation(_))));
}

#[test]
fn timeouts_default_to_one_second() {
    let (resolved, _queue) =
        PoolOptions::new().registry(registry()).resolve(&platform(4)).unwrap();
    assert_eq!(resolved.worker_terminate_timeout, Duration::from_secs(1));
    assert_eq!(resolved.cleanup_timeout, Duration::from_secs(1));
}

#[test]
fn custom_queue_takes_precedence() {
    let mut queue = mill_core::FifoQueue::new();
    queue
        .push(mill_core::Task::new(
            mill_core::RequestId(1),
            "seeded",
            serde_json::Value::Null,
        ))
        .unwrap();
    let (_resolved, queue) = PoolOptions::new()
        .registry(registry())
        .custom_queue(Box::new(queue))
        .queue_strategy(QueueStrategy::Priority)
        .resolve(&platform(4))
        .unwrap();
    assert_eq!(queue.len(), 1);
}

#[test]
fn worker_type_display() {
    assert_eq!(WorkerType::Auto.to_string(), "auto");
    assert_eq!(WorkerType::Thread.to_string(), "thread");
    assert_eq!(WorkerType::Process.to_string(), "process");
}
