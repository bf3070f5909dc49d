// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::super::test_support::task;
use super::super::TaskQueue;
use super::*;

#[test]
fn pops_in_insertion_order() {
    let mut q = FifoQueue::new();
    for id in 0..4 {
        q.push(task(id, 0)).unwrap();
    }
    let order: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|t| t.request.as_u64()).collect();
    assert_eq!(order, vec![0, 1, 2, 3]);
    assert!(q.is_empty());
}

#[test]
fn contains_agrees_with_membership() {
    let mut q = FifoQueue::new();
    q.push(task(1, 0)).unwrap();
    q.push(task(2, 0)).unwrap();
    assert!(q.contains(RequestId(1)));
    assert!(!q.contains(RequestId(9)));

    q.pop();
    assert!(!q.contains(RequestId(1)));
    assert!(q.contains(RequestId(2)));
}

#[test]
fn remove_evicts_the_middle() {
    let mut q = FifoQueue::new();
    for id in 0..3 {
        q.push(task(id, 0)).unwrap();
    }
    let removed = q.remove(RequestId(1)).unwrap();
    assert_eq!(removed.request, RequestId(1));
    assert_eq!(q.len(), 2);
    assert!(q.remove(RequestId(1)).is_none());

    let order: Vec<u64> = std::iter::from_fn(|| q.pop()).map(|t| t.request.as_u64()).collect();
    assert_eq!(order, vec![0, 2]);
}

#[test]
fn clear_returns_everything() {
    let mut q = FifoQueue::new();
    q.push(task(5, 0)).unwrap();
    q.push(task(6, 0)).unwrap();
    let drained = q.clear();
    assert_eq!(drained.len(), 2);
    assert!(q.is_empty());
}
