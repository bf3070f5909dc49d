// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Priority queue: highest `priority` first, insertion order among equals.

use super::TaskQueue;
use crate::error::QueueError;
use crate::id::RequestId;
use crate::task::Task;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

struct Entry {
    priority: i32,
    seq: u64,
    task: Task,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Max-heap: higher priority wins; earlier insertion breaks ties.
        self.priority.cmp(&other.priority).then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Binary heap keyed by task priority (descending), stable for equal
/// priorities.
#[derive(Default)]
pub struct PriorityQueue {
    heap: BinaryHeap<Entry>,
    next_seq: u64,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskQueue for PriorityQueue {
    fn push(&mut self, task: Task) -> Result<(), QueueError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(Entry { priority: task.priority, seq, task });
        Ok(())
    }

    fn pop(&mut self) -> Option<Task> {
        self.heap.pop().map(|e| e.task)
    }

    fn len(&self) -> usize {
        self.heap.len()
    }

    fn contains(&self, request: RequestId) -> bool {
        self.heap.iter().any(|e| e.task.request == request)
    }

    fn remove(&mut self, request: RequestId) -> Option<Task> {
        if !self.contains(request) {
            return None;
        }
        let mut removed = None;
        let entries = std::mem::take(&mut self.heap);
        for entry in entries.into_iter() {
            if entry.task.request == request {
                removed = Some(entry.task);
            } else {
                self.heap.push(entry);
            }
        }
        removed
    }

    fn clear(&mut self) -> Vec<Task> {
        // Drain in scheduling order so callers settle handles predictably.
        let mut out = Vec::with_capacity(self.heap.len());
        while let Some(entry) = self.heap.pop() {
            out.push(entry.task);
        }
        out
    }
}

#[cfg(test)]
#[path = "priority_tests.rs"]
mod tests;
