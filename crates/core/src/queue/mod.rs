// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pending-task containers: FIFO, LIFO, priority, and the optional
//! shared-memory bridge. All variants honor one contract so the pool can
//! treat scheduling order as a strategy choice.

use crate::error::QueueError;
use crate::id::RequestId;
use crate::task::Task;

mod fifo;
mod lifo;
mod priority;
#[cfg(feature = "shared-queue")]
mod shared;

pub use fifo::FifoQueue;
pub use lifo::LifoQueue;
pub use priority::PriorityQueue;
#[cfg(feature = "shared-queue")]
pub use shared::{OverflowPolicy, SharedQueue};

/// Semantic container of tasks waiting for a worker.
///
/// `push` must not reorder tasks of equal scheduling key relative to
/// insertion; `pop` returns the task with the highest scheduling
/// precedence for the variant.
pub trait TaskQueue: Send {
    fn push(&mut self, task: Task) -> Result<(), QueueError>;
    fn pop(&mut self) -> Option<Task>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn contains(&self, request: RequestId) -> bool;
    /// Evict a specific task, e.g. for cancellation before dispatch.
    fn remove(&mut self, request: RequestId) -> Option<Task>;
    /// Drain everything, returning the evicted tasks so the caller can
    /// settle their handles.
    fn clear(&mut self) -> Vec<Task>;
}

/// Which queue variant a pool uses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueueStrategy {
    #[default]
    Fifo,
    Lifo,
    Priority,
    /// Atomics-backed ring + slot table; see [`SharedQueue`].
    #[cfg(feature = "shared-queue")]
    SharedMemory { capacity: usize, overflow: OverflowPolicy },
}

/// Construct the queue for a strategy.
///
/// The shared-memory variant can fail (capacity or platform constraints);
/// the in-process variants cannot.
pub fn build_queue(strategy: &QueueStrategy) -> Result<Box<dyn TaskQueue>, QueueError> {
    match strategy {
        QueueStrategy::Fifo => Ok(Box::new(FifoQueue::new())),
        QueueStrategy::Lifo => Ok(Box::new(LifoQueue::new())),
        QueueStrategy::Priority => Ok(Box::new(PriorityQueue::new())),
        #[cfg(feature = "shared-queue")]
        QueueStrategy::SharedMemory { capacity, overflow } => {
            Ok(Box::new(SharedQueue::new(*capacity, *overflow)?))
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::id::RequestId;

    /// Bare task with a given id and priority, for queue tests.
    pub(crate) fn task(id: u64, priority: i32) -> Task {
        Task::new(RequestId(id), "noop", serde_json::Value::Null).with_priority(priority)
    }
}

#[cfg(test)]
#[path = "property_tests.rs"]
mod property_tests;
