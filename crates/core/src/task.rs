// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One user-submitted unit of work.

use crate::handle::TaskHandle;
use crate::id::RequestId;
use std::sync::Arc;

/// Binary region whose ownership moves with the task request instead of
/// being copied. Once handed to a transport the sender no longer holds it;
/// the move is enforced by ownership.
pub type TransferBuf = Vec<u8>;

/// Progress-event callback attached to a task at submission.
pub type EventCallback = Arc<dyn Fn(serde_json::Value) + Send + Sync>;

/// A pending or executing unit of work, bound to its [`TaskHandle`].
///
/// A task lives in exactly one place at a time: the pool's queue, a
/// handler's `processing` map, or a handler's `tracking` map. The fields
/// are immutable once queued, except that `params` and `transfer` are taken
/// out when the request frame is built (the ownership handoff of the
/// transfer list).
pub struct Task {
    pub request: RequestId,
    pub method: String,
    pub params: serde_json::Value,
    pub transfer: Vec<TransferBuf>,
    /// Scheduling priority; higher dispatches earlier. Default 0.
    pub priority: i32,
    pub handle: TaskHandle,
    pub on_event: Option<EventCallback>,
    /// Epoch millis at submission, for queue-age introspection.
    pub enqueued_at_ms: u64,
}

impl Task {
    pub fn new(request: RequestId, method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            request,
            method: method.into(),
            params,
            transfer: Vec::new(),
            priority: 0,
            handle: TaskHandle::detached(),
            on_event: None,
            enqueued_at_ms: 0,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Deliver a progress event to this task's sink, if one is attached.
    pub fn deliver_event(&self, payload: serde_json::Value) {
        if let Some(sink) = &self.on_event {
            sink(payload);
        }
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("request", &self.request)
            .field("method", &self.method)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
