// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Message shapes for both protocol directions.
//!
//! The protocol is request/response on `id`, with progress events
//! multiplexed on the same `id`. Cleanup shares the request shape through a
//! reserved method name so registries can refuse to shadow it; `Terminate`
//! carries no correlation id at all and can never collide with a task.

use mill_core::{RequestId, TransferBuf, WorkerFault};
use serde::{Deserialize, Serialize};

/// Reserved method name for the cleanup request/response pair.
pub const CLEANUP_METHOD: &str = "__cleanup__";

/// Reserved method name answering with the worker's registered method list.
pub const METHODS_METHOD: &str = "__methods__";

/// Frames sent from the pool to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PoolToWorker {
    /// Execute a method. `transfer` regions moved ownership to this frame.
    Run {
        id: RequestId,
        method: String,
        params: serde_json::Value,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        transfer: Vec<TransferBuf>,
    },

    /// Abort task `id` gracefully; the worker stays alive if it succeeds.
    Cleanup { id: RequestId },

    /// Shut the worker down. No correlation id.
    Terminate,
}

/// Which std stream a captured fragment came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StdStream {
    Stdout,
    Stderr,
}

/// Frames sent from a worker back to the pool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkerToPool {
    /// Sent exactly once, after the worker runtime initialised.
    Ready,

    /// Task `id` succeeded.
    Done { id: RequestId, result: serde_json::Value },

    /// Task `id` failed inside the method.
    Failed { id: RequestId, fault: WorkerFault },

    /// Progress event for task `id`; arbitrarily many per task.
    Event { id: RequestId, payload: serde_json::Value },

    /// Response to a [`PoolToWorker::Cleanup`]. `fault` is `None` iff the
    /// abort succeeded and the worker is reusable.
    CleanupDone {
        id: RequestId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fault: Option<WorkerFault>,
    },

    /// Captured std-stream fragment, when the transport is configured to
    /// capture them. Not correlated to a single task.
    Stream { channel: StdStream, chunk: String },
}

impl WorkerToPool {
    /// The correlation id, for frames that carry one.
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            WorkerToPool::Done { id, .. }
            | WorkerToPool::Failed { id, .. }
            | WorkerToPool::Event { id, .. }
            | WorkerToPool::CleanupDone { id, .. } => Some(*id),
            WorkerToPool::Ready | WorkerToPool::Stream { .. } => None,
        }
    }
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
