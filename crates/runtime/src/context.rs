// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-invocation context handed to worker methods.

use mill_core::RequestId;
use mill_wire::WorkerToPool;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Injected handle a method uses to emit progress events and observe
/// cancellation. One context per invocation; no global worker state.
#[derive(Clone)]
pub struct RunContext {
    request: RequestId,
    outbound: mpsc::UnboundedSender<WorkerToPool>,
    cancel: CancellationToken,
}

impl RunContext {
    pub(crate) fn new(
        request: RequestId,
        outbound: mpsc::UnboundedSender<WorkerToPool>,
        cancel: CancellationToken,
    ) -> Self {
        Self { request, outbound, cancel }
    }

    /// The id of the request this invocation serves.
    pub fn request(&self) -> RequestId {
        self.request
    }

    /// Send a progress event to the submitting side's event sink.
    pub fn emit(&self, payload: serde_json::Value) {
        let _ = self.outbound.send(WorkerToPool::Event { id: self.request, payload });
    }

    /// Resolves when a cleanup request asks this invocation to stop.
    /// Cooperative methods select on this and return early.
    pub async fn cancelled(&self) {
        self.cancel.cancelled().await;
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;
