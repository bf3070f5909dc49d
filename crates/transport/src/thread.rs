// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process transport: a cooperative worker on the host runtime.
//!
//! The worker side is `mill_runtime::serve_channel` on a spawned task;
//! frames move through unbounded channels without serialization, so
//! transfer lists are true ownership handoffs.

use crate::adapter::{
    ExitCallback, ExitStatus, MessageCallback, Transport, TransportError, TransportKind,
};
use crate::callback::{ExitSlot, MessageSlot};
use async_trait::async_trait;
use mill_core::ExitDiagnostics;
use mill_runtime::{MethodRegistry, ServeOptions};
use mill_wire::PoolToWorker;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Exit code reported when the worker task panicked.
const PANIC_EXIT_CODE: i32 = 101;

#[derive(Debug, Clone, Default)]
pub struct ThreadOpts {
    pub serve: ServeOptions,
}

pub struct ChannelTransport {
    to_worker: mpsc::UnboundedSender<PoolToWorker>,
    messages: Arc<MessageSlot>,
    exit: Arc<ExitSlot>,
    serve_abort: AbortHandle,
}

impl ChannelTransport {
    /// Start a cooperative worker serving `registry`.
    pub fn spawn(registry: Arc<MethodRegistry>, opts: ThreadOpts) -> Self {
        let (to_worker, inbound) = mpsc::unbounded_channel();
        let (outbound, mut from_worker) = mpsc::unbounded_channel();

        let serve =
            tokio::spawn(mill_runtime::serve_channel(registry, inbound, outbound, opts.serve));
        let serve_abort = serve.abort_handle();

        let messages = Arc::new(MessageSlot::default());
        let exit = Arc::new(ExitSlot::default());

        let monitor_messages = messages.clone();
        let monitor_exit = exit.clone();
        tokio::spawn(async move {
            // the stream ends once the serve loop and every in-flight
            // method wrapper dropped their senders
            while let Some(frame) = from_worker.recv().await {
                monitor_messages.deliver(frame);
            }
            let status = match serve.await {
                Ok(()) => ExitStatus::clean(),
                Err(join) if join.is_cancelled() => ExitStatus { code: None, signal: None },
                Err(_) => ExitStatus { code: Some(PANIC_EXIT_CODE), signal: None },
            };
            monitor_exit.fire(status);
        });

        Self { to_worker, messages, exit, serve_abort }
    }
}

#[async_trait]
impl Transport for ChannelTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Thread
    }

    fn supports_transfer(&self) -> bool {
        true
    }

    fn send(&self, frame: PoolToWorker) -> Result<(), TransportError> {
        self.to_worker.send(frame).map_err(|_| TransportError::Closed)
    }

    fn on_message(&self, cb: MessageCallback) {
        self.messages.install(cb);
    }

    fn on_exit(&self, cb: ExitCallback) {
        self.exit.install(cb);
    }

    async fn kill(&self, force: bool) -> Result<(), TransportError> {
        if force {
            self.serve_abort.abort();
            return Ok(());
        }
        // graceful: the terminate signal lets the serve loop wind down
        let _ = self.send(PoolToWorker::Terminate);
        Ok(())
    }

    fn diagnostics(&self) -> ExitDiagnostics {
        ExitDiagnostics { transport: TransportKind::Thread.as_str().to_string(), ..Default::default() }
    }
}

#[cfg(test)]
#[path = "thread_tests.rs"]
mod tests;
