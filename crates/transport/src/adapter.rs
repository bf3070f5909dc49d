// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The transport seam: one trait over every worker backing.

use async_trait::async_trait;
use mill_core::ExitDiagnostics;
use mill_wire::{PoolToWorker, WorkerToPool};
use std::sync::Arc;
use thiserror::Error;

/// Which backing a transport drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    /// Cooperative worker sharing the host process.
    Thread,
    /// Separate OS process speaking frames over stdio.
    Process,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::Thread => "thread",
            TransportKind::Process => "process",
        }
    }
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a worker exited, as observed by its transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExitStatus {
    pub code: Option<i32>,
    pub signal: Option<i32>,
}

impl ExitStatus {
    pub fn clean() -> Self {
        Self { code: Some(0), signal: None }
    }

    pub fn is_clean(&self) -> bool {
        self.code == Some(0) && self.signal.is_none()
    }
}

/// Invoked for every frame the worker sends.
pub type MessageCallback = Arc<dyn Fn(WorkerToPool) + Send + Sync>;

/// Invoked once, when the worker exits for any reason.
pub type ExitCallback = Box<dyn FnOnce(ExitStatus) + Send>;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("worker channel is closed")]
    Closed,

    #[error("failed to spawn worker: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed to signal worker: {0}")]
    Signal(String),
}

/// Bidirectional message channel over one worker backing.
///
/// `send` is a synchronous enqueue; delivery runs on the transport's own
/// writer. Frames are delivered to the worker in `send` order.
#[async_trait]
pub trait Transport: Send + Sync {
    fn kind(&self) -> TransportKind;

    /// Whether binary regions in a transfer list move ownership without a
    /// copy. False for serialized (process) transports.
    fn supports_transfer(&self) -> bool;

    fn send(&self, frame: PoolToWorker) -> Result<(), TransportError>;

    /// Register the single message callback. Frames that arrived earlier
    /// are replayed into it in order.
    fn on_message(&self, cb: MessageCallback);

    /// Register the exit callback. Fires immediately if the worker already
    /// exited.
    fn on_exit(&self, cb: ExitCallback);

    /// Request termination. `force` kills immediately; otherwise the
    /// terminate signal is delivered and the worker winds down on its own.
    async fn kill(&self, force: bool) -> Result<(), TransportError>;

    /// Diagnostics template for crash reports: transport kind, spawn info,
    /// and the captured stderr tail. Exit code and signal are filled in by
    /// the caller from the observed [`ExitStatus`].
    fn diagnostics(&self) -> ExitDiagnostics;
}
