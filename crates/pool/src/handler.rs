// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-worker controller: correlation maps, the worker state machine, the
//! cleanup protocol, and crash containment.
//!
//! Lock discipline: the pool lock may be held while taking a handler lock,
//! never the reverse. Handler callbacks release their lock before calling
//! back into the pool.

use crate::pool::PoolCore;
use mill_core::{CancelCause, RequestId, Task, TaskError, WorkerId};
use mill_transport::{ExitStatus, Transport};
use mill_wire::{PoolToWorker, StdStream, WorkerToPool};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// Worker lifecycle phase.
///
/// `creating → waiting → executing → (cleaning) → waiting … →
/// terminating → terminated`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Creating,
    Waiting,
    Executing,
    Cleaning,
    Terminating,
    Terminated,
}

struct TrackedTask {
    task: Task,
    cause: CancelCause,
}

struct HandlerState {
    phase: Phase,
    /// Tasks currently executing on the worker.
    processing: HashMap<RequestId, Task>,
    /// Tasks awaiting a cleanup acknowledgement.
    tracking: HashMap<RequestId, TrackedTask>,
    /// Frames buffered until the worker signals ready.
    pre_ready: Vec<PoolToWorker>,
    cleanup_timer: Option<tokio::task::JoinHandle<()>>,
    exit_waiters: Vec<oneshot::Sender<ExitStatus>>,
    exited: Option<ExitStatus>,
    /// Set once termination is requested; blocks new dispatches.
    terminate_requested: bool,
}

/// Main-side controller for one worker.
pub(crate) struct WorkerHandler {
    id: WorkerId,
    transport: Arc<dyn Transport>,
    pool: Weak<PoolCore>,
    cleanup_timeout: Duration,
    state: Mutex<HandlerState>,
    /// Signalled whenever the handler has no in-flight work left.
    idle: Notify,
}

impl WorkerHandler {
    pub(crate) fn new(
        id: WorkerId,
        transport: Arc<dyn Transport>,
        pool: Weak<PoolCore>,
        cleanup_timeout: Duration,
    ) -> Arc<Self> {
        let handler = Arc::new(Self {
            id,
            transport,
            pool,
            cleanup_timeout,
            state: Mutex::new(HandlerState {
                phase: Phase::Creating,
                processing: HashMap::new(),
                tracking: HashMap::new(),
                pre_ready: Vec::new(),
                cleanup_timer: None,
                exit_waiters: Vec::new(),
                exited: None,
                terminate_requested: false,
            }),
            idle: Notify::new(),
        });
        handler.install_callbacks();
        handler
    }

    fn install_callbacks(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.transport.on_message(Arc::new(move |frame| {
            if let Some(handler) = weak.upgrade() {
                handler.handle_message(frame);
            }
        }));
        let weak = Arc::downgrade(self);
        self.transport.on_exit(Box::new(move |status| {
            if let Some(handler) = weak.upgrade() {
                handler.handle_exit(status);
            }
        }));
    }

    pub(crate) fn id(&self) -> &WorkerId {
        &self.id
    }

    /// Whether the pool may assign a task. A freshly created worker counts
    /// as available; its frames buffer until the ready signal.
    pub(crate) fn is_available(&self) -> bool {
        let state = self.state.lock();
        matches!(state.phase, Phase::Creating | Phase::Waiting)
            && state.processing.is_empty()
            && state.tracking.is_empty()
            && !state.terminate_requested
    }

    /// Tasks currently in flight (executing or awaiting cleanup).
    pub(crate) fn active_count(&self) -> usize {
        let state = self.state.lock();
        state.processing.len() + state.tracking.len()
    }

    pub(crate) fn has_request(&self, request: RequestId) -> bool {
        let state = self.state.lock();
        state.processing.contains_key(&request) || state.tracking.contains_key(&request)
    }

    /// Dispatch a task to this worker. Caller guarantees availability.
    pub(crate) fn exec(&self, mut task: Task) {
        // taking params/transfer here is the ownership handoff of the
        // transfer list: the queued task no longer holds the buffers
        let frame = PoolToWorker::Run {
            id: task.request,
            method: task.method.clone(),
            params: std::mem::take(&mut task.params),
            transfer: std::mem::take(&mut task.transfer),
        };
        task.handle.mark_dispatched();
        tracing::debug!(worker = %self.id, request = %task.request, method = %task.method, "task dispatched");

        let send_now = {
            let mut state = self.state.lock();
            state.processing.insert(task.request, task);
            match state.phase {
                Phase::Creating => {
                    state.pre_ready.push(frame);
                    None
                }
                _ => {
                    state.phase = Phase::Executing;
                    Some(frame)
                }
            }
        };
        if let Some(frame) = send_now {
            let _ = self.transport.send(frame);
        }
    }

    /// Start the cleanup protocol for an executing task. Idempotent; the
    /// first cancellation cause wins.
    pub(crate) fn begin_cleanup(self: &Arc<Self>, request: RequestId, cause: CancelCause) {
        let send_now = {
            let mut state = self.state.lock();
            if state.tracking.contains_key(&request) {
                return;
            }
            let Some(task) = state.processing.remove(&request) else {
                return;
            };
            state.tracking.insert(request, TrackedTask { task, cause });
            let frame = PoolToWorker::Cleanup { id: request };

            let weak = Arc::downgrade(self);
            let budget = self.cleanup_timeout;
            state.cleanup_timer = Some(tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                if let Some(handler) = weak.upgrade() {
                    handler.cleanup_overdue(request);
                }
            }));

            match state.phase {
                Phase::Creating => {
                    state.pre_ready.push(frame);
                    None
                }
                _ => {
                    state.phase = Phase::Cleaning;
                    Some(frame)
                }
            }
        };
        tracing::debug!(worker = %self.id, request = %request, "cleanup requested");
        if let Some(frame) = send_now {
            let _ = self.transport.send(frame);
        }
    }

    /// The cleanup budget elapsed without a response: kill and replace.
    fn cleanup_overdue(&self, request: RequestId) {
        let overdue = {
            let mut state = self.state.lock();
            if state.phase == Phase::Terminated || !state.tracking.contains_key(&request) {
                false
            } else {
                state.phase = Phase::Terminating;
                true
            }
        };
        if overdue {
            tracing::warn!(worker = %self.id, request = %request, "no cleanup response within budget, killing worker");
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let _ = transport.kill(true).await;
            });
        }
    }

    /// Route one incoming frame per the correlation rules.
    pub(crate) fn handle_message(self: &Arc<Self>, frame: WorkerToPool) {
        if self.state.lock().phase == Phase::Terminated {
            // anything after terminated is discarded
            return;
        }
        match frame {
            WorkerToPool::Ready => self.on_ready(),
            WorkerToPool::Done { id, result } => self.on_response(id, Ok(result)),
            WorkerToPool::Failed { id, fault } => {
                self.on_response(id, Err(TaskError::Application(fault)))
            }
            WorkerToPool::Event { id, payload } => self.on_event(id, payload),
            WorkerToPool::CleanupDone { id, fault } => self.on_cleanup_done(id, fault),
            WorkerToPool::Stream { channel, chunk } => self.on_stream(channel, chunk),
        }
    }

    fn on_ready(self: &Arc<Self>) {
        let frames = {
            let mut state = self.state.lock();
            if state.phase != Phase::Creating {
                tracing::debug!(worker = %self.id, "duplicate ready signal ignored");
                return;
            }
            let frames = std::mem::take(&mut state.pre_ready);
            state.phase = if !state.processing.is_empty() {
                Phase::Executing
            } else if !state.tracking.is_empty() {
                Phase::Cleaning
            } else {
                Phase::Waiting
            };
            frames
        };
        tracing::debug!(worker = %self.id, buffered = frames.len(), "worker ready");
        for frame in frames {
            let _ = self.transport.send(frame);
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.worker_progress();
        }
    }

    fn on_response(self: &Arc<Self>, request: RequestId, outcome: Result<serde_json::Value, TaskError>) {
        let (task, idle) = {
            let mut state = self.state.lock();
            let Some(task) = state.processing.remove(&request) else {
                tracing::debug!(worker = %self.id, request = %request, "response for unknown request discarded");
                return;
            };
            let idle = state.processing.is_empty() && state.tracking.is_empty();
            if idle && state.phase == Phase::Executing {
                state.phase = Phase::Waiting;
            }
            (task, idle)
        };
        tracing::debug!(worker = %self.id, request = %request, ok = outcome.is_ok(), "task settled");
        task.handle.settle(outcome);
        if idle {
            self.idle.notify_waiters();
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.worker_progress();
        }
    }

    fn on_event(&self, request: RequestId, payload: serde_json::Value) {
        let sink = {
            let state = self.state.lock();
            match state.processing.get(&request) {
                Some(task) => task.on_event.clone(),
                None => {
                    // events after settlement are discarded
                    tracing::debug!(worker = %self.id, request = %request, "event for settled task discarded");
                    return;
                }
            }
        };
        if let Some(sink) = sink {
            sink(payload);
        }
    }

    fn on_cleanup_done(self: &Arc<Self>, request: RequestId, fault: Option<mill_core::WorkerFault>) {
        let (tracked, escalate, idle) = {
            let mut state = self.state.lock();
            let Some(tracked) = state.tracking.remove(&request) else {
                tracing::debug!(worker = %self.id, request = %request, "unmatched cleanup response discarded");
                return;
            };
            if let Some(timer) = state.cleanup_timer.take() {
                timer.abort();
            }
            let idle = state.processing.is_empty() && state.tracking.is_empty();
            match &fault {
                None => {
                    if state.phase == Phase::Cleaning {
                        state.phase =
                            if idle { Phase::Waiting } else { Phase::Executing };
                    }
                    (tracked, false, idle)
                }
                Some(_) => {
                    state.phase = Phase::Terminating;
                    (tracked, true, idle)
                }
            }
        };

        // the original cancellation cause settles the handle either way
        tracked.task.handle.settle(Err(tracked.cause.to_error()));

        if escalate {
            tracing::warn!(worker = %self.id, request = %request, fault = ?fault, "cleanup failed, killing worker");
            let transport = self.transport.clone();
            tokio::spawn(async move {
                let _ = transport.kill(true).await;
            });
            return;
        }
        tracing::debug!(worker = %self.id, request = %request, "cleanup acknowledged, worker reusable");
        if idle {
            self.idle.notify_waiters();
        }
        if let Some(pool) = self.pool.upgrade() {
            pool.worker_progress();
        }
    }

    fn on_stream(&self, channel: StdStream, chunk: String) {
        let sinks: Vec<_> = {
            let state = self.state.lock();
            state.processing.values().filter_map(|task| task.on_event.clone()).collect()
        };
        if sinks.is_empty() {
            // no active task to attribute the fragment to
            return;
        }
        let payload = serde_json::json!({
            "stream": match channel { StdStream::Stdout => "stdout", StdStream::Stderr => "stderr" },
            "chunk": chunk,
        });
        for sink in sinks {
            sink(payload.clone());
        }
    }

    /// The worker exited. Reject outstanding work, then hand the handler
    /// back to the pool for removal.
    fn handle_exit(self: &Arc<Self>, status: ExitStatus) {
        let (processing, tracking, waiters) = {
            let mut state = self.state.lock();
            if state.phase == Phase::Terminated {
                return;
            }
            state.phase = Phase::Terminated;
            state.exited = Some(status);
            if let Some(timer) = state.cleanup_timer.take() {
                timer.abort();
            }
            (
                std::mem::take(&mut state.processing),
                std::mem::take(&mut state.tracking),
                std::mem::take(&mut state.exit_waiters),
            )
        };

        if !processing.is_empty() || !tracking.is_empty() {
            tracing::warn!(
                worker = %self.id,
                code = ?status.code,
                signal = ?status.signal,
                outstanding = processing.len() + tracking.len(),
                "worker exited with outstanding tasks"
            );
        } else {
            tracing::debug!(worker = %self.id, code = ?status.code, "worker exited");
        }

        let mut diagnostics = self.transport.diagnostics();
        diagnostics.exit_code = status.code;
        diagnostics.signal = status.signal;
        for (_, task) in processing {
            task.handle.settle(Err(TaskError::Terminated(diagnostics.clone())));
        }
        // cleanup was already underway; these settle with their cause
        for (_, tracked) in tracking {
            tracked.task.handle.settle(Err(tracked.cause.to_error()));
        }

        if let Some(pool) = self.pool.upgrade() {
            pool.remove_worker(&self.id);
        }
        self.idle.notify_waiters();
        for waiter in waiters {
            let _ = waiter.send(status);
        }
    }

    /// Request termination and settle once the exit is observed.
    ///
    /// Graceful termination waits for in-flight work to finish before the
    /// terminate signal; `budget` bounds the whole sequence, after which
    /// the worker is force-killed and `TimedOut` is reported.
    pub(crate) async fn terminate_and_notify(
        self: Arc<Self>,
        force: bool,
        budget: Duration,
    ) -> Result<ExitStatus, TaskError> {
        let deadline = tokio::time::Instant::now() + budget;
        let mut exit_rx = {
            let mut state = self.state.lock();
            state.terminate_requested = true;
            if let Some(status) = state.exited {
                return Ok(status);
            }
            let (tx, rx) = oneshot::channel();
            state.exit_waiters.push(tx);
            rx
        };

        if force {
            {
                let mut state = self.state.lock();
                if state.phase != Phase::Terminated {
                    state.phase = Phase::Terminating;
                }
            }
            let _ = self.transport.kill(true).await;
        } else {
            loop {
                let notified = self.idle.notified();
                let busy = {
                    let state = self.state.lock();
                    state.phase != Phase::Terminated
                        && !(state.processing.is_empty() && state.tracking.is_empty())
                };
                if !busy {
                    break;
                }
                tokio::select! {
                    _ = notified => {}
                    status = &mut exit_rx => {
                        return Ok(status.unwrap_or_default());
                    }
                    _ = tokio::time::sleep_until(deadline) => {
                        tracing::warn!(worker = %self.id, "graceful termination budget exceeded, killing worker");
                        let _ = self.transport.kill(true).await;
                        return Err(TaskError::TimedOut);
                    }
                }
            }
            {
                let mut state = self.state.lock();
                if state.phase != Phase::Terminated {
                    state.phase = Phase::Terminating;
                }
            }
            let _ = self.transport.kill(false).await;
        }

        match tokio::time::timeout_at(deadline, &mut exit_rx).await {
            Ok(status) => Ok(status.unwrap_or_default()),
            Err(_) => {
                tracing::warn!(worker = %self.id, "termination budget exceeded, killing worker");
                let _ = self.transport.kill(true).await;
                Err(TaskError::TimedOut)
            }
        }
    }
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
