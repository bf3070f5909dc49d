// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The pool: admission, dispatch, worker lifecycle, and shutdown.
//!
//! All shared state lives behind one mutex, so every public operation is a
//! critical section with respect to the queue, the worker set, and the
//! handlers' correlation maps.

use crate::config::{ExecOptions, PoolOptions, ResolvedOptions, WorkerInfo};
use crate::error::PoolError;
use crate::handler::WorkerHandler;
use mill_core::{
    CancelCause, CancelScope, RequestId, RequestIdSource, Task, TaskError, TaskHandle, TaskQueue,
    TimeSource, WorkerId,
};
use mill_runtime::ServeOptions;
use mill_transport::{
    probe, ChannelTransport, ProcessOpts, ProcessTransport, ThreadOpts, Transport, TransportKind,
};
use mill_wire::METHODS_METHOD;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Scheduler snapshot for callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub total_workers: usize,
    pub busy_workers: usize,
    pub idle_workers: usize,
    pub pending_tasks: usize,
    pub active_tasks: usize,
}

struct PoolState {
    queue: Box<dyn TaskQueue>,
    workers: Vec<Arc<WorkerHandler>>,
    terminating: bool,
}

pub(crate) struct PoolCore {
    opts: ResolvedOptions,
    ids: RequestIdSource,
    time: TimeSource,
    state: Mutex<PoolState>,
}

/// A managed set of workers executing submitted tasks.
///
/// Cloning shares the same pool.
#[derive(Clone)]
pub struct Pool {
    core: Arc<PoolCore>,
}

impl Pool {
    pub fn new(options: PoolOptions) -> Result<Self, PoolError> {
        let platform = probe();
        let (opts, queue) = options.resolve(&platform)?;
        let core = Arc::new(PoolCore {
            opts,
            ids: RequestIdSource::new(),
            time: TimeSource::default(),
            state: Mutex::new(PoolState { queue, workers: Vec::new(), terminating: false }),
        });

        // eager pre-spawn
        if core.opts.min_workers > 0 {
            let mut state = core.state.lock();
            for _ in 0..core.opts.min_workers {
                if let Err(error) = core.create_worker(&mut state) {
                    return Err(error);
                }
            }
        }

        Ok(Self { core })
    }

    /// Submit a task for a registered worker method. Every failure after
    /// this call returns reaches the caller through the handle.
    pub fn exec(
        &self,
        method: impl Into<String>,
        params: serde_json::Value,
        options: ExecOptions,
    ) -> TaskHandle {
        self.core.exec(method.into(), params, options)
    }

    /// A call-by-name façade over the worker's registered method list.
    pub async fn proxy(&self) -> Result<Proxy, TaskError> {
        let handle = self.core.exec(
            METHODS_METHOD.to_string(),
            serde_json::Value::Null,
            ExecOptions::default(),
        );
        let names = handle.wait().await?;
        let methods: Vec<String> = serde_json::from_value(names).unwrap_or_default();
        Ok(Proxy { core: self.core.clone(), methods })
    }

    pub fn stats(&self) -> PoolStats {
        self.core.stats()
    }

    /// Shut the pool down. Queued tasks reject immediately; with
    /// `force = false` in-flight tasks finish first, with `force = true`
    /// they reject once their worker dies. Idempotent.
    pub async fn terminate(&self, force: bool, timeout: Option<Duration>) -> Result<(), TaskError> {
        self.core.terminate(force, timeout).await
    }
}

impl PoolCore {
    fn exec(
        self: &Arc<Self>,
        method: String,
        params: serde_json::Value,
        options: ExecOptions,
    ) -> TaskHandle {
        let handle = TaskHandle::detached();
        let request = self.ids.next();
        let scope: Arc<dyn CancelScope> = self.clone();
        handle.bind(Arc::downgrade(&scope), request);

        let task = Task {
            request,
            method,
            params,
            transfer: options.transfer,
            priority: options.priority,
            handle: handle.clone(),
            on_event: options.on_event,
            enqueued_at_ms: self.time.epoch_ms(),
        };
        self.submit(task);
        handle
    }

    fn submit(self: &Arc<Self>, task: Task) {
        let handle = task.handle.clone();
        let rejection = {
            let mut state = self.state.lock();
            if state.terminating {
                Some(TaskError::PoolTerminated)
            } else if self
                .opts
                .max_queue_size
                .is_some_and(|max| state.queue.len() >= max)
            {
                Some(TaskError::QueueFull)
            } else {
                match state.queue.push(task) {
                    Ok(()) => None,
                    Err(error) => {
                        tracing::debug!(%error, "queue rejected task");
                        Some(TaskError::QueueFull)
                    }
                }
            }
        };
        match rejection {
            Some(error) => {
                handle.reject(error);
            }
            None => self.dispatch_next(),
        }
    }

    /// Drain the queue onto available workers, growing the set up to
    /// `max_workers`. Selection among idle workers is first-available in
    /// creation order, which is deterministic for identical worker states.
    pub(crate) fn dispatch_next(self: &Arc<Self>) {
        loop {
            let mut state = self.state.lock();
            if state.terminating || state.queue.is_empty() {
                return;
            }
            let worker = match state.workers.iter().find(|w| w.is_available()).cloned() {
                Some(worker) => worker,
                None => {
                    if state.workers.len() >= self.opts.max_workers {
                        return;
                    }
                    match self.create_worker(&mut state) {
                        Ok(worker) => worker,
                        Err(error) => {
                            tracing::error!(%error, "worker creation failed");
                            return;
                        }
                    }
                }
            };
            let Some(task) = state.queue.pop() else { return };
            if task.handle.is_settled() {
                // cancelled while queued but not yet evicted
                continue;
            }
            worker.exec(task);
        }
    }

    fn create_worker(
        self: &Arc<Self>,
        state: &mut PoolState,
    ) -> Result<Arc<WorkerHandler>, PoolError> {
        let id = WorkerId::generate();
        let transport: Arc<dyn Transport> = match self.opts.kind {
            TransportKind::Thread => {
                let registry = self.opts.registry.clone().ok_or_else(|| {
                    PoolError::Validation("thread transport lost its registry".into())
                })?;
                Arc::new(ChannelTransport::spawn(
                    registry,
                    ThreadOpts {
                        serve: ServeOptions { cleanup_budget: self.opts.cleanup_timeout },
                    },
                ))
            }
            TransportKind::Process => {
                let script = self.opts.script.clone().ok_or_else(|| {
                    PoolError::Validation("process transport lost its script".into())
                })?;
                Arc::new(ProcessTransport::spawn(
                    &script,
                    ProcessOpts {
                        args: self.opts.fork_args.clone(),
                        envs: self.opts.fork_envs.clone(),
                        emit_std_streams: self.opts.emit_std_streams,
                        ..ProcessOpts::default()
                    },
                )?)
            }
        };

        let info = WorkerInfo {
            id: id.clone(),
            kind: self.opts.kind,
            script: self.opts.script.clone(),
        };
        tracing::debug!(worker = %id, kind = %self.opts.kind, "worker created");

        let handler =
            WorkerHandler::new(id, transport, Arc::downgrade(self), self.opts.cleanup_timeout);
        state.workers.push(handler.clone());

        if let Some(cb) = self.opts.on_worker_create.clone() {
            tokio::spawn(async move { cb(&info) });
        }
        Ok(handler)
    }

    /// A worker exited; forget it and refill from the queue if needed.
    pub(crate) fn remove_worker(self: &Arc<Self>, id: &WorkerId) {
        let (terminating, info) = {
            let mut state = self.state.lock();
            let before = state.workers.len();
            state.workers.retain(|w| w.id() != id);
            if state.workers.len() == before {
                return;
            }
            (
                state.terminating,
                WorkerInfo {
                    id: id.clone(),
                    kind: self.opts.kind,
                    script: self.opts.script.clone(),
                },
            )
        };
        tracing::debug!(worker = %id, "worker removed");
        if let Some(cb) = self.opts.on_worker_terminate.clone() {
            tokio::spawn(async move { cb(&info) });
        }
        if !terminating {
            // a replacement slot opened up for queued work
            self.dispatch_next();
        }
    }

    /// A worker made progress (ready, settled, or finished cleanup).
    pub(crate) fn worker_progress(self: &Arc<Self>) {
        let terminating = self.state.lock().terminating;
        if !terminating {
            self.dispatch_next();
        }
    }

    fn stats(&self) -> PoolStats {
        let state = self.state.lock();
        let mut busy_workers = 0;
        let mut active_tasks = 0;
        for worker in &state.workers {
            let active = worker.active_count();
            if active > 0 {
                busy_workers += 1;
            }
            active_tasks += active;
        }
        PoolStats {
            total_workers: state.workers.len(),
            busy_workers,
            idle_workers: state.workers.len() - busy_workers,
            pending_tasks: state.queue.len(),
            active_tasks,
        }
    }

    async fn terminate(
        self: &Arc<Self>,
        force: bool,
        timeout: Option<Duration>,
    ) -> Result<(), TaskError> {
        let budget = timeout.unwrap_or(self.opts.worker_terminate_timeout);
        let (evicted, workers) = {
            let mut state = self.state.lock();
            state.terminating = true;
            (state.queue.clear(), state.workers.clone())
        };
        tracing::debug!(evicted = evicted.len(), workers = workers.len(), force, "pool terminating");
        for task in &evicted {
            task.handle.reject(TaskError::PoolTerminated);
        }

        let results = futures_util::future::join_all(
            workers.into_iter().map(|worker| worker.terminate_and_notify(force, budget)),
        )
        .await;

        // surface the worst per-worker error
        let worst = results
            .into_iter()
            .filter_map(Result::err)
            .max_by_key(|error| error.severity());
        match worst {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl CancelScope for PoolCore {
    fn cancel(&self, request: RequestId, cause: CancelCause) {
        let (queued, executing) = {
            let mut state = self.state.lock();
            match state.queue.remove(request) {
                // queued: synchronous removal, no worker contact
                Some(task) => (Some(task.handle.clone()), None),
                None => (
                    None,
                    state.workers.iter().find(|w| w.has_request(request)).cloned(),
                ),
            }
        };
        if let Some(handle) = queued {
            tracing::debug!(request = %request, "queued task cancelled");
            handle.reject(cause.to_error());
            return;
        }
        if let Some(handler) = executing {
            handler.begin_cleanup(request, cause);
        }
        // otherwise the task already settled: cancellation is a no-op
    }
}

/// Thin call-by-name surface mirroring the worker's registered methods.
pub struct Proxy {
    core: Arc<PoolCore>,
    methods: Vec<String>,
}

impl Proxy {
    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    /// Route a call through normal submission.
    pub fn call(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<TaskHandle, PoolError> {
        if !self.methods.iter().any(|m| m == method) {
            return Err(PoolError::UnknownMethod { name: method.to_string() });
        }
        Ok(self.core.exec(method.to_string(), params, ExecOptions::default()))
    }
}

#[cfg(test)]
#[path = "pool_tests.rs"]
mod tests;
