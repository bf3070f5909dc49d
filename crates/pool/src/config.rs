// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool configuration: construction-time options and their validation.

use crate::error::PoolError;
use mill_core::{build_queue, EventCallback, QueueStrategy, TaskQueue, TransferBuf, WorkerId};
use mill_runtime::MethodRegistry;
use mill_transport::{Platform, TransportKind};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Transport selection. `Auto` picks the best supported variant for the
/// configured worker source: a registry runs in-process, a script runs as
/// a separate process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WorkerType {
    #[default]
    Auto,
    Thread,
    Process,
}

impl std::fmt::Display for WorkerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            WorkerType::Auto => "auto",
            WorkerType::Thread => "thread",
            WorkerType::Process => "process",
        })
    }
}

/// How many workers to create eagerly at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MinWorkers {
    Count(usize),
    /// As many as `max_workers`.
    Max,
}

impl Default for MinWorkers {
    fn default() -> Self {
        MinWorkers::Count(0)
    }
}

/// Metadata handed to the worker lifecycle callbacks.
#[derive(Debug, Clone)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub kind: TransportKind,
    pub script: Option<PathBuf>,
}

/// Lifecycle callback signature.
pub type WorkerCallback = Arc<dyn Fn(&WorkerInfo) + Send + Sync>;

/// Per-submission options for [`crate::Pool::exec`].
#[derive(Default)]
pub struct ExecOptions {
    /// Receives progress events the method emits.
    pub on_event: Option<EventCallback>,
    /// Binary regions whose ownership moves with the request.
    pub transfer: Vec<TransferBuf>,
    /// Scheduling priority; higher dispatches earlier.
    pub priority: i32,
}

impl ExecOptions {
    pub fn on_event(mut self, cb: impl Fn(serde_json::Value) + Send + Sync + 'static) -> Self {
        self.on_event = Some(Arc::new(cb));
        self
    }

    pub fn transfer(mut self, buffers: Vec<TransferBuf>) -> Self {
        self.transfer = buffers;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }
}

/// Construction-time pool options. All optional; `validate` resolves the
/// defaults against the platform probe.
#[derive(Default)]
pub struct PoolOptions {
    /// Worker binary for the process transport.
    pub worker_script: Option<PathBuf>,
    /// Method registry for the in-process transport.
    pub registry: Option<Arc<MethodRegistry>>,
    /// Hard cap on concurrent workers. Default: max(1, cpus - 1).
    pub max_workers: Option<usize>,
    pub min_workers: MinWorkers,
    /// Admission cap on pending tasks. Default: unbounded.
    pub max_queue_size: Option<usize>,
    pub worker_type: WorkerType,
    pub queue_strategy: QueueStrategy,
    /// Caller-supplied queue satisfying the contract; overrides
    /// `queue_strategy` when set.
    pub custom_queue: Option<Box<dyn TaskQueue>>,
    /// Graceful-termination budget per worker.
    pub worker_terminate_timeout: Option<Duration>,
    /// How long to wait for a cleanup response before the worker is
    /// killed and replaced.
    pub cleanup_timeout: Option<Duration>,
    /// Deliver captured worker std streams as events.
    pub emit_std_streams: bool,
    pub on_worker_create: Option<WorkerCallback>,
    pub on_worker_terminate: Option<WorkerCallback>,
    /// Passthrough arguments for the process transport.
    pub fork_args: Vec<String>,
    /// Passthrough environment for the process transport.
    pub fork_envs: Vec<(String, String)>,
}

impl PoolOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn worker_script(mut self, script: impl Into<PathBuf>) -> Self {
        self.worker_script = Some(script.into());
        self
    }

    pub fn registry(mut self, registry: MethodRegistry) -> Self {
        self.registry = Some(Arc::new(registry));
        self
    }

    pub fn max_workers(mut self, max: usize) -> Self {
        self.max_workers = Some(max);
        self
    }

    pub fn min_workers(mut self, min: MinWorkers) -> Self {
        self.min_workers = min;
        self
    }

    pub fn max_queue_size(mut self, max: usize) -> Self {
        self.max_queue_size = Some(max);
        self
    }

    pub fn worker_type(mut self, kind: WorkerType) -> Self {
        self.worker_type = kind;
        self
    }

    pub fn queue_strategy(mut self, strategy: QueueStrategy) -> Self {
        self.queue_strategy = strategy;
        self
    }

    pub fn custom_queue(mut self, queue: Box<dyn TaskQueue>) -> Self {
        self.custom_queue = Some(queue);
        self
    }

    pub fn worker_terminate_timeout(mut self, budget: Duration) -> Self {
        self.worker_terminate_timeout = Some(budget);
        self
    }

    pub fn cleanup_timeout(mut self, budget: Duration) -> Self {
        self.cleanup_timeout = Some(budget);
        self
    }

    pub fn emit_std_streams(mut self, emit: bool) -> Self {
        self.emit_std_streams = emit;
        self
    }

    pub fn on_worker_create(mut self, cb: impl Fn(&WorkerInfo) + Send + Sync + 'static) -> Self {
        self.on_worker_create = Some(Arc::new(cb));
        self
    }

    pub fn on_worker_terminate(
        mut self,
        cb: impl Fn(&WorkerInfo) + Send + Sync + 'static,
    ) -> Self {
        self.on_worker_terminate = Some(Arc::new(cb));
        self
    }

    pub fn fork_args(mut self, args: Vec<String>) -> Self {
        self.fork_args = args;
        self
    }

    pub fn fork_envs(mut self, envs: Vec<(String, String)>) -> Self {
        self.fork_envs = envs;
        self
    }

    /// Validate against the platform and resolve every default.
    pub(crate) fn resolve(
        self,
        platform: &Platform,
    ) -> Result<(ResolvedOptions, Box<dyn TaskQueue>), PoolError> {
        let max_workers = match self.max_workers {
            Some(0) => {
                return Err(PoolError::Validation("max_workers must be at least 1".into()));
            }
            Some(max) => max,
            None => platform.default_max_workers(),
        };

        let min_workers = match self.min_workers {
            MinWorkers::Max => max_workers,
            MinWorkers::Count(count) => {
                if count > max_workers {
                    return Err(PoolError::Validation(format!(
                        "min_workers ({count}) exceeds max_workers ({max_workers})"
                    )));
                }
                count
            }
        };

        if self.max_queue_size == Some(0) {
            return Err(PoolError::Validation("max_queue_size must be at least 1".into()));
        }

        let kind = match self.worker_type {
            WorkerType::Thread => TransportKind::Thread,
            WorkerType::Process => TransportKind::Process,
            WorkerType::Auto => {
                if self.registry.is_some() {
                    TransportKind::Thread
                } else if self.worker_script.is_some() {
                    TransportKind::Process
                } else {
                    return Err(PoolError::Validation(
                        "either a method registry or a worker script is required".into(),
                    ));
                }
            }
        };
        if !platform.supports(kind) {
            return Err(PoolError::Validation(format!(
                "transport '{}' is not supported on this host",
                kind
            )));
        }
        match kind {
            TransportKind::Thread if self.registry.is_none() => {
                return Err(PoolError::Validation(
                    "the thread transport requires a method registry".into(),
                ));
            }
            TransportKind::Process if self.worker_script.is_none() => {
                return Err(PoolError::Validation(
                    "the process transport requires a worker script".into(),
                ));
            }
            _ => {}
        }

        let queue = match self.custom_queue {
            Some(queue) => queue,
            None => match build_queue(&self.queue_strategy) {
                Ok(queue) => queue,
                Err(mill_core::QueueError::Unsupported { reason }) => {
                    // deterministic fallback: the in-process FIFO
                    tracing::warn!(%reason, "shared-memory queue unavailable, using fifo");
                    match build_queue(&QueueStrategy::Fifo) {
                        Ok(queue) => queue,
                        Err(error) => return Err(error.into()),
                    }
                }
                Err(error) => return Err(error.into()),
            },
        };

        Ok((
            ResolvedOptions {
                kind,
                script: self.worker_script,
                registry: self.registry,
                max_workers,
                min_workers,
                max_queue_size: self.max_queue_size,
                worker_terminate_timeout: self
                    .worker_terminate_timeout
                    .unwrap_or(Duration::from_secs(1)),
                cleanup_timeout: self.cleanup_timeout.unwrap_or(Duration::from_secs(1)),
                emit_std_streams: self.emit_std_streams,
                on_worker_create: self.on_worker_create,
                on_worker_terminate: self.on_worker_terminate,
                fork_args: self.fork_args,
                fork_envs: self.fork_envs,
            },
            queue,
        ))
    }
}

/// Options after validation, with every default applied.
pub(crate) struct ResolvedOptions {
    pub(crate) kind: TransportKind,
    pub(crate) script: Option<PathBuf>,
    pub(crate) registry: Option<Arc<MethodRegistry>>,
    pub(crate) max_workers: usize,
    pub(crate) min_workers: usize,
    pub(crate) max_queue_size: Option<usize>,
    pub(crate) worker_terminate_timeout: Duration,
    pub(crate) cleanup_timeout: Duration,
    pub(crate) emit_std_streams: bool,
    pub(crate) on_worker_create: Option<WorkerCallback>,
    pub(crate) on_worker_terminate: Option<WorkerCallback>,
    pub(crate) fork_args: Vec<String>,
    pub(crate) fork_envs: Vec<(String, String)>,
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
