// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy for tasks, queues, and worker exits.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

/// Serialized form of an error thrown inside a worker method.
///
/// Workers serialize into this tagged struct; the pool side reconstructs a
/// typed [`TaskError::Application`] from it. `extras` carries any additional
/// own properties the original error had, so nothing is lost in transit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerFault {
    pub name: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// Any other own properties of the original error. Flattened, so an
    /// empty map adds nothing to the wire shape.
    #[serde(flatten)]
    pub extras: BTreeMap<String, serde_json::Value>,
}

impl WorkerFault {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), message: message.into(), stack: None, extras: BTreeMap::new() }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extras.insert(key.into(), value);
        self
    }

    /// Build a fault from a panic payload caught inside a worker.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "worker method panicked".to_string()
        };
        Self::new("Panic", message)
    }
}

impl std::fmt::Display for WorkerFault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

/// What the pool knows about a worker that exited unexpectedly.
///
/// Attached to [`TaskError::Terminated`] so callers can see which transport
/// died, how, and what it printed last.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExitDiagnostics {
    /// Transport variant ("thread" or "process")
    pub transport: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signal: Option<i32>,
    /// Worker script path, for the process variant
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<PathBuf>,
    /// Arguments the worker was spawned with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    /// Last captured stderr lines, newest last
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr_tail: Option<String>,
}

/// Why a task's result handle rejected.
///
/// Every failure reaches the caller through their handle; the pool itself
/// never propagates per-task errors once submission has returned.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskError {
    #[error("task cancelled")]
    Cancelled,

    #[error("task timed out")]
    TimedOut,

    #[error("worker terminated unexpectedly ({})", .0.transport)]
    Terminated(ExitDiagnostics),

    #[error("pool is terminated")]
    PoolTerminated,

    #[error("task queue is full")]
    QueueFull,

    #[error("worker error: {0}")]
    Application(WorkerFault),
}

impl TaskError {
    /// Severity rank used when aggregating shutdown errors; higher is worse.
    pub fn severity(&self) -> u8 {
        match self {
            TaskError::Cancelled => 0,
            TaskError::PoolTerminated => 1,
            TaskError::QueueFull => 2,
            TaskError::Application(_) => 3,
            TaskError::TimedOut => 4,
            TaskError::Terminated(_) => 5,
        }
    }
}

/// Failures raised by a task queue itself.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("queue is full (capacity {capacity})")]
    Full { capacity: usize },

    #[error("queue capacity {got} is not a power of two")]
    CapacityNotPowerOfTwo { got: usize },

    #[error("queue variant unavailable: {reason}")]
    Unsupported { reason: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
