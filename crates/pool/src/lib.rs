// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mill-pool: the main-process scheduler.
//!
//! Admits tasks, queues them under the configured strategy, dispatches to
//! worker handlers over the transport seam, and enforces the lifecycle
//! guarantees: cancellation, dispatch-relative timeouts, graceful cleanup,
//! crash containment, and orderly shutdown.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod config;
mod error;
mod handler;
mod pool;

pub use config::{ExecOptions, MinWorkers, PoolOptions, WorkerInfo, WorkerType};
pub use error::PoolError;
pub use pool::{Pool, PoolStats, Proxy};

// The task-facing vocabulary callers need alongside the pool.
pub use mill_core::{
    EventCallback, QueueStrategy, SettleState, TaskError, TaskHandle, WorkerFault,
};
