// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! mill-runtime: the counterpart loaded inside a worker.
//!
//! Owns the method registry, threads an event sink and a cancellation
//! token through each invocation, and runs the serve loop that answers the
//! pool's frames.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod context;
mod error;
mod registry;
mod serve;

pub use context::RunContext;
pub use error::RuntimeError;
pub use registry::{MethodFuture, MethodRegistry};
pub use serve::{serve_channel, serve_stdio, ServeOptions};

// what registered methods return
pub use mill_core::WorkerFault;
