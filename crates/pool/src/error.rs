// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pool-level errors. Per-task failures travel through result handles as
//! [`mill_core::TaskError`]; these are the errors the pool surface itself
//! can return.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("invalid pool configuration: {0}")]
    Validation(String),

    #[error("unknown worker method '{name}'")]
    UnknownMethod { name: String },

    #[error(transparent)]
    Queue(#[from] mill_core::QueueError),

    #[error(transparent)]
    Transport(#[from] mill_transport::TransportError),
}
