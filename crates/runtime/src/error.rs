// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for the worker runtime.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("method name '{name}' is reserved by the protocol")]
    ReservedMethod { name: String },

    #[error("method '{name}' is already registered")]
    DuplicateMethod { name: String },

    #[error(transparent)]
    Protocol(#[from] mill_wire::ProtocolError),
}
