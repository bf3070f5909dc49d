// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC protocol between the pool and its workers.
//!
//! Wire format (process transport): 4-byte length prefix (big-endian) +
//! JSON payload. The in-process transport moves the message enums directly.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

mod codec;
mod message;

pub use codec::{
    decode, encode, read_frame, read_message, write_frame, write_message, ProtocolError,
    MAX_FRAME_LEN,
};
pub use message::{PoolToWorker, StdStream, WorkerToPool, CLEANUP_METHOD, METHODS_METHOD};
