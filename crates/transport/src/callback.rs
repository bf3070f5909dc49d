// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration slots for the message and exit callbacks.
//!
//! Transports start reading before the handler registers its callbacks, so
//! the slots buffer early frames. Buffered frames (and an already-observed
//! exit) replay on a spawned task rather than inside `install`: the caller
//! may hold scheduler locks that the callback re-enters. Delivery order is
//! preserved — new frames keep buffering until the drain catches up.

use crate::adapter::{ExitCallback, ExitStatus, MessageCallback};
use mill_wire::WorkerToPool;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

#[derive(Default)]
pub(crate) struct MessageSlot {
    inner: Mutex<MessageSlotInner>,
}

#[derive(Default)]
struct MessageSlotInner {
    cb: Option<MessageCallback>,
    buffered: VecDeque<WorkerToPool>,
    draining: bool,
}

impl MessageSlot {
    pub(crate) fn install(self: &Arc<Self>, cb: MessageCallback) {
        let start_drain = {
            let mut inner = self.inner.lock();
            inner.cb = Some(cb);
            if !inner.buffered.is_empty() && !inner.draining {
                inner.draining = true;
                true
            } else {
                false
            }
        };
        if start_drain {
            let slot = self.clone();
            tokio::spawn(async move { slot.drain() });
        }
    }

    pub(crate) fn deliver(&self, frame: WorkerToPool) {
        let cb = {
            let mut inner = self.inner.lock();
            match &inner.cb {
                // direct delivery only once the backlog is flushed
                Some(cb) if inner.buffered.is_empty() && !inner.draining => cb.clone(),
                _ => {
                    inner.buffered.push_back(frame);
                    return;
                }
            }
        };
        cb(frame);
    }

    fn drain(&self) {
        loop {
            let (cb, frame) = {
                let mut inner = self.inner.lock();
                let cb = inner.cb.clone();
                match (cb, inner.buffered.pop_front()) {
                    (Some(cb), Some(frame)) => (cb, frame),
                    _ => {
                        inner.draining = false;
                        return;
                    }
                }
            };
            cb(frame);
        }
    }
}

#[derive(Default)]
pub(crate) struct ExitSlot {
    inner: Mutex<ExitSlotInner>,
}

#[derive(Default)]
struct ExitSlotInner {
    cb: Option<ExitCallback>,
    observed: Option<ExitStatus>,
    fired: bool,
}

impl ExitSlot {
    /// Register the exit callback. If the worker already exited, the
    /// callback fires on a spawned task.
    pub(crate) fn install(&self, cb: ExitCallback) {
        let mut inner = self.inner.lock();
        match (inner.observed, inner.fired) {
            (Some(status), false) => {
                inner.fired = true;
                drop(inner);
                tokio::spawn(async move { cb(status) });
            }
            _ => {
                inner.cb = Some(cb);
            }
        }
    }

    /// Record the exit and fire the callback once.
    pub(crate) fn fire(&self, status: ExitStatus) {
        let cb = {
            let mut inner = self.inner.lock();
            if inner.fired || inner.observed.is_some() {
                return;
            }
            inner.observed = Some(status);
            match inner.cb.take() {
                Some(cb) => {
                    inner.fired = true;
                    Some(cb)
                }
                None => None,
            }
        };
        if let Some(cb) = cb {
            cb(status);
        }
    }

    pub(crate) fn observed(&self) -> Option<ExitStatus> {
        self.inner.lock().observed
    }
}

#[cfg(test)]
#[path = "callback_tests.rs"]
mod tests;
