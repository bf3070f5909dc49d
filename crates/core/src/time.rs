// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Millisecond stamps for queue-age accounting.
//!
//! The pool stamps a task once, at admission, and the shared-memory slot
//! table re-reads that stamp when ordering drained entries. Nothing else
//! in the scheduler consumes wall-clock time: timeout and cleanup budgets
//! run on the async runtime's timers. A single epoch-ms source covers both
//! stamp writers; the manual variant lets tests pin stamps without
//! sleeping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Where enqueue stamps come from.
#[derive(Clone, Default)]
pub enum TimeSource {
    /// Wall-clock epoch milliseconds.
    #[default]
    System,
    /// Test-driven stamp, shared across clones.
    Manual(Arc<AtomicU64>),
}

impl TimeSource {
    /// A manual source starting at `start_ms`.
    pub fn manual(start_ms: u64) -> Self {
        TimeSource::Manual(Arc::new(AtomicU64::new(start_ms)))
    }

    /// Current stamp in epoch milliseconds.
    pub fn epoch_ms(&self) -> u64 {
        match self {
            TimeSource::System => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            TimeSource::Manual(now) => now.load(Ordering::Relaxed),
        }
    }

    /// Move a manual source forward. No-op on the system source.
    pub fn advance_ms(&self, ms: u64) {
        if let TimeSource::Manual(now) = self {
            now.fetch_add(ms, Ordering::Relaxed);
        }
    }

    /// How long something stamped at `stamp_ms` has been waiting.
    /// Saturates when the stamp is in the future (clock skew).
    pub fn age_ms(&self, stamp_ms: u64) -> u64 {
        self.epoch_ms().saturating_sub(stamp_ms)
    }
}

#[cfg(test)]
#[path = "time_tests.rs"]
mod tests;
