// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Request and worker identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Largest request id the pool will ever hand out.
///
/// Request ids are monotonically increasing 53-bit integers so they survive
/// any JSON round trip without loss. Crossing this bound is a fatal
/// implementation error, not a wraparound.
pub const MAX_REQUEST_ID: u64 = (1 << 53) - 1;

/// Correlation id for one task request, unique for the pool's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RequestId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Hands out monotonically increasing [`RequestId`]s.
///
/// Cloning shares the underlying counter, so every clone observes the same
/// monotonic sequence.
#[derive(Clone, Default)]
pub struct RequestIdSource {
    next: Arc<AtomicU64>,
}

impl RequestIdSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&self) -> RequestId {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        assert!(id <= MAX_REQUEST_ID, "request id space exhausted");
        RequestId(id)
    }
}

/// Unique identifier for a worker instance.
///
/// Format: `wkr-` followed by a short random suffix.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(String);

impl WorkerId {
    pub const PREFIX: &'static str = "wkr-";

    /// Generate a fresh random worker id.
    pub fn generate() -> Self {
        Self(format!("{}{}", Self::PREFIX, nanoid::nanoid!(10)))
    }

    /// Create a WorkerId from an existing string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl PartialEq<str> for WorkerId {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

#[cfg(test)]
#[path = "id_tests.rs"]
mod tests;
