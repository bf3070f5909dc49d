// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared-memory queue bridge: a lock-free ring of slot indices plus a slot
//! table of scheduling metadata, with live task objects held in a
//! process-local map.
//!
//! The atomics carry everything a consumer needs to schedule without the
//! local map: membership checks resolve through the slot table's `request`
//! field, drained entries order by the table's `(priority, stamp)` key,
//! and slots recycle through its refcount. Only the task object itself —
//! which nothing but the submitting process can execute — stays local.

use super::TaskQueue;
use crate::error::QueueError;
use crate::id::RequestId;
use crate::task::Task;
use crate::time::TimeSource;
use std::cmp::Ordering as CmpOrdering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::atomic::{AtomicI32, AtomicU32, AtomicU64, AtomicU8, Ordering};

/// What `push` does when the ring is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverflowPolicy {
    /// Spill into an internal process-local FIFO.
    Spill,
    /// Surface [`QueueError::Full`] to the caller.
    Reject,
}

const SLOT_FREE: u8 = 0;
/// Claimed and still scheduled: its index is in the ring.
const SLOT_QUEUED: u8 = 1;
/// Evicted before its ring entry was consumed; invisible to membership
/// checks, reclaimed when the drain pops the stale entry.
const SLOT_TOMBSTONE: u8 = 2;

/// Per-slot scheduling metadata kept in atomics.
struct SlotMeta {
    state: AtomicU8,
    priority: AtomicI32,
    request: AtomicU64,
    stamp_ms: AtomicU64,
    refs: AtomicU32,
}

impl SlotMeta {
    fn empty() -> Self {
        Self {
            state: AtomicU8::new(SLOT_FREE),
            priority: AtomicI32::new(0),
            request: AtomicU64::new(0),
            stamp_ms: AtomicU64::new(0),
            refs: AtomicU32::new(0),
        }
    }
}

/// Companion slot allocator: one metadata record per ring cell.
struct SlotTable {
    slots: Vec<SlotMeta>,
}

impl SlotTable {
    fn new(capacity: usize) -> Self {
        Self { slots: (0..capacity).map(|_| SlotMeta::empty()).collect() }
    }

    fn claim(&self) -> Option<u32> {
        for (idx, slot) in self.slots.iter().enumerate() {
            if slot
                .state
                .compare_exchange(SLOT_FREE, SLOT_QUEUED, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                slot.refs.store(1, Ordering::Relaxed);
                return Some(idx as u32);
            }
        }
        None
    }

    fn fill(&self, idx: u32, priority: i32, request: RequestId, stamp_ms: u64) {
        let slot = &self.slots[idx as usize];
        slot.priority.store(priority, Ordering::Relaxed);
        slot.request.store(request.as_u64(), Ordering::Relaxed);
        slot.stamp_ms.store(stamp_ms, Ordering::Relaxed);
    }

    /// Find the queued slot holding `request`, if any. Tombstoned slots do
    /// not count as members.
    fn find_queued(&self, request: RequestId) -> Option<u32> {
        self.slots.iter().enumerate().find_map(|(idx, slot)| {
            (slot.state.load(Ordering::Acquire) == SLOT_QUEUED
                && slot.request.load(Ordering::Relaxed) == request.as_u64())
            .then_some(idx as u32)
        })
    }

    /// Mark an evicted slot so membership checks skip it while its stale
    /// ring entry is still pending.
    fn tombstone(&self, idx: u32) {
        self.slots[idx as usize].state.store(SLOT_TOMBSTONE, Ordering::Release);
    }

    /// The ordering key a consumer schedules by: priority first, earlier
    /// stamp among equals.
    fn scheduling_key(&self, idx: u32) -> (i32, u64) {
        let slot = &self.slots[idx as usize];
        (slot.priority.load(Ordering::Relaxed), slot.stamp_ms.load(Ordering::Relaxed))
    }

    /// Drop one reference; the last one frees the slot.
    fn release(&self, idx: u32) {
        let slot = &self.slots[idx as usize];
        if slot.refs.fetch_sub(1, Ordering::AcqRel) == 1 {
            slot.state.store(SLOT_FREE, Ordering::Release);
        }
    }
}

/// Bounded lock-free ring of slot indices (Vyukov-style sequence cells).
struct Ring {
    mask: u64,
    cells: Vec<RingCell>,
    head: AtomicU64,
    tail: AtomicU64,
}

struct RingCell {
    seq: AtomicU64,
    slot: AtomicU32,
}

impl Ring {
    fn new(capacity: usize) -> Self {
        Self {
            mask: capacity as u64 - 1,
            cells: (0..capacity)
                .map(|i| RingCell { seq: AtomicU64::new(i as u64), slot: AtomicU32::new(0) })
                .collect(),
            head: AtomicU64::new(0),
            tail: AtomicU64::new(0),
        }
    }

    fn push(&self, slot: u32) -> Result<(), ()> {
        loop {
            let tail = self.tail.load(Ordering::Relaxed);
            let cell = &self.cells[(tail & self.mask) as usize];
            let seq = cell.seq.load(Ordering::Acquire);
            match seq.cmp(&tail) {
                CmpOrdering::Equal => {
                    if self
                        .tail
                        .compare_exchange_weak(tail, tail + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        cell.slot.store(slot, Ordering::Relaxed);
                        cell.seq.store(tail + 1, Ordering::Release);
                        return Ok(());
                    }
                }
                CmpOrdering::Less => return Err(()),
                CmpOrdering::Greater => {}
            }
        }
    }

    fn pop(&self) -> Option<u32> {
        loop {
            let head = self.head.load(Ordering::Relaxed);
            let cell = &self.cells[(head & self.mask) as usize];
            let seq = cell.seq.load(Ordering::Acquire);
            match seq.cmp(&(head + 1)) {
                CmpOrdering::Equal => {
                    if self
                        .head
                        .compare_exchange_weak(head, head + 1, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                    {
                        let slot = cell.slot.load(Ordering::Relaxed);
                        cell.seq.store(head + self.mask + 1, Ordering::Release);
                        return Some(slot);
                    }
                }
                CmpOrdering::Less => return None,
                CmpOrdering::Greater => {}
            }
        }
    }
}

struct PendEntry {
    priority: i32,
    stamp_ms: u64,
    seq: u64,
    task: Task,
}

impl PartialEq for PendEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for PendEntry {}

impl PartialOrd for PendEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // the shared key: priority descending, then earlier stamp; the
        // local seq stabilizes stamp ties within one producer
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.stamp_ms.cmp(&self.stamp_ms))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Task queue backed by the ring + slot table.
///
/// Capacity must be a power of two. Tasks whose slot index is in the ring
/// are keyed by that index in `staged`; their scheduling state lives in the
/// slot table and is read back from it.
pub struct SharedQueue {
    ring: Ring,
    table: SlotTable,
    overflow_policy: OverflowPolicy,
    time: TimeSource,
    next_seq: u64,
    /// Task objects for slots currently in the ring.
    staged: HashMap<u32, (u64, Task)>,
    /// Spilled tasks (ring was full) with their seq and stamp.
    overflow: VecDeque<(u64, u64, Task)>,
    /// Drained-but-not-yet-popped tasks, ordered by the shared key.
    pending: BinaryHeap<PendEntry>,
    capacity: usize,
}

impl SharedQueue {
    pub fn new(capacity: usize, overflow: OverflowPolicy) -> Result<Self, QueueError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(QueueError::CapacityNotPowerOfTwo { got: capacity });
        }
        if cfg!(not(target_has_atomic = "64")) {
            return Err(QueueError::Unsupported {
                reason: "64-bit atomics are not available on this target".to_string(),
            });
        }
        Ok(Self {
            ring: Ring::new(capacity),
            table: SlotTable::new(capacity),
            overflow_policy: overflow,
            time: TimeSource::default(),
            next_seq: 0,
            staged: HashMap::new(),
            overflow: VecDeque::new(),
            pending: BinaryHeap::new(),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Pull every ring entry and spilled task into the pending heap,
    /// keyed by the slot table's scheduling metadata. Tombstoned slots
    /// have no staged task; their slot is reclaimed and the entry skipped.
    fn drain_into_pending(&mut self) {
        while let Some(slot) = self.ring.pop() {
            let (priority, stamp_ms) = self.table.scheduling_key(slot);
            self.table.release(slot);
            if let Some((seq, task)) = self.staged.remove(&slot) {
                // the shared key and the local task must describe the same
                // submission
                debug_assert_eq!(priority, task.priority);
                self.pending.push(PendEntry { priority, stamp_ms, seq, task });
            }
        }
        while let Some((seq, stamp_ms, task)) = self.overflow.pop_front() {
            self.pending.push(PendEntry { priority: task.priority, stamp_ms, seq, task });
        }
    }
}

impl TaskQueue for SharedQueue {
    fn push(&mut self, task: Task) -> Result<(), QueueError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        let stamp_ms = self.time.epoch_ms();
        if let Some(slot) = self.table.claim() {
            self.table.fill(slot, task.priority, task.request, stamp_ms);
            if self.ring.push(slot).is_ok() {
                self.staged.insert(slot, (seq, task));
                return Ok(());
            }
            self.table.release(slot);
        }
        match self.overflow_policy {
            OverflowPolicy::Spill => {
                self.overflow.push_back((seq, stamp_ms, task));
                Ok(())
            }
            OverflowPolicy::Reject => Err(QueueError::Full { capacity: self.capacity }),
        }
    }

    fn pop(&mut self) -> Option<Task> {
        self.drain_into_pending();
        self.pending.pop().map(|e| e.task)
    }

    fn len(&self) -> usize {
        self.staged.len() + self.overflow.len() + self.pending.len()
    }

    fn contains(&self, request: RequestId) -> bool {
        // ring-resident membership resolves through the slot table alone
        self.table.find_queued(request).is_some()
            || self.overflow.iter().any(|(_, _, t)| t.request == request)
            || self.pending.iter().any(|e| e.task.request == request)
    }

    fn remove(&mut self, request: RequestId) -> Option<Task> {
        if let Some(slot) = self.table.find_queued(request) {
            if let Some((_, task)) = self.staged.remove(&slot) {
                // the ring entry stays behind; the tombstone hides the slot
                // from lookups until the drain reclaims it
                self.table.tombstone(slot);
                return Some(task);
            }
        }
        if let Some(idx) = self.overflow.iter().position(|(_, _, t)| t.request == request) {
            return self.overflow.remove(idx).map(|(_, _, t)| t);
        }
        if self.pending.iter().any(|e| e.task.request == request) {
            let mut removed = None;
            let entries = std::mem::take(&mut self.pending);
            for entry in entries.into_iter() {
                if entry.task.request == request {
                    removed = Some(entry.task);
                } else {
                    self.pending.push(entry);
                }
            }
            return removed;
        }
        None
    }

    fn clear(&mut self) -> Vec<Task> {
        self.drain_into_pending();
        let mut out = Vec::with_capacity(self.pending.len());
        while let Some(entry) = self.pending.pop() {
            out.push(entry.task);
        }
        out
    }
}

#[cfg(test)]
#[path = "shared_tests.rs"]
mod tests;
