// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Result handle: the caller-visible observable of a task's settlement.
//!
//! A handle is a shared settled-state cell. It settles exactly once, after
//! which it is terminal; `cancel` and `timeout` route back into the
//! scheduler through a [`CancelScope`] so queued tasks are evicted and
//! executing tasks go through the cleanup protocol.

use crate::error::TaskError;
use crate::id::RequestId;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Notify;

/// Terminal outcome of a task.
pub type Settlement = Result<serde_json::Value, TaskError>;

/// Polling view of a handle's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleState {
    Pending,
    Resolved,
    Rejected,
}

/// Why a cancellation was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelCause {
    Cancelled,
    TimedOut,
}

impl CancelCause {
    pub fn to_error(self) -> TaskError {
        match self {
            CancelCause::Cancelled => TaskError::Cancelled,
            CancelCause::TimedOut => TaskError::TimedOut,
        }
    }
}

/// Scheduler-side hook a bound handle routes `cancel`/timeout firings into.
///
/// Implementations must be idempotent per request id and must tolerate the
/// task having already settled.
pub trait CancelScope: Send + Sync {
    fn cancel(&self, request: RequestId, cause: CancelCause);
}

type SettleCallback = Box<dyn FnOnce(&Settlement) + Send>;

struct CellInner {
    settlement: Option<Settlement>,
    callbacks: Vec<SettleCallback>,
    scope: Option<Weak<dyn CancelScope>>,
    request: Option<RequestId>,
    timeout: Option<Duration>,
    timer: Option<tokio::task::JoinHandle<()>>,
}

struct HandleCell {
    inner: Mutex<CellInner>,
    notify: Notify,
}

/// Promise-like handle for one task. Cloning shares the settlement cell;
/// the handle lives as long as its longest holder.
#[derive(Clone)]
pub struct TaskHandle {
    cell: Arc<HandleCell>,
}

impl TaskHandle {
    /// A handle not yet bound to any scheduler. Used for `then` chains and
    /// as the initial state before submission.
    pub fn detached() -> Self {
        Self {
            cell: Arc::new(HandleCell {
                inner: Mutex::new(CellInner {
                    settlement: None,
                    callbacks: Vec::new(),
                    scope: None,
                    request: None,
                    timeout: None,
                    timer: None,
                }),
                notify: Notify::new(),
            }),
        }
    }

    /// Bind this handle to a scheduler so cancel/timeout reach the task.
    pub fn bind(&self, scope: Weak<dyn CancelScope>, request: RequestId) {
        let mut inner = self.cell.inner.lock();
        inner.scope = Some(scope);
        inner.request = Some(request);
    }

    pub fn state(&self) -> SettleState {
        match &self.cell.inner.lock().settlement {
            None => SettleState::Pending,
            Some(Ok(_)) => SettleState::Resolved,
            Some(Err(_)) => SettleState::Rejected,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.cell.inner.lock().settlement.is_some()
    }

    /// The settlement, if any, without waiting.
    pub fn try_result(&self) -> Option<Settlement> {
        self.cell.inner.lock().settlement.clone()
    }

    /// Wait for the settlement.
    pub async fn wait(&self) -> Settlement {
        loop {
            let notified = self.cell.notify.notified();
            if let Some(settlement) = &self.cell.inner.lock().settlement {
                return settlement.clone();
            }
            notified.await;
        }
    }

    /// Settle the handle. Returns false if it was already settled; the
    /// first settlement wins and later ones are ignored.
    pub fn settle(&self, settlement: Settlement) -> bool {
        let (callbacks, timer) = {
            let mut inner = self.cell.inner.lock();
            if inner.settlement.is_some() {
                return false;
            }
            inner.settlement = Some(settlement.clone());
            (std::mem::take(&mut inner.callbacks), inner.timer.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        for cb in callbacks {
            cb(&settlement);
        }
        self.cell.notify.notify_waiters();
        true
    }

    pub fn resolve(&self, value: serde_json::Value) -> bool {
        self.settle(Ok(value))
    }

    pub fn reject(&self, error: TaskError) -> bool {
        self.settle(Err(error))
    }

    /// Register a callback fired on settlement. Runs immediately if the
    /// handle already settled.
    pub fn on_settle(&self, cb: impl FnOnce(&Settlement) + Send + 'static) {
        let settlement = {
            let mut inner = self.cell.inner.lock();
            match &inner.settlement {
                Some(settlement) => settlement.clone(),
                None => {
                    inner.callbacks.push(Box::new(cb));
                    return;
                }
            }
        };
        cb(&settlement);
    }

    /// Chain a new handle off this one's settlement.
    pub fn then<F, G>(&self, on_ok: F, on_err: G) -> TaskHandle
    where
        F: FnOnce(serde_json::Value) -> Settlement + Send + 'static,
        G: FnOnce(TaskError) -> Settlement + Send + 'static,
    {
        let next = TaskHandle::detached();
        let chained = next.clone();
        self.on_settle(move |settlement| {
            let out = match settlement.clone() {
                Ok(value) => on_ok(value),
                Err(error) => on_err(error),
            };
            chained.settle(out);
        });
        next
    }

    /// Cancel the task. Safe in any state and idempotent; a no-op once
    /// settled.
    pub fn cancel(&self) {
        self.cancel_with(CancelCause::Cancelled);
    }

    /// Arm (or re-arm) the one-shot timeout timer.
    ///
    /// The timer runs immediately; if the task is dispatched later, the
    /// timer restarts so the executing budget is measured from dispatch.
    /// A firing while the task is still queued evicts it from the queue
    /// with [`TaskError::TimedOut`] and never contacts a worker.
    pub fn timeout(&self, budget: Duration) {
        let old = {
            let mut inner = self.cell.inner.lock();
            if inner.settlement.is_some() {
                return;
            }
            inner.timeout = Some(budget);
            let old = inner.timer.take();
            inner.timer = Some(self.spawn_timer(budget));
            old
        };
        if let Some(old) = old {
            old.abort();
        }
    }

    /// The armed timeout budget, if any.
    pub fn armed_timeout(&self) -> Option<Duration> {
        self.cell.inner.lock().timeout
    }

    /// Scheduler notification that the task left the queue for a worker.
    /// Restarts an armed timer so the budget is dispatch-relative.
    pub fn mark_dispatched(&self) {
        let old = {
            let mut inner = self.cell.inner.lock();
            if inner.settlement.is_some() {
                return;
            }
            match inner.timeout {
                Some(budget) => {
                    let old = inner.timer.take();
                    inner.timer = Some(self.spawn_timer(budget));
                    old
                }
                None => None,
            }
        };
        if let Some(old) = old {
            old.abort();
        }
    }

    fn spawn_timer(&self, budget: Duration) -> tokio::task::JoinHandle<()> {
        let handle = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(budget).await;
            handle.cancel_with(CancelCause::TimedOut);
        })
    }

    fn cancel_with(&self, cause: CancelCause) {
        let routed = {
            let inner = self.cell.inner.lock();
            if inner.settlement.is_some() {
                return;
            }
            match (&inner.scope, inner.request) {
                (Some(scope), Some(request)) => scope.upgrade().map(|scope| (scope, request)),
                _ => None,
            }
        };
        // The scope settles the handle once it has resolved where the task
        // lives (queue eviction vs. cleanup protocol). An unbound handle
        // settles directly.
        match routed {
            Some((scope, request)) => scope.cancel(request, cause),
            None => {
                self.reject(cause.to_error());
            }
        }
    }
}

impl std::fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle").field("state", &self.state()).finish()
    }
}

#[cfg(test)]
#[path = "handle_tests.rs"]
mod tests;
