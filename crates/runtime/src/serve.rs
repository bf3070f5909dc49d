// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Serve loop: reads pool frames, runs methods, writes responses.
//!
//! At most one method executes at a time; further run requests queue in a
//! worker-side backlog. Cleanup cancels the running invocation's token,
//! escalating to a hard task abort when the method ignores it.

use crate::context::RunContext;
use crate::error::RuntimeError;
use crate::registry::MethodRegistry;
use futures_util::FutureExt;
use mill_core::{RequestId, WorkerFault};
use mill_wire::{read_message, write_message, PoolToWorker, WorkerToPool, METHODS_METHOD};
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

/// Grace period after a hard abort before the worker reports the cleanup
/// as failed (and gets replaced by the pool).
const ABORT_GRACE: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct ServeOptions {
    /// How long a cancelled method may keep running before escalation.
    pub cleanup_budget: Duration,
}

impl Default for ServeOptions {
    fn default() -> Self {
        Self { cleanup_budget: Duration::from_secs(1) }
    }
}

struct Running {
    id: RequestId,
    token: CancellationToken,
    join: tokio::task::JoinHandle<()>,
    done_rx: oneshot::Receiver<()>,
}

/// Serve over in-process channels. Used by the thread-backed transport.
pub async fn serve_channel(
    registry: Arc<MethodRegistry>,
    inbound: mpsc::UnboundedReceiver<PoolToWorker>,
    outbound: mpsc::UnboundedSender<WorkerToPool>,
    opts: ServeOptions,
) {
    run_loop(registry, inbound, outbound, opts).await;
}

/// Serve over stdin/stdout with length-prefixed frames. This is the entry
/// point for worker binaries spawned by the process-backed transport.
pub async fn serve_stdio(
    registry: Arc<MethodRegistry>,
    opts: ServeOptions,
) -> Result<(), RuntimeError> {
    let (in_tx, in_rx) = mpsc::unbounded_channel();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<WorkerToPool>();

    let reader = tokio::spawn(async move {
        let mut stdin = tokio::io::stdin();
        loop {
            match read_message::<_, PoolToWorker>(&mut stdin).await {
                Ok(frame) => {
                    if in_tx.send(frame).is_err() {
                        break;
                    }
                }
                // EOF or corrupt stream: the pool side went away
                Err(_) => break,
            }
        }
    });

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(frame) = out_rx.recv().await {
            if write_message(&mut stdout, &frame).await.is_err() {
                break;
            }
        }
    });

    run_loop(registry, in_rx, out_tx, opts).await;

    reader.abort();
    // let the writer flush queued responses before exiting
    let _ = writer.await;
    Ok(())
}

async fn run_loop(
    registry: Arc<MethodRegistry>,
    mut inbound: mpsc::UnboundedReceiver<PoolToWorker>,
    outbound: mpsc::UnboundedSender<WorkerToPool>,
    opts: ServeOptions,
) {
    let _ = outbound.send(WorkerToPool::Ready);

    let mut current: Option<Running> = None;
    let mut backlog: VecDeque<(RequestId, String, serde_json::Value)> = VecDeque::new();

    loop {
        tokio::select! {
            _ = wait_current(&mut current) => {
                current = None;
                if let Some((id, method, params)) = backlog.pop_front() {
                    current = Some(start_task(&registry, &outbound, id, method, params));
                }
            }

            frame = inbound.recv() => {
                let Some(frame) = frame else { break };
                match frame {
                    PoolToWorker::Run { id, method, params, transfer } => {
                        if method == METHODS_METHOD {
                            let names = registry.names();
                            let _ = outbound.send(WorkerToPool::Done {
                                id,
                                result: serde_json::json!(names),
                            });
                            continue;
                        }
                        let params = merge_transfer(params, transfer);
                        if current.is_some() {
                            backlog.push_back((id, method, params));
                        } else {
                            current = Some(start_task(&registry, &outbound, id, method, params));
                        }
                    }

                    PoolToWorker::Cleanup { id } => {
                        handle_cleanup(
                            id,
                            &mut current,
                            &mut backlog,
                            &outbound,
                            opts.cleanup_budget,
                        )
                        .await;
                        if current.is_none() {
                            if let Some((id, method, params)) = backlog.pop_front() {
                                current =
                                    Some(start_task(&registry, &outbound, id, method, params));
                            }
                        }
                    }

                    PoolToWorker::Terminate => {
                        tracing::debug!("terminate signal received");
                        if let Some(running) = current.take() {
                            running.token.cancel();
                            running.join.abort();
                        }
                        break;
                    }
                }
            }
        }
    }
}

/// Resolves when the running invocation finishes; pends forever when idle.
async fn wait_current(current: &mut Option<Running>) {
    match current.as_mut() {
        Some(running) => {
            let _ = (&mut running.done_rx).await;
        }
        None => std::future::pending().await,
    }
}

/// Cancel the invocation for `id`, waiting out the cleanup budget before a
/// hard abort. Tasks still in the backlog are simply dropped.
async fn handle_cleanup(
    id: RequestId,
    current: &mut Option<Running>,
    backlog: &mut VecDeque<(RequestId, String, serde_json::Value)>,
    outbound: &mpsc::UnboundedSender<WorkerToPool>,
    budget: Duration,
) {
    if let Some(pos) = backlog.iter().position(|(queued, _, _)| *queued == id) {
        backlog.remove(pos);
        let _ = outbound.send(WorkerToPool::CleanupDone { id, fault: None });
        return;
    }

    let matches_current = current.as_ref().is_some_and(|running| running.id == id);
    if !matches_current {
        // already finished; nothing left to abort
        let _ = outbound.send(WorkerToPool::CleanupDone { id, fault: None });
        return;
    }

    let Some(mut running) = current.take() else { return };
    running.token.cancel();

    let fault = if tokio::time::timeout(budget, &mut running.done_rx).await.is_ok() {
        None
    } else {
        tracing::debug!(request = %id, "cleanup budget elapsed, aborting the task");
        running.join.abort();
        match tokio::time::timeout(ABORT_GRACE, running.join).await {
            // the abort landed; the worker is still reusable
            Ok(_) => None,
            Err(_) => Some(WorkerFault::new(
                "CleanupTimeout",
                "method did not stop within the cleanup budget",
            )),
        }
    };
    let _ = outbound.send(WorkerToPool::CleanupDone { id, fault });
}

fn start_task(
    registry: &Arc<MethodRegistry>,
    outbound: &mpsc::UnboundedSender<WorkerToPool>,
    id: RequestId,
    method: String,
    params: serde_json::Value,
) -> Running {
    let token = CancellationToken::new();
    let (done_tx, done_rx) = oneshot::channel();
    let ctx = RunContext::new(id, outbound.clone(), token.clone());
    let registry = registry.clone();
    let out = outbound.clone();

    let join = tokio::spawn(async move {
        let response = match registry.invoke(&method, params, ctx) {
            Some(fut) => match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(Ok(result)) => WorkerToPool::Done { id, result },
                Ok(Err(fault)) => WorkerToPool::Failed { id, fault },
                Err(payload) => WorkerToPool::Failed {
                    id,
                    fault: WorkerFault::from_panic(payload.as_ref()),
                },
            },
            None => WorkerToPool::Failed {
                id,
                fault: WorkerFault::new("MethodNotFound", format!("unknown method '{method}'")),
            },
        };
        let _ = out.send(response);
        let _ = done_tx.send(());
    });

    Running { id, token, join, done_rx }
}

/// Transferred buffers are surfaced to methods alongside their params so
/// the handoff stays visible end to end.
fn merge_transfer(params: serde_json::Value, transfer: Vec<Vec<u8>>) -> serde_json::Value {
    if transfer.is_empty() {
        return params;
    }
    serde_json::json!({ "params": params, "transfer": transfer })
}

#[cfg(test)]
#[path = "serve_tests.rs"]
mod tests;
