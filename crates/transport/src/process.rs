// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Process transport: a separate OS process speaking length-prefixed
//! frames over stdin/stdout.
//!
//! stderr never carries protocol frames; it is captured line-wise into a
//! bounded tail for crash diagnostics and, when configured, forwarded as
//! stream fragments.

use crate::adapter::{
    ExitCallback, ExitStatus, MessageCallback, Transport, TransportError, TransportKind,
};
use crate::callback::{ExitSlot, MessageSlot};
use async_trait::async_trait;
use mill_core::ExitDiagnostics;
use mill_wire::{read_message, write_message, PoolToWorker, StdStream, WorkerToPool};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ProcessOpts {
    /// Extra arguments passed to the worker binary.
    pub args: Vec<String>,
    /// Extra environment for the worker process.
    pub envs: Vec<(String, String)>,
    /// Forward captured stderr lines as stream fragments.
    pub emit_std_streams: bool,
    /// How many stderr lines to keep for crash diagnostics.
    pub stderr_tail_lines: usize,
}

impl Default for ProcessOpts {
    fn default() -> Self {
        Self { args: Vec::new(), envs: Vec::new(), emit_std_streams: false, stderr_tail_lines: 40 }
    }
}

pub struct ProcessTransport {
    script: PathBuf,
    args: Vec<String>,
    to_worker: mpsc::UnboundedSender<PoolToWorker>,
    messages: Arc<MessageSlot>,
    exit: Arc<ExitSlot>,
    stderr_tail: Arc<Mutex<VecDeque<String>>>,
    pid: u32,
}

impl ProcessTransport {
    /// Spawn the worker binary at `script`.
    pub fn spawn(script: &Path, opts: ProcessOpts) -> Result<Self, TransportError> {
        let mut command = tokio::process::Command::new(script);
        command
            .args(&opts.args)
            .envs(opts.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(TransportError::Spawn)?;
        let pid = child.id().ok_or(TransportError::Closed)?;
        tracing::debug!(script = %script.display(), pid, "worker process spawned");

        let stdin = child.stdin.take().ok_or(TransportError::Closed)?;
        let stdout = child.stdout.take().ok_or(TransportError::Closed)?;
        let stderr = child.stderr.take().ok_or(TransportError::Closed)?;

        let (to_worker, mut outbound) = mpsc::unbounded_channel::<PoolToWorker>();
        let messages = Arc::new(MessageSlot::default());
        let exit = Arc::new(ExitSlot::default());
        let stderr_tail = Arc::new(Mutex::new(VecDeque::new()));

        tokio::spawn(async move {
            let mut stdin = stdin;
            while let Some(frame) = outbound.recv().await {
                if write_message(&mut stdin, &frame).await.is_err() {
                    break;
                }
            }
        });

        let reader_messages = messages.clone();
        tokio::spawn(async move {
            let mut stdout = stdout;
            loop {
                match read_message::<_, WorkerToPool>(&mut stdout).await {
                    Ok(frame) => reader_messages.deliver(frame),
                    // EOF or corrupt stream; the exit watcher reports why
                    Err(_) => break,
                }
            }
        });

        let tail = stderr_tail.clone();
        let tail_limit = opts.stderr_tail_lines.max(1);
        let stream_messages = opts.emit_std_streams.then(|| messages.clone());
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                {
                    let mut tail = tail.lock();
                    if tail.len() == tail_limit {
                        tail.pop_front();
                    }
                    tail.push_back(line.clone());
                }
                if let Some(messages) = &stream_messages {
                    messages
                        .deliver(WorkerToPool::Stream { channel: StdStream::Stderr, chunk: line });
                }
            }
        });

        let exit_watch = exit.clone();
        tokio::spawn(async move {
            let status = match child.wait().await {
                Ok(status) => ExitStatus { code: status.code(), signal: unix_signal(&status) },
                Err(_) => ExitStatus::default(),
            };
            tracing::debug!(pid, code = ?status.code, signal = ?status.signal, "worker process exited");
            exit_watch.fire(status);
        });

        Ok(Self {
            script: script.to_path_buf(),
            args: opts.args,
            to_worker,
            messages,
            exit,
            stderr_tail,
            pid,
        })
    }
}

#[cfg(unix)]
fn unix_signal(status: &std::process::ExitStatus) -> Option<i32> {
    use std::os::unix::process::ExitStatusExt;
    status.signal()
}

#[cfg(not(unix))]
fn unix_signal(_status: &std::process::ExitStatus) -> Option<i32> {
    None
}

#[async_trait]
impl Transport for ProcessTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Process
    }

    fn supports_transfer(&self) -> bool {
        // frames are serialized across the process boundary
        false
    }

    fn send(&self, frame: PoolToWorker) -> Result<(), TransportError> {
        self.to_worker.send(frame).map_err(|_| TransportError::Closed)
    }

    fn on_message(&self, cb: MessageCallback) {
        self.messages.install(cb);
    }

    fn on_exit(&self, cb: ExitCallback) {
        self.exit.install(cb);
    }

    async fn kill(&self, force: bool) -> Result<(), TransportError> {
        if self.exit.observed().is_some() {
            return Ok(());
        }
        if force {
            return send_signal(self.pid, true);
        }
        // graceful: the terminate signal lets the runtime wind down and
        // flush its responses before exiting
        let _ = self.send(PoolToWorker::Terminate);
        Ok(())
    }

    fn diagnostics(&self) -> ExitDiagnostics {
        let tail: Vec<String> = self.stderr_tail.lock().iter().cloned().collect();
        ExitDiagnostics {
            transport: TransportKind::Process.as_str().to_string(),
            script: Some(self.script.clone()),
            args: self.args.clone(),
            stderr_tail: (!tail.is_empty()).then(|| tail.join("\n")),
            ..Default::default()
        }
    }
}

#[cfg(unix)]
fn send_signal(pid: u32, force: bool) -> Result<(), TransportError> {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };
    match kill(Pid::from_raw(pid as i32), signal) {
        Ok(()) => Ok(()),
        // already gone
        Err(nix::errno::Errno::ESRCH) => Ok(()),
        Err(errno) => Err(TransportError::Signal(errno.to_string())),
    }
}

#[cfg(not(unix))]
fn send_signal(_pid: u32, _force: bool) -> Result<(), TransportError> {
    Err(TransportError::Signal("signals unsupported on this platform".to_string()))
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
