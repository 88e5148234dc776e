//! Run unit - owns one external process from spawn to terminal status
//!
//! One run unit executes per task: it claims the pending task, spawns the
//! external tool, streams both pipes into the task log and records the
//! terminal status. Cancellation is cooperative: a termination signal first,
//! a kill once the grace period runs out.

use crate::engine::TaskEngine;
use crate::op::Operation;
use crate::status::TaskStatus;
use crate::task::{CancelReason, ExitInfo, LogSource, TaskId};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, Notify};
use tokio::time::timeout;
use tracing::{debug, warn};

type LineSender = mpsc::UnboundedSender<(LogSource, String)>;

// ============================================================================
// Cancellation Signal
// ============================================================================

/// Cancellation flag shared between the engine and one run unit
pub(crate) struct CancelSignal {
    requested: AtomicBool,
    shutdown: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub(crate) fn new() -> Self {
        Self {
            requested: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Request termination. Only the first request reaches the run unit.
    pub(crate) fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.notify.notify_one();
        }
    }

    /// Request termination on behalf of engine shutdown
    pub(crate) fn request_shutdown(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            self.shutdown.store(true, Ordering::SeqCst);
            self.notify.notify_one();
        }
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// Wait until termination is requested. Completes immediately when the
    /// request came in before this call.
    async fn cancelled(&self) {
        self.notify.notified().await;
    }
}

// ============================================================================
// Run Unit
// ============================================================================

impl TaskEngine {
    /// Execute one task to its terminal status
    pub(crate) async fn run_unit(self, id: TaskId, cancel: Arc<CancelSignal>) {
        // Claim the task; a pre-start cancellation may already own it
        if !self.mark_running(id).await {
            self.remove_run_handle(id).await;
            return;
        }

        let op = {
            let tasks = self.tasks.read().await;
            tasks.get(&id).map(|task| task.op.clone())
        };
        let Some(op) = op else {
            self.remove_run_handle(id).await;
            return;
        };

        // Every log line flows through one channel so sequence numbers and
        // delivery order agree even when both pipes produce at once.
        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        let pump = {
            let engine = self.clone();
            tokio::spawn(async move {
                while let Some((source, text)) = line_rx.recv().await {
                    engine.append_log(id, source, text).await;
                }
            })
        };

        let (status, exit) = self.drive(id, &op, &cancel, &line_tx).await;

        // Drain queued log lines before the terminal transition
        drop(line_tx);
        let _ = pump.await;

        self.finish_task(id, status, exit).await;
        self.remove_run_handle(id).await;
    }

    /// Spawn the process and see it through to an exit, a cancellation or a
    /// launch failure
    async fn drive(
        &self,
        id: TaskId,
        op: &Operation,
        cancel: &CancelSignal,
        lines: &LineSender,
    ) -> (TaskStatus, ExitInfo) {
        let tool = &self.config.tool;
        let args = match op.build_args() {
            Ok(args) => args,
            Err(e) => {
                let message = e.to_string();
                note(lines, message.clone());
                return (TaskStatus::Failed, ExitInfo::LaunchFailed(message));
            }
        };

        note(lines, format!("Running: {} {}", tool, args.join(" ")));

        let mut command = Command::new(tool);
        command
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                let message = format!("failed to start {}: {}", tool, e);
                note(lines, message.clone());
                warn!("Task {}: {}", id, message);
                return (TaskStatus::Failed, ExitInfo::LaunchFailed(message));
            }
        };
        debug!("Task {} spawned process (pid {:?})", id, child.id());

        let stdout_reader = child
            .stdout
            .take()
            .map(|pipe| spawn_reader(pipe, LogSource::Stdout, lines.clone()));
        let stderr_reader = child
            .stderr
            .take()
            .map(|pipe| spawn_reader(pipe, LogSource::Stderr, lines.clone()));

        let mut cancelled = false;
        let mut escalated = false;
        let wait_result = tokio::select! {
            result = child.wait() => result,
            _ = cancel.cancelled() => {
                cancelled = true;
                note(lines, "Termination signal sent".to_string());
                send_terminate(&child);
                match timeout(self.config.grace_period, child.wait()).await {
                    Ok(result) => result,
                    Err(_) => {
                        escalated = true;
                        note(lines, format!(
                            "No exit after {:.1}s, killing process",
                            self.config.grace_period.as_secs_f64()
                        ));
                        if let Err(e) = child.kill().await {
                            warn!("Task {}: kill failed: {}", id, e);
                        }
                        child.wait().await
                    }
                }
            }
        };

        // Pipes close when the process is gone; wait for the readers so the
        // log is complete before the terminal status is recorded.
        if let Some(reader) = stdout_reader {
            let _ = reader.await;
        }
        if let Some(reader) = stderr_reader {
            let _ = reader.await;
        }

        if cancelled {
            let reason = if cancel.is_shutdown() {
                CancelReason::Shutdown
            } else if escalated {
                CancelReason::Killed
            } else {
                CancelReason::Terminated
            };
            note(lines, format!("Task cancelled ({})", reason));
            return (TaskStatus::Cancelled, ExitInfo::Cancelled(reason));
        }

        match wait_result {
            Ok(status) => match status.code() {
                Some(0) => {
                    note(lines, "Process exited with code 0".to_string());
                    (TaskStatus::Succeeded, ExitInfo::Exited(0))
                }
                Some(code) => {
                    note(lines, format!("Process exited with code {}", code));
                    (TaskStatus::Failed, ExitInfo::Exited(code))
                }
                // Killed by a signal outside our control
                None => {
                    note(lines, "Process terminated by signal".to_string());
                    (TaskStatus::Failed, ExitInfo::Exited(-1))
                }
            },
            Err(e) => {
                let message = format!("failed to wait for process: {}", e);
                note(lines, message.clone());
                (TaskStatus::Failed, ExitInfo::LaunchFailed(message))
            }
        }
    }
}

/// Stream one pipe into the line channel
fn spawn_reader<R>(pipe: R, source: LogSource, lines: LineSender) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(pipe).lines();
        while let Ok(Some(line)) = reader.next_line().await {
            if lines.send((source, line)).is_err() {
                break;
            }
        }
    })
}

/// Ask the process to terminate (SIGTERM)
#[cfg(unix)]
fn send_terminate(child: &Child) {
    if let Some(pid) = child.id() {
        let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
        if rc != 0 {
            debug!("SIGTERM delivery to pid {} failed", pid);
        }
    }
}

/// No termination signal off unix; the grace timeout kills instead
#[cfg(not(unix))]
fn send_terminate(_child: &Child) {}

fn note(lines: &LineSender, text: String) {
    let _ = lines.send((LogSource::System, text));
}
