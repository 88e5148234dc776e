//! Task definition and log model

use crate::op::{OpKind, Operation};
use crate::status::TaskStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    /// Generate a new random TaskId
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

/// Origin of a captured log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogSource {
    /// Process standard output
    Stdout,
    /// Process standard error
    Stderr,
    /// Engine breadcrumb (launch, termination, exit summary)
    System,
}

impl LogSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogSource::Stdout => "stdout",
            LogSource::Stderr => "stderr",
            LogSource::System => "system",
        }
    }
}

/// A single line captured into a task log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogLine {
    /// Position in the task log, 1-based, dense
    pub seq: u64,
    /// Where the line came from
    pub source: LogSource,
    /// Line content without the trailing newline
    pub text: String,
    /// Capture timestamp
    pub at: DateTime<Utc>,
}

/// Why a finished task ended the way it did
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExitInfo {
    /// Process ran to completion with this exit code
    Exited(i32),
    /// Process could not be started
    LaunchFailed(String),
    /// Cancellation was honored
    Cancelled(CancelReason),
}

impl std::fmt::Display for ExitInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitInfo::Exited(code) => write!(f, "exit code {}", code),
            ExitInfo::LaunchFailed(message) => write!(f, "launch failed: {}", message),
            ExitInfo::Cancelled(reason) => write!(f, "cancelled ({})", reason),
        }
    }
}

/// How a cancellation took effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelReason {
    /// Cancelled before the process was spawned
    BeforeStart,
    /// Process exited after the termination signal
    Terminated,
    /// Process ignored the termination signal and was killed after the grace period
    Killed,
    /// Engine shutdown cancelled the task
    Shutdown,
}

impl CancelReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CancelReason::BeforeStart => "before start",
            CancelReason::Terminated => "terminated",
            CancelReason::Killed => "killed",
            CancelReason::Shutdown => "shutdown",
        }
    }
}

impl std::fmt::Display for CancelReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A tracked container operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier
    pub id: TaskId,

    /// The operation this task performs
    pub op: Operation,

    /// Current status
    pub status: TaskStatus,

    /// When the task was submitted
    pub created_at: DateTime<Utc>,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When the task reached a terminal status
    pub ended_at: Option<DateTime<Utc>>,

    /// Captured output, append-only while running
    pub log: Vec<LogLine>,

    /// How the task ended, set exactly when the status turns terminal
    pub exit: Option<ExitInfo>,
}

impl Task {
    /// Create a new pending task for an operation
    pub fn new(op: Operation) -> Self {
        Self {
            id: TaskId::new(),
            op,
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            log: Vec::new(),
            exit: None,
        }
    }

    /// Kind of the underlying operation
    pub fn kind(&self) -> OpKind {
        self.op.kind()
    }

    /// Primary container this operation acts on, if any
    pub fn target(&self) -> Option<&str> {
        self.op.target()
    }

    /// Check if the task is pending or running
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Wall-clock execution time, if the task has started
    pub fn duration(&self) -> Option<Duration> {
        let start = self.started_at?;
        let end = self.ended_at.unwrap_or_else(Utc::now);
        (end - start).to_std().ok()
    }

    /// Mark the task as running
    pub(crate) fn start(&mut self) {
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
    }

    /// Record a terminal status and its exit information
    pub(crate) fn finish(&mut self, status: TaskStatus, exit: ExitInfo) {
        self.status = status;
        self.exit = Some(exit);
        self.ended_at = Some(Utc::now());
    }

    /// Append a line to the log, assigning the next sequence number
    pub(crate) fn append_line(&mut self, source: LogSource, text: String) -> LogLine {
        let line = LogLine {
            seq: self.log.len() as u64 + 1,
            source,
            text,
            at: Utc::now(),
        };
        self.log.push(line.clone());
        line
    }
}
