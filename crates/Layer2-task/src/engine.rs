//! Task Engine - accepts container operations and runs them concurrently
//!
//! Features:
//! - Tracks every submitted operation as a [`Task`] with status and log
//! - Runs any number of tasks concurrently, one external process each
//! - Cooperative cancellation with a bounded kill escalation
//! - Lifecycle events over broadcast channels and registered observers
//! - Inventory queries against the external tool
//!
//! The engine is cheap to clone; clones share all state.

use crate::events::{ObserverId, TaskEvent, TaskEvents, TaskObserver};
use crate::inventory::{self, ContainerInfo, ExportableApp};
use crate::op::Operation;
use crate::runner::CancelSignal;
use crate::status::TaskStatus;
use crate::task::{CancelReason, ExitInfo, LogSource, Task, TaskId};
use boxforge_foundation::{Error, Result};
use std::collections::HashMap;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

/// Poll interval for [`TaskEngine::wait`]
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(25);

// ============================================================================
// Configuration
// ============================================================================

/// Task engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// External container tool executable
    pub tool: String,

    /// Time between the termination signal and the forced kill
    pub grace_period: Duration,

    /// Broadcast channel capacity for streaming subscribers
    pub channel_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tool: "distrobox".to_string(),
            grace_period: Duration::from_secs(5),
            channel_capacity: crate::events::DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

impl EngineConfig {
    /// Set the external tool executable
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Set the cancellation grace period
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }
}

// ============================================================================
// Run Handles
// ============================================================================

/// Handle to the run unit of an active task
pub(crate) struct RunHandle {
    /// Cancellation signal shared with the run unit
    pub(crate) cancel: Arc<CancelSignal>,

    /// Join handle of the run unit
    pub(crate) join: tokio::task::JoinHandle<()>,
}

// ============================================================================
// Task Engine
// ============================================================================

/// Task Engine - turns container operations into tracked concurrent tasks
#[derive(Clone)]
pub struct TaskEngine {
    /// All known tasks by ID
    pub(crate) tasks: Arc<RwLock<HashMap<TaskId, Task>>>,

    /// Run handles of tasks that are pending or running
    pub(crate) running: Arc<Mutex<HashMap<TaskId, RunHandle>>>,

    /// Lifecycle event fan-out
    pub(crate) events: Arc<TaskEvents>,

    /// Engine configuration
    pub(crate) config: Arc<EngineConfig>,
}

impl TaskEngine {
    pub fn new(config: EngineConfig) -> Self {
        let events = Arc::new(TaskEvents::with_capacity(config.channel_capacity));
        Self {
            tasks: Arc::new(RwLock::new(HashMap::new())),
            running: Arc::new(Mutex::new(HashMap::new())),
            events,
            config: Arc::new(config),
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Submission and Cancellation
    // ========================================================================

    /// Validate an operation and start executing it in the background.
    ///
    /// Returns as soon as the task is tracked; progress is reported through
    /// events and the task log.
    pub async fn submit(&self, op: Operation) -> Result<TaskId> {
        op.validate()?;

        let task = Task::new(op);
        let id = task.id;
        let kind_name = task.kind().display_name();
        let snapshot = task.clone();
        {
            let mut tasks = self.tasks.write().await;
            tasks.insert(id, task);
        }
        self.events.publish(TaskEvent::Created(snapshot)).await;
        info!("Submitted task {} ({})", id, kind_name);

        // The run unit removes its own handle when it finishes. Holding the
        // lock across spawn means that removal cannot race the insert.
        {
            let mut running = self.running.lock().await;
            let cancel = Arc::new(CancelSignal::new());
            let join = tokio::spawn(self.clone().run_unit(id, Arc::clone(&cancel)));
            running.insert(id, RunHandle { cancel, join });
        }

        Ok(id)
    }

    /// Request cancellation of a task.
    ///
    /// A pending task is cancelled immediately and never starts. A running
    /// task is asked to terminate; the status changes once the process is
    /// gone, which the caller can await through events or [`wait`].
    /// Cancelling a finished task is a no-op.
    ///
    /// [`wait`]: TaskEngine::wait
    pub async fn cancel(&self, id: TaskId) -> Result<()> {
        let was_pending = {
            let mut tasks = self.tasks.write().await;
            let task = tasks
                .get_mut(&id)
                .ok_or_else(|| Error::NotFound(format!("task {} not found", id)))?;
            match task.status {
                TaskStatus::Pending => {
                    task.finish(
                        TaskStatus::Cancelled,
                        ExitInfo::Cancelled(CancelReason::BeforeStart),
                    );
                    true
                }
                TaskStatus::Running => false,
                _ => return Ok(()),
            }
        };

        if was_pending {
            self.events
                .publish(TaskEvent::StatusChanged {
                    id,
                    from: TaskStatus::Pending,
                    to: TaskStatus::Cancelled,
                })
                .await;
            info!("Cancelled task {} before start", id);
            return Ok(());
        }

        let cancel = {
            let running = self.running.lock().await;
            running.get(&id).map(|handle| Arc::clone(&handle.cancel))
        };
        if let Some(cancel) = cancel {
            info!("Requested termination of task {}", id);
            cancel.request();
        }
        Ok(())
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Get a snapshot of a task
    pub async fn get(&self, id: TaskId) -> Result<Task> {
        let tasks = self.tasks.read().await;
        tasks
            .get(&id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("task {} not found", id)))
    }

    /// Snapshots of all pending and running tasks, oldest first
    pub async fn list_active(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut active: Vec<Task> = tasks
            .values()
            .filter(|task| task.is_active())
            .cloned()
            .collect();
        active.sort_by_key(|task| task.created_at);
        active
    }

    /// Snapshots of every known task, oldest first
    pub async fn list_all(&self) -> Vec<Task> {
        let tasks = self.tasks.read().await;
        let mut all: Vec<Task> = tasks.values().cloned().collect();
        all.sort_by_key(|task| task.created_at);
        all
    }

    /// Remove every finished task. Returns how many were removed.
    pub async fn clear_ended(&self) -> usize {
        let mut removed: Vec<(TaskId, chrono::DateTime<chrono::Utc>)> = {
            let mut tasks = self.tasks.write().await;
            let ended: Vec<(TaskId, chrono::DateTime<chrono::Utc>)> = tasks
                .iter()
                .filter(|(_, task)| task.status.is_terminal())
                .map(|(id, task)| (*id, task.created_at))
                .collect();
            for (id, _) in &ended {
                tasks.remove(id);
            }
            ended
        };
        removed.sort_by_key(|(_, created_at)| *created_at);

        for (id, _) in &removed {
            self.events.publish(TaskEvent::Removed { id: *id }).await;
        }
        if !removed.is_empty() {
            debug!("Cleared {} ended tasks", removed.len());
        }
        removed.len()
    }

    /// Block until a task reaches a terminal status, returning the final
    /// snapshot
    pub async fn wait(&self, id: TaskId) -> Result<Task> {
        loop {
            let task = self.get(id).await?;
            if task.status.is_terminal() {
                return Ok(task);
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// Open a streaming event subscription
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.events.subscribe()
    }

    /// Register an observer for lifecycle callbacks
    pub async fn attach(&self, observer: Arc<dyn TaskObserver>) -> ObserverId {
        self.events.attach(observer).await
    }

    /// Unregister an observer
    pub async fn detach(&self, id: ObserverId) -> bool {
        self.events.detach(id).await
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Cancel all active tasks and wait until every run unit has finished.
    ///
    /// Pending tasks are cancelled without starting; running tasks go through
    /// the normal terminate-then-kill sequence. All tasks are terminal when
    /// this returns.
    pub async fn shutdown(&self) {
        info!("Shutting down task engine");

        let cancelled_pending: Vec<TaskId> = {
            let mut tasks = self.tasks.write().await;
            let mut cancelled = Vec::new();
            for (id, task) in tasks.iter_mut() {
                if task.status.is_pending() {
                    task.finish(
                        TaskStatus::Cancelled,
                        ExitInfo::Cancelled(CancelReason::Shutdown),
                    );
                    cancelled.push(*id);
                }
            }
            cancelled
        };
        for id in &cancelled_pending {
            self.events
                .publish(TaskEvent::StatusChanged {
                    id: *id,
                    from: TaskStatus::Pending,
                    to: TaskStatus::Cancelled,
                })
                .await;
        }

        let handles: Vec<(TaskId, RunHandle)> = {
            let mut running = self.running.lock().await;
            running.drain().collect()
        };
        for (_, handle) in &handles {
            handle.cancel.request_shutdown();
        }
        for (id, handle) in handles {
            if let Err(e) = handle.join.await {
                warn!("Run unit for task {} panicked: {}", id, e);
            }
        }

        info!("Task engine shut down");
    }

    // ========================================================================
    // Detached Sessions
    // ========================================================================

    /// Launch an interactive command detached from the engine.
    ///
    /// Used for terminal sessions: the process gets its own process group,
    /// is never tracked as a task and outlives this program.
    pub fn spawn_session(&self, argv: Vec<String>) -> Result<()> {
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| Error::InvalidRequest("launch command is empty".to_string()))?;

        let mut command = std::process::Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            command.process_group(0);
        }
        let mut child = command
            .spawn()
            .map_err(|e| Error::LaunchFailure(format!("failed to launch {}: {}", program, e)))?;

        // Reap the session when it exits; a dropped Child is never waited
        // on and would linger as a zombie for the life of this process.
        std::thread::spawn(move || {
            let _ = child.wait();
        });

        info!("Spawned detached session: {}", program);
        Ok(())
    }

    // ========================================================================
    // Inventory
    // ========================================================================

    /// List containers known to the external tool
    pub async fn list_containers(&self) -> Result<Vec<ContainerInfo>> {
        let output = inventory::run_capture(&self.config.tool, &["ls", "--no-color"]).await?;
        Ok(inventory::parse_container_list(&output))
    }

    /// List the applications of a container that can be exported to the host
    pub async fn list_exportable_apps(&self, container: &str) -> Result<Vec<ExportableApp>> {
        if container.is_empty() {
            return Err(Error::InvalidRequest(
                "container name cannot be empty".to_string(),
            ));
        }
        let script = inventory::exportable_apps_script(container);
        let args = ["enter", container, "--", "sh", "-c", script.as_str()];
        let output = inventory::run_capture(&self.config.tool, &args).await?;
        let home = std::env::var("HOME").unwrap_or_default();
        Ok(inventory::parse_exportable_apps(&output, container, &home))
    }

    // ========================================================================
    // Internal
    // ========================================================================

    /// Mark a pending task as running and publish the transition.
    ///
    /// Returns false when the task is no longer pending, which means a
    /// cancellation won the race and the caller must not start the process.
    pub(crate) async fn mark_running(&self, id: TaskId) -> bool {
        let marked = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&id) {
                Some(task) if task.status.is_pending() => {
                    task.start();
                    true
                }
                _ => false,
            }
        };
        if marked {
            self.events
                .publish(TaskEvent::StatusChanged {
                    id,
                    from: TaskStatus::Pending,
                    to: TaskStatus::Running,
                })
                .await;
        }
        marked
    }

    /// Append a line to a running task log and publish it
    pub(crate) async fn append_log(&self, id: TaskId, source: LogSource, text: String) {
        let line = {
            let mut tasks = self.tasks.write().await;
            match tasks.get_mut(&id) {
                Some(task) if task.status.is_running() => Some(task.append_line(source, text)),
                _ => None,
            }
        };
        if let Some(line) = line {
            self.events.publish(TaskEvent::LogAppended { id, line }).await;
        }
    }

    /// Record a terminal status for a task and publish the transition
    pub(crate) async fn finish_task(&self, id: TaskId, status: TaskStatus, exit: ExitInfo) {
        let from = {
            let mut tasks = self.tasks.write().await;
            let Some(task) = tasks.get_mut(&id) else {
                return;
            };
            if !task.status.can_transition_to(status) {
                warn!(
                    "Ignoring transition {} -> {} for task {}",
                    task.status, status, id
                );
                return;
            }
            let from = task.status;
            task.finish(status, exit);
            from
        };
        self.events
            .publish(TaskEvent::StatusChanged {
                id,
                from,
                to: status,
            })
            .await;
        debug!("Task {} finished: {}", id, status);
    }

    /// Drop the run handle of a finished task
    pub(crate) async fn remove_run_handle(&self, id: TaskId) {
        let mut running = self.running.lock().await;
        running.remove(&id);
    }
}

impl Default for TaskEngine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
