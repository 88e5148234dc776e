//! Task lifecycle events
//!
//! Two delivery paths from one publish call:
//! - a broadcast channel for `select!`-friendly streaming consumers
//! - registered observers whose callbacks are awaited inline, so a slow
//!   observer back-pressures the publisher instead of losing events
//!
//! Events for one task are published sequentially, so both paths see them
//! in the order they happened.

use crate::status::TaskStatus;
use crate::task::{LogLine, Task, TaskId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, trace};

/// Default broadcast channel capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

// ============================================================================
// Events
// ============================================================================

/// Task lifecycle event
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// A task was accepted by the engine
    Created(Task),

    /// A line was appended to a task log
    LogAppended { id: TaskId, line: LogLine },

    /// A task moved along one edge of the status machine
    StatusChanged {
        id: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    /// A finished task was removed from the engine
    Removed { id: TaskId },
}

impl TaskEvent {
    /// Task this event concerns
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Created(task) => task.id,
            TaskEvent::LogAppended { id, .. }
            | TaskEvent::StatusChanged { id, .. }
            | TaskEvent::Removed { id } => *id,
        }
    }
}

// ============================================================================
// Observers
// ============================================================================

/// Unique identifier for a registered observer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

impl std::fmt::Display for ObserverId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "observer-{}", self.0)
    }
}

/// Receiver of task lifecycle callbacks.
///
/// All methods default to no-ops so an observer only implements what it
/// cares about.
#[async_trait]
pub trait TaskObserver: Send + Sync {
    /// Observer name for diagnostics
    fn name(&self) -> &str;

    async fn on_task_created(&self, _task: &Task) {}

    async fn on_log_appended(&self, _id: TaskId, _line: &LogLine) {}

    async fn on_status_changed(&self, _id: TaskId, _from: TaskStatus, _to: TaskStatus) {}

    async fn on_task_removed(&self, _id: TaskId) {}
}

// ============================================================================
// Event Fan-out
// ============================================================================

/// Fan-out point for task lifecycle events
pub struct TaskEvents {
    /// Broadcast channel for streaming subscribers
    sender: broadcast::Sender<TaskEvent>,

    /// Registered observers by ID
    observers: RwLock<HashMap<ObserverId, Arc<dyn TaskObserver>>>,

    /// Counter for observer IDs
    observer_counter: AtomicU64,

    /// Total events published
    event_count: AtomicU64,
}

impl TaskEvents {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            observers: RwLock::new(HashMap::new()),
            observer_counter: AtomicU64::new(0),
            event_count: AtomicU64::new(0),
        }
    }

    /// Open a streaming subscription.
    ///
    /// The channel is bounded; a subscriber that falls behind sees a lag
    /// error instead of stalling the engine.
    pub fn subscribe(&self) -> broadcast::Receiver<TaskEvent> {
        self.sender.subscribe()
    }

    /// Register an observer
    pub async fn attach(&self, observer: Arc<dyn TaskObserver>) -> ObserverId {
        let id = ObserverId(self.observer_counter.fetch_add(1, Ordering::SeqCst));
        debug!("Attaching {} ({})", id, observer.name());
        self.observers.write().await.insert(id, observer);
        id
    }

    /// Unregister an observer. Returns false if the ID is unknown.
    pub async fn detach(&self, id: ObserverId) -> bool {
        let removed = self.observers.write().await.remove(&id).is_some();
        if removed {
            debug!("Detached {}", id);
        }
        removed
    }

    /// Number of registered observers
    pub async fn observer_count(&self) -> usize {
        self.observers.read().await.len()
    }

    /// Total events published so far
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    /// Publish one event to the channel and to every observer
    pub async fn publish(&self, event: TaskEvent) {
        self.event_count.fetch_add(1, Ordering::SeqCst);
        trace!("Publishing event for task {}", event.task_id());

        // Streaming side; no receivers is fine
        let _ = self.sender.send(event.clone());

        // Observer side, awaited so delivery order matches publish order
        let observers = self.observers.read().await;
        for observer in observers.values() {
            match &event {
                TaskEvent::Created(task) => observer.on_task_created(task).await,
                TaskEvent::LogAppended { id, line } => {
                    observer.on_log_appended(*id, line).await
                }
                TaskEvent::StatusChanged { id, from, to } => {
                    observer.on_status_changed(*id, *from, *to).await
                }
                TaskEvent::Removed { id } => observer.on_task_removed(*id).await,
            }
        }
    }
}

impl Default for TaskEvents {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::op::Operation;
    use tokio::sync::Mutex;

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                seen: Mutex::new(Vec::new()),
            })
        }

        async fn snapshot(&self) -> Vec<String> {
            self.seen.lock().await.clone()
        }
    }

    #[async_trait]
    impl TaskObserver for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn on_task_created(&self, task: &Task) {
            self.seen.lock().await.push(format!("created:{}", task.id));
        }

        async fn on_log_appended(&self, _id: TaskId, line: &LogLine) {
            self.seen.lock().await.push(format!("log:{}", line.seq));
        }

        async fn on_status_changed(&self, _id: TaskId, from: TaskStatus, to: TaskStatus) {
            self.seen
                .lock()
                .await
                .push(format!("status:{}->{}", from, to));
        }

        async fn on_task_removed(&self, id: TaskId) {
            self.seen.lock().await.push(format!("removed:{}", id));
        }
    }

    fn sample_task() -> Task {
        Task::new(Operation::UpgradeAll)
    }

    #[tokio::test]
    async fn test_observer_receives_events_in_publish_order() {
        let events = TaskEvents::new();
        let recorder = Recorder::new();
        events.attach(recorder.clone()).await;

        let mut task = sample_task();
        let id = task.id;
        events.publish(TaskEvent::Created(task.clone())).await;
        events
            .publish(TaskEvent::StatusChanged {
                id,
                from: TaskStatus::Pending,
                to: TaskStatus::Running,
            })
            .await;
        let line = task.append_line(crate::task::LogSource::Stdout, "hello".to_string());
        events.publish(TaskEvent::LogAppended { id, line }).await;
        events.publish(TaskEvent::Removed { id }).await;

        let seen = recorder.snapshot().await;
        assert_eq!(
            seen,
            vec![
                format!("created:{}", id),
                "status:Pending->Running".to_string(),
                "log:1".to_string(),
                format!("removed:{}", id),
            ]
        );
        assert_eq!(events.event_count(), 4);
    }

    #[tokio::test]
    async fn test_detach_stops_delivery() {
        let events = TaskEvents::new();
        let recorder = Recorder::new();
        let id = events.attach(recorder.clone()).await;
        assert_eq!(events.observer_count().await, 1);

        events.publish(TaskEvent::Created(sample_task())).await;
        assert!(events.detach(id).await);
        assert!(!events.detach(id).await);
        events.publish(TaskEvent::Created(sample_task())).await;

        assert_eq!(recorder.snapshot().await.len(), 1);
        assert_eq!(events.observer_count().await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_subscription_sees_events() {
        let events = TaskEvents::new();
        let mut rx = events.subscribe();

        let task = sample_task();
        let id = task.id;
        events.publish(TaskEvent::Created(task)).await;
        events
            .publish(TaskEvent::StatusChanged {
                id,
                from: TaskStatus::Pending,
                to: TaskStatus::Cancelled,
            })
            .await;

        assert!(matches!(rx.recv().await.unwrap(), TaskEvent::Created(_)));
        match rx.recv().await.unwrap() {
            TaskEvent::StatusChanged { to, .. } => assert_eq!(to, TaskStatus::Cancelled),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_consumers_is_fine() {
        let events = TaskEvents::new();
        events.publish(TaskEvent::Created(sample_task())).await;
        assert_eq!(events.event_count(), 1);
    }
}
