//! # boxforge-task
//!
//! Task orchestration for BoxForge.
//! Turns container operations into tracked, cancellable background tasks
//! driving the external container tool.
//!
//! ## Features
//!
//! - Concurrent task execution, one external process per task
//! - Append-only per-task logs streamed line by line
//! - Lifecycle events over broadcast channels and observers
//! - Cooperative cancellation with a bounded kill escalation
//! - Container and exportable-app inventory queries
//! - Known-distribution detection from image URLs

pub mod distro;
pub mod engine;
pub mod events;
pub mod inventory;
pub mod op;
mod runner;
pub mod status;
pub mod task;

// Engine
pub use engine::{EngineConfig, TaskEngine};

// Model
pub use op::{OpKind, Operation, PackageKind};
pub use status::TaskStatus;
pub use task::{CancelReason, ExitInfo, LogLine, LogSource, Task, TaskId};

// Events
pub use events::{ObserverId, TaskEvent, TaskEvents, TaskObserver};

// Inventory
pub use distro::{DistroInfo, PackageManager, KNOWN_DISTROS};
pub use inventory::{ContainerInfo, ExportableApp};
