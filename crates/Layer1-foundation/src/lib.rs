//! # boxforge-foundation
//!
//! Foundation layer for BoxForge:
//! - Error: central error taxonomy shared by every crate
//! - Settings: JSON settings storage under the user config dir
//! - HostEnv: sandbox detection and host command wrapping

pub mod error;
pub mod hostenv;
pub mod settings;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Settings
// ============================================================================
pub use settings::SettingsStore;

// ============================================================================
// Host environment
// ============================================================================
pub use hostenv::{HostEnv, Sandbox};
