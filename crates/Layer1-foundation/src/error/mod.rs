//! Error types for BoxForge
//!
//! Every crate in the workspace reports failures through this enum.

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// BoxForge error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Request validation
    // ========================================================================
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    // ========================================================================
    // Lookups
    // ========================================================================
    #[error("Not found: {0}")]
    NotFound(String),

    // ========================================================================
    // Process execution
    // ========================================================================
    #[error("Launch failure: {0}")]
    LaunchFailure(String),

    #[error("Process failure (exit code {code}): {message}")]
    ProcessFailure { code: i32, message: String },

    #[error("Cancelled")]
    Cancelled,

    // ========================================================================
    // Settings & storage
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // External error conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // ========================================================================
    // Other
    // ========================================================================
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether the error text is safe and useful to show directly to a user
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Error::InvalidRequest(_)
                | Error::NotFound(_)
                | Error::LaunchFailure(_)
                | Error::ProcessFailure { .. }
                | Error::Cancelled
        )
    }

    /// ProcessFailure construction helper
    pub fn process_failure(code: i32, message: impl Into<String>) -> Self {
        Error::ProcessFailure {
            code,
            message: message.into(),
        }
    }
}

// ============================================================================
// From implementations (extra conversions)
// ============================================================================

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Internal(s)
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Internal(s.to_string())
    }
}
