//! Error handling module for postinstall
//!
//! Provides centralized error handling with proper error types using thiserror.
//! Every failure is logged with its operation and identifier before it is
//! turned into the short message shown to the user (`user_message`).

use thiserror::Error;

/// Main error type for postinstall
#[derive(Error, Debug)]
pub enum PostInstallError {
    /// Remote catalog or cache could not be read (always downgraded to a fallback)
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Malformed descriptor, catalog, address or template
    #[error("Validation error: {0}")]
    Validation(String),

    /// External tool (winget, netsh, reg, ...) not found on the system
    #[error("Tool not found: {0}")]
    ToolMissing(String),

    /// Operation needs an elevated (administrator) process
    #[error("Insufficient privilege: {0}")]
    PrivilegeDenied(String),

    /// External command exited with a non-success status
    #[error("{tool} failed (exit code {code}): {message}")]
    CommandFailed {
        tool: String,
        code: i32,
        message: String,
    },

    /// External command exceeded its time budget and was killed
    #[error("{tool} timed out after {secs}s")]
    Timeout { tool: String, secs: u64 },

    /// An install job is already running
    #[error("An installation is already in progress")]
    JobAlreadyRunning,

    /// An update check is already running
    #[error("An update check is already in progress")]
    UpdateCheckInProgress,

    /// Install requested with nothing selected
    #[error("Nothing selected for installation")]
    EmptySelection,

    /// Selection names an id that is not in the active catalog
    #[error("Unknown package id: {0}")]
    UnknownPackage(String),

    /// No connected network interface
    #[error("No active network interface found")]
    InterfaceNotFound,

    /// Job state machine rejected a transition
    #[error("Job transition error: {0}")]
    JobTransition(#[from] crate::install_state::JobTransitionError),

    /// HTTP errors while talking to the catalog source
    #[error("HTTP error: {0}")]
    Http(String),

    /// IO errors (file operations, process spawning)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for postinstall operations
pub type Result<T> = std::result::Result<T, PostInstallError>;

// Convenient error constructors
impl PostInstallError {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a source-unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create a privilege error
    pub fn privilege(msg: impl Into<String>) -> Self {
        Self::PrivilegeDenied(msg.into())
    }

    /// Create a command failure
    pub fn command_failed(tool: impl Into<String>, code: i32, message: impl Into<String>) -> Self {
        Self::CommandFailed {
            tool: tool.into(),
            code,
            message: message.into(),
        }
    }

    /// Timeouts are reported and handled exactly like command failures.
    pub fn is_command_failure(&self) -> bool {
        matches!(self, Self::CommandFailed { .. } | Self::Timeout { .. })
    }

    /// Short, actionable text for the presentation layer.
    pub fn user_message(&self) -> String {
        match self {
            Self::SourceUnavailable(_) => {
                "The package list could not be refreshed; using the saved list".to_string()
            }
            Self::ToolMissing(tool) => format!("{} was not found on this system", tool),
            Self::PrivilegeDenied(_) => {
                "Administrator rights are required. Re-run from an elevated terminal".to_string()
            }
            Self::Timeout { tool, secs } => format!("{} did not finish within {}s", tool, secs),
            Self::CommandFailed { message, .. } if !message.is_empty() => message.clone(),
            other => other.to_string(),
        }
    }
}
