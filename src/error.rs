//! Error taxonomy
//!
//! Typed errors for the browser session, the step interpreter, and the
//! server registry. Session operations attach the underlying message;
//! the interpreter wraps the first failure into [`ToolExecutionError`]
//! with the failing tool's name and stops.

use thiserror::Error;

/// Errors raised by browser-session operations
#[derive(Debug, Error)]
pub enum SessionError {
    /// No browser binary or driver could be obtained, or the session
    /// could not launch. Fatal to application start.
    #[error("Session setup failed: {0}")]
    Setup(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Script execution failed: {0}")]
    Script(String),

    /// Host-side code raised or produced no usable output.
    #[error("Code execution failed: {0}")]
    Execution(String),

    #[error("Timed out after {timeout_secs}s waiting for element '{selector}'")]
    Timeout { selector: String, timeout_secs: u64 },
}

/// A step failed during a tool run. Wraps the originating session error
/// and names the tool; remaining steps were not executed.
#[derive(Debug, Error)]
#[error("Tool '{tool}' failed: {source}")]
pub struct ToolExecutionError {
    pub tool: String,
    #[source]
    pub source: SessionError,
}

/// Errors raised by server-registry operations
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("A server named '{0}' already exists")]
    DuplicateName(String),

    /// Configuration absent or unreadable (malformed files are reported
    /// here too, with the parse failure as the reason).
    #[error("Server '{name}' not found: {reason}")]
    NotFound { name: String, reason: String },

    #[error("Tool '{0}' not found")]
    ToolNotFound(String),

    #[error("Invalid server name '{0}'")]
    InvalidName(String),

    #[error("Registry I/O error: {0}")]
    Io(#[from] std::io::Error),
}
