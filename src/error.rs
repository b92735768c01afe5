//! Error types for the drill sandbox.
//!
//! These are *engine* errors. A submission that raises an exception or exits
//! non-zero is not an error here; it is carried in the outcome's exit code and
//! stderr instead.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur while validating or running a submission.
#[derive(Error, Debug)]
pub enum SandboxError {
    /// The wall-clock deadline fired before the child exited.
    #[error("execution timed out after {0:?}")]
    Timeout(Duration),

    /// The interpreter process could not be created or isolated.
    #[error("failed to launch interpreter: {0}")]
    Spawn(#[source] std::io::Error),

    /// The per-invocation scratch directory could not be created.
    #[error("failed to create scratch directory: {0}")]
    ScratchDir(#[source] std::io::Error),

    /// I/O error while talking to the child process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The submitted source exceeds the request length ceiling.
    #[error("submission is {len} characters, limit is {max}")]
    RequestTooLarge {
        /// Length of the submission in characters.
        len: usize,
        /// Configured ceiling in characters.
        max: usize,
    },

    /// Any other failure unrelated to the submitted code.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl SandboxError {
    /// Check if this error represents a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, SandboxError::Timeout(_))
    }
}

/// Result type alias for sandbox operations.
pub type Result<T> = std::result::Result<T, SandboxError>;
