//! Error types for Timegate.

use thiserror::Error;

/// Main error type for Timegate operations.
#[derive(Error, Debug)]
pub enum TimegateError {
    /// The acquire was aborted by its cancel signal before a slot was obtained
    #[error("Acquire cancelled")]
    Cancelled,

    /// The limiter has been closed
    #[error("Limiter is closed")]
    Closed,

    /// Capacity outside of `1..=Semaphore::MAX_PERMITS`
    #[error("Invalid capacity {0}: must be between 1 and {}", tokio::sync::Semaphore::MAX_PERMITS)]
    InvalidCapacity(usize),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A spawned job task failed to complete
    #[error("Task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl TimegateError {
    /// Whether this error came from a cancel signal.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TimegateError::Cancelled)
    }
}

/// Result type alias for Timegate operations.
pub type Result<T> = std::result::Result<T, TimegateError>;
