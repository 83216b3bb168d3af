//! Error types for the framegate isolation runtime.
//!
//! This module defines the `FramegateError` enum covering all error conditions
//! that can occur during event queueing, worker dispatch, thread pool
//! execution, and asynchronous file operations.
//!
//! It also provides helper methods to construct errors and to classify them
//! for the retry engine.
use thiserror::Error;

use crate::fileio::validation::PathValidationError;

/// Represents all possible errors in the framegate runtime.
///
/// Each variant provides specific context to facilitate debugging and to let
/// the retry engine distinguish transient faults from permanent ones.
///
/// # Examples
///
/// ```rust
/// use framegate::error::{FramegateError, FramegateResult};
///
/// fn example() -> FramegateResult<()> {
///     Err(FramegateError::QueueFull {
///         queue: "high".to_string(),
///     })
/// }
/// ```
#[derive(Error, Debug)]
pub enum FramegateError {
    /// I/O operation failed during file system access.
    ///
    /// This variant wraps `std::io::Error` and is the main transient
    /// category: sharing violations, interrupted syscalls, and device
    /// hiccups all surface here and are eligible for retry.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error due to invalid or missing settings.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Path rejected before the operation touched the file system.
    ///
    /// Carries the specific validation rule that failed. Never retried.
    #[error("Path validation failed: {0}")]
    Validation(#[from] PathValidationError),

    /// The file or directory does not exist and the operation requires it.
    #[error("File not found: {0}")]
    FileNotFound(String),

    /// Indicates that a file operation failed because the target exists
    /// and overwrite was not requested.
    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    /// The operation was cancelled through its cancellation handle.
    ///
    /// Cleanup side effects (backup restore, partial-destination removal)
    /// have already been applied when this is returned.
    #[error("Operation cancelled: {operation_id}")]
    Cancelled {
        /// Identifier of the cancelled operation
        operation_id: String,
    },

    /// The operation exceeded its deadline.
    #[error("Operation timed out after {elapsed_ms} ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out
        operation: String,
        /// Wall-clock time spent before giving up, in milliseconds
        elapsed_ms: u64,
    },

    /// An event could not be enqueued because the target queue is at
    /// capacity. Soft failure: the caller decides whether to drop, retry,
    /// or escalate.
    #[error("Queue full: {queue}")]
    QueueFull {
        /// Name of the queue that rejected the event
        queue: String,
    },

    /// A worker failed to process an event.
    #[error("Event processing failed [{event_id}]: {message}")]
    EventProcessing {
        /// Identifier of the failed event
        event_id: String,
        /// Description of the failure
        message: String,
    },

    /// The dedicated I/O thread pool rejected a task or a task died on it.
    #[error("I/O thread pool error: {message}")]
    ThreadPool {
        /// Description of the thread pool failure
        message: String,
    },

    /// A subsystem could not be constructed. Thrown at construction time
    /// only; never returned from a running operation.
    #[error("Initialization failed: {message}")]
    Initialization {
        /// Description of the initialization failure
        message: String,
    },

    /// Catch-all error variant wrapping any other failure.
    #[error("Unknown error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Specialized `Result` type for framegate operations.
pub type FramegateResult<T> = Result<T, FramegateError>;

impl FramegateError {
    /// Create a configuration error with the given message.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use framegate::error::FramegateError;
    /// let err = FramegateError::config("invalid setting");
    /// assert_eq!(err.to_string(), "Configuration error: invalid setting");
    /// ```
    pub fn config<S: Into<String>>(message: S) -> Self {
        FramegateError::Config {
            message: message.into(),
        }
    }

    /// Create a cancelled-operation error for the given operation id.
    pub fn cancelled<S: Into<String>>(operation_id: S) -> Self {
        FramegateError::Cancelled {
            operation_id: operation_id.into(),
        }
    }

    /// Create a timeout error for the given operation and elapsed time.
    pub fn timeout<S: Into<String>>(operation: S, elapsed: std::time::Duration) -> Self {
        FramegateError::Timeout {
            operation: operation.into(),
            elapsed_ms: elapsed.as_millis() as u64,
        }
    }

    /// Create an event processing error with event id and reason.
    pub fn event_processing<S1, S2>(event_id: S1, message: S2) -> Self
    where
        S1: Into<String>,
        S2: Into<String>,
    {
        FramegateError::EventProcessing {
            event_id: event_id.into(),
            message: message.into(),
        }
    }

    /// Create a thread pool error with the given message.
    pub fn thread_pool<S: Into<String>>(message: S) -> Self {
        FramegateError::ThreadPool {
            message: message.into(),
        }
    }

    /// Create an initialization error with the given message.
    pub fn initialization<S: Into<String>>(message: S) -> Self {
        FramegateError::Initialization {
            message: message.into(),
        }
    }

    /// Whether the retry engine may re-attempt the failed operation.
    ///
    /// Only genuinely transient faults qualify: raw I/O errors that are not
    /// definitive (`NotFound`, `PermissionDenied`) and timeouts. Validation
    /// failures, cancellations, and capacity rejections never retry.
    pub fn is_transient(&self) -> bool {
        match self {
            FramegateError::Io(e) => !matches!(
                e.kind(),
                std::io::ErrorKind::NotFound
                    | std::io::ErrorKind::PermissionDenied
                    | std::io::ErrorKind::InvalidInput
            ),
            FramegateError::Timeout { .. } => true,
            FramegateError::ThreadPool { .. } => true,
            _ => false,
        }
    }

    /// Whether this error is a cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FramegateError::Cancelled { .. })
    }
}

// Unit test: FramegateError error types and helper methods
#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_error_creation() {
        let error = FramegateError::config("test config error");
        assert!(matches!(error, FramegateError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: test config error");
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let err: FramegateError = io_error.into();
        assert!(matches!(err, FramegateError::Io(_)));
    }

    #[test]
    fn test_timeout_error_carries_elapsed() {
        let err = FramegateError::timeout("read", std::time::Duration::from_millis(1500));
        match err {
            FramegateError::Timeout { elapsed_ms, .. } => assert_eq!(elapsed_ms, 1500),
            _ => panic!("expected timeout variant"),
        }
    }

    #[test]
    fn test_transience_classification() {
        let transient: FramegateError = io::Error::new(io::ErrorKind::TimedOut, "slow disk").into();
        assert!(transient.is_transient());

        let not_found: FramegateError = io::Error::new(io::ErrorKind::NotFound, "gone").into();
        assert!(!not_found.is_transient());

        let denied: FramegateError =
            io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(!denied.is_transient());

        assert!(!FramegateError::cancelled("op-1").is_transient());
        assert!(
            !FramegateError::QueueFull {
                queue: "high".into()
            }
            .is_transient()
        );
        assert!(FramegateError::timeout("lock", std::time::Duration::from_secs(1)).is_transient());
    }

    #[test]
    fn test_cancelled_helper() {
        let err = FramegateError::cancelled("op-42");
        assert!(err.is_cancelled());
        assert_eq!(err.to_string(), "Operation cancelled: op-42");
    }
}
