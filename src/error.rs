//! # Scheduler Error Types
//!
//! Structured error handling for the batch scheduler using thiserror.
//!
//! Two layers live here:
//!
//! - [`SchedulerError`] is returned from the public API. Structural misuse
//!   (duplicate ids, unknown batches, executing a batch twice) surfaces
//!   immediately through it.
//! - [`OperationError`] is recorded on an individual operation when it ends
//!   `Failed` or `Cancelled`. It never propagates out of `execute`; it is
//!   carried in the batch result instead.

use crate::config::ConfigurationError;
use crate::models::{BatchId, OperationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Scheduler error taxonomy
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("Duplicate operation id: {operation_id}")]
    DuplicateId { operation_id: OperationId },

    #[error("Operation not found: {operation_id}")]
    OperationNotFound { operation_id: OperationId },

    #[error("Operation {operation_id} is running and cannot be modified")]
    OperationRunning { operation_id: OperationId },

    #[error("Batch not found: {batch_id}")]
    BatchNotFound { batch_id: BatchId },

    #[error("Batch already registered: {batch_id}")]
    DuplicateBatch { batch_id: BatchId },

    #[error("Batch {batch_id} is already running")]
    AlreadyRunning { batch_id: BatchId },

    #[error("Invalid priority {priority}: must be between 1 and 10")]
    InvalidPriority { priority: i32 },

    #[error("Invalid retry policy for operation {operation_id}: {reason}")]
    InvalidRetryPolicy {
        operation_id: OperationId,
        reason: String,
    },

    #[error("Dependency unsatisfied for operation {operation_id}: {reason}")]
    DependencyUnsatisfied {
        operation_id: OperationId,
        reason: String,
    },

    #[error("Executor error for operation {operation_id}: {message}")]
    Executor {
        operation_id: OperationId,
        message: String,
    },

    #[error("Operation {operation_id} timed out: {message}")]
    Timeout {
        operation_id: OperationId,
        message: String,
    },

    #[error("Operation {operation_id} could not resolve its elements: {message}")]
    ElementsNotFound {
        operation_id: OperationId,
        message: String,
    },

    #[error("Batch {batch_id} was cancelled")]
    Cancelled { batch_id: BatchId },

    #[error("Scheduler has been shut down")]
    ShutDown,

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal scheduler error: {message}")]
    Internal { message: String },
}

impl SchedulerError {
    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Structural errors are caller programming errors and are never retried
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::DuplicateId { .. }
                | Self::OperationNotFound { .. }
                | Self::OperationRunning { .. }
                | Self::BatchNotFound { .. }
                | Self::DuplicateBatch { .. }
                | Self::AlreadyRunning { .. }
                | Self::InvalidPriority { .. }
                | Self::InvalidRetryPolicy { .. }
        )
    }
}

impl From<ConfigurationError> for SchedulerError {
    fn from(err: ConfigurationError) -> Self {
        Self::Configuration {
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Classification of a per-operation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationErrorKind {
    /// A dependency failed, was cancelled, is missing or is part of a cycle
    DependencyUnsatisfied,
    /// The external executor returned an error (or panicked)
    Executor,
    /// The per-operation timeout elapsed
    Timeout,
    /// The batch was cancelled before or while the operation ran
    Cancelled,
    /// One or more target elements could not be resolved
    ElementsNotFound,
}

impl OperationErrorKind {
    /// Whether a failure of this kind is subject to the retry policy
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Executor | Self::Timeout)
    }
}

impl fmt::Display for OperationErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyUnsatisfied => write!(f, "dependency_unsatisfied"),
            Self::Executor => write!(f, "executor_error"),
            Self::Timeout => write!(f, "timeout"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ElementsNotFound => write!(f, "elements_not_found"),
        }
    }
}

/// Error recorded on an operation's terminal transition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationError {
    pub kind: OperationErrorKind,
    pub message: String,
}

impl OperationError {
    pub fn new(kind: OperationErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn dependency_unsatisfied(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::DependencyUnsatisfied, message)
    }

    pub fn executor(message: impl Into<String>) -> Self {
        Self::new(OperationErrorKind::Executor, message)
    }

    pub fn timeout(timeout: Duration) -> Self {
        Self::new(
            OperationErrorKind::Timeout,
            format!("operation timed out after {}ms", timeout.as_millis()),
        )
    }

    pub fn cancelled() -> Self {
        Self::new(OperationErrorKind::Cancelled, "batch cancelled")
    }

    pub fn elements_not_found(missing: &[String]) -> Self {
        Self::new(
            OperationErrorKind::ElementsNotFound,
            format!("unresolved target elements: {}", missing.join(", ")),
        )
    }

    pub fn is_retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Lift a recorded failure into the crate-level error taxonomy
    pub fn into_scheduler_error(
        self,
        batch_id: BatchId,
        operation_id: OperationId,
    ) -> SchedulerError {
        let message = self.message;
        match self.kind {
            OperationErrorKind::DependencyUnsatisfied => SchedulerError::DependencyUnsatisfied {
                operation_id,
                reason: message,
            },
            OperationErrorKind::Executor => SchedulerError::Executor {
                operation_id,
                message,
            },
            OperationErrorKind::Timeout => SchedulerError::Timeout {
                operation_id,
                message,
            },
            OperationErrorKind::ElementsNotFound => SchedulerError::ElementsNotFound {
                operation_id,
                message,
            },
            OperationErrorKind::Cancelled => SchedulerError::Cancelled { batch_id },
        }
    }
}

impl fmt::Display for OperationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors_are_flagged() {
        let id = OperationId::new();
        assert!(SchedulerError::DuplicateId { operation_id: id }.is_structural());
        assert!(SchedulerError::InvalidPriority { priority: 11 }.is_structural());
        assert!(!SchedulerError::ShutDown.is_structural());
        assert!(!OperationError::executor("boom")
            .into_scheduler_error(BatchId::new(), id)
            .is_structural());
    }

    #[test]
    fn test_operation_errors_map_onto_scheduler_errors() {
        let batch_id = BatchId::new();
        let operation_id = OperationId::new();

        assert_eq!(
            OperationError::executor("disk full").into_scheduler_error(batch_id, operation_id),
            SchedulerError::Executor {
                operation_id,
                message: "disk full".to_string(),
            }
        );
        assert_eq!(
            OperationError::dependency_unsatisfied("upstream failed")
                .into_scheduler_error(batch_id, operation_id),
            SchedulerError::DependencyUnsatisfied {
                operation_id,
                reason: "upstream failed".to_string(),
            }
        );
        assert!(matches!(
            OperationError::timeout(Duration::from_millis(250))
                .into_scheduler_error(batch_id, operation_id),
            SchedulerError::Timeout { message, .. } if message.contains("250ms")
        ));
        assert_eq!(
            OperationError::cancelled().into_scheduler_error(batch_id, operation_id),
            SchedulerError::Cancelled { batch_id }
        );
    }

    #[test]
    fn test_operation_error_retryability() {
        assert!(OperationError::executor("io").is_retryable());
        assert!(OperationError::timeout(Duration::from_millis(5)).is_retryable());
        assert!(!OperationError::cancelled().is_retryable());
        assert!(!OperationError::dependency_unsatisfied("cycle").is_retryable());
        assert!(!OperationError::elements_not_found(&["a".to_string()]).is_retryable());
    }

    #[test]
    fn test_operation_error_display() {
        let err = OperationError::elements_not_found(&["e1".to_string(), "e2".to_string()]);
        assert_eq!(
            err.to_string(),
            "elements_not_found: unresolved target elements: e1, e2"
        );
    }
}
