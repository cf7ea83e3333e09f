use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    /// Initial state when the operation is added to a batch
    Pending,
    /// Selected by the scheduler and handed to a unit of work
    Queued,
    /// The external executor is working on it
    Running,
    /// Completed successfully
    Completed,
    /// Failed after exhausting retries, or force-failed on an unsatisfiable dependency
    Failed,
    /// Stopped by batch cancellation
    Cancelled,
    /// Explicitly skipped by the caller before dispatch
    Skipped,
}

impl OperationStatus {
    /// Check if this is a terminal state (no further transitions allowed)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::Cancelled | Self::Skipped
        )
    }

    /// Check if the operation has been handed to a unit of work
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Queued | Self::Running)
    }

    /// Only a completed operation satisfies its dependents
    pub fn satisfies_dependencies(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// Check whether a transition from this state to `next` is permitted
    pub fn can_transition_to(&self, next: OperationStatus) -> bool {
        use OperationStatus::*;
        match (self, next) {
            (Pending, Queued | Failed | Cancelled | Skipped) => true,
            (Queued, Running | Failed | Cancelled) => true,
            // Running -> Running is a retry attempt
            (Running, Running | Completed | Failed | Cancelled) => true,
            _ => false,
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Queued => write!(f, "queued"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl std::str::FromStr for OperationStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            "skipped" => Ok(Self::Skipped),
            _ => Err(format!("Invalid operation status: {s}")),
        }
    }
}

/// Batch lifecycle states mirroring the aggregate of its operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    /// Created, not yet submitted to the scheduler
    Pending,
    /// Being driven by the scheduler
    Running,
    /// Every operation finished without a failure
    Completed,
    /// Some operations succeeded and some failed
    Partial,
    /// No operation succeeded and at least one failed
    Failed,
    /// Execution was cancelled
    Cancelled,
}

impl BatchStatus {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Partial | Self::Failed | Self::Cancelled
        )
    }

    /// Derive the final status from success and failure counts
    pub fn from_counts(successful: usize, failed: usize) -> Self {
        if failed == 0 {
            Self::Completed
        } else if successful == 0 {
            Self::Failed
        } else {
            Self::Partial
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Partial => write!(f, "partial"),
            Self::Failed => write!(f, "failed"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl std::str::FromStr for BatchStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "partial" => Ok(Self::Partial),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid batch status: {s}")),
        }
    }
}
