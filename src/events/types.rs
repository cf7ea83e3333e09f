//! Event payloads.

use crate::constants::events;
use crate::error::OperationError;
use crate::models::{BatchId, BatchResult, OperationId};
use crate::orchestration::ProgressSnapshot;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle event for a batch or one of its operations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BatchEvent {
    BatchStarted {
        batch_id: BatchId,
        batch_name: String,
        total: usize,
        started_at: DateTime<Utc>,
    },
    OperationDispatched {
        batch_id: BatchId,
        operation_id: OperationId,
    },
    OperationStarted {
        batch_id: BatchId,
        operation_id: OperationId,
        attempt: u32,
    },
    OperationRetrying {
        batch_id: BatchId,
        operation_id: OperationId,
        attempt: u32,
        delay_ms: u64,
        error: OperationError,
    },
    OperationCompleted {
        batch_id: BatchId,
        operation_id: OperationId,
        attempts: u32,
        duration_ms: u64,
    },
    OperationFailed {
        batch_id: BatchId,
        operation_id: OperationId,
        attempts: u32,
        error: OperationError,
    },
    OperationCancelled {
        batch_id: BatchId,
        operation_id: OperationId,
    },
    Progress(ProgressSnapshot),
    BatchCompleted(BatchResult),
}

impl BatchEvent {
    /// Dotted event name, e.g. `operation.completed`
    pub fn name(&self) -> &'static str {
        match self {
            Self::BatchStarted { .. } => events::BATCH_STARTED,
            Self::OperationDispatched { .. } => events::OPERATION_DISPATCHED,
            Self::OperationStarted { .. } => events::OPERATION_STARTED,
            Self::OperationRetrying { .. } => events::OPERATION_RETRYING,
            Self::OperationCompleted { .. } => events::OPERATION_COMPLETED,
            Self::OperationFailed { .. } => events::OPERATION_FAILED,
            Self::OperationCancelled { .. } => events::OPERATION_CANCELLED,
            Self::Progress(_) => events::BATCH_PROGRESS,
            Self::BatchCompleted(_) => events::BATCH_COMPLETED,
        }
    }

    pub fn batch_id(&self) -> BatchId {
        match self {
            Self::BatchStarted { batch_id, .. }
            | Self::OperationDispatched { batch_id, .. }
            | Self::OperationStarted { batch_id, .. }
            | Self::OperationRetrying { batch_id, .. }
            | Self::OperationCompleted { batch_id, .. }
            | Self::OperationFailed { batch_id, .. }
            | Self::OperationCancelled { batch_id, .. } => *batch_id,
            Self::Progress(snapshot) => snapshot.batch_id,
            Self::BatchCompleted(result) => result.batch_id,
        }
    }

    /// Operation the event refers to, if any
    pub fn operation_id(&self) -> Option<OperationId> {
        match self {
            Self::OperationDispatched { operation_id, .. }
            | Self::OperationStarted { operation_id, .. }
            | Self::OperationRetrying { operation_id, .. }
            | Self::OperationCompleted { operation_id, .. }
            | Self::OperationFailed { operation_id, .. }
            | Self::OperationCancelled { operation_id, .. } => Some(*operation_id),
            _ => None,
        }
    }
}
