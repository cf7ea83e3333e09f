//! # Batch Results
//!
//! Terminal, immutable records of a batch run. A `BatchResult` is built once
//! when the scheduler finalizes a batch and is then only cloned out of the
//! registry, so repeated reads return identical values.

use crate::error::{OperationError, Result, SchedulerError};
use crate::models::{Batch, BatchId, Operation, OperationId, OperationKind};
use crate::state_machine::{BatchStatus, OperationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Outcome of a single operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    pub operation_id: OperationId,
    pub name: Option<String>,
    pub kind: OperationKind,
    pub status: OperationStatus,
    pub attempts: u32,
    pub payload: Option<Value>,
    pub error: Option<OperationError>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<u64>,
}

impl From<&Operation> for OperationResult {
    fn from(operation: &Operation) -> Self {
        Self {
            operation_id: operation.id,
            name: operation.name.clone(),
            kind: operation.kind.clone(),
            status: operation.status(),
            attempts: operation.attempts(),
            payload: operation.result().cloned(),
            error: operation.error().cloned(),
            started_at: operation.started_at(),
            completed_at: operation.completed_at(),
            duration_ms: operation.duration().map(|d| d.as_millis() as u64),
        }
    }
}

/// Consolidated result of a batch run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_id: BatchId,
    pub batch_name: String,
    pub status: BatchStatus,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Per-operation outcomes in execution order
    pub operations: Vec<OperationResult>,
}

impl BatchResult {
    /// Snapshot a finished batch into a result
    pub fn from_batch(
        batch: &mut Batch,
        status: BatchStatus,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    ) -> Self {
        let stats = batch.statistics();
        let operations = batch
            .execution_order()
            .iter()
            .filter_map(|id| batch.get_operation(id))
            .map(OperationResult::from)
            .collect();

        Self {
            batch_id: batch.id(),
            batch_name: batch.name().to_string(),
            status,
            total: stats.total,
            successful: stats.completed,
            failed: stats.failed,
            cancelled: stats.cancelled,
            skipped: stats.skipped,
            started_at,
            completed_at,
            duration_ms: (completed_at - started_at).num_milliseconds().max(0) as u64,
            operations,
        }
    }

    /// `successful / (successful + failed) * 100`, or 100 when nothing finished
    pub fn success_rate(&self) -> f64 {
        let finished = self.successful + self.failed;
        if finished == 0 {
            100.0
        } else {
            self.successful as f64 / finished as f64 * 100.0
        }
    }

    pub fn operation(&self, id: &OperationId) -> Option<&OperationResult> {
        self.operations.iter().find(|result| result.operation_id == *id)
    }

    /// Operations that ended with an error (failed or cancelled)
    pub fn errors(&self) -> impl Iterator<Item = (&OperationId, &OperationError)> {
        self.operations
            .iter()
            .filter_map(|result| result.error.as_ref().map(|err| (&result.operation_id, err)))
    }

    pub fn is_success(&self) -> bool {
        self.status == BatchStatus::Completed
    }

    /// Payload of one operation, or its recorded failure as an error
    ///
    /// Skipped operations and operations that completed without a payload
    /// yield `Ok(None)`.
    pub fn payload(&self, id: &OperationId) -> Result<Option<&Value>> {
        let outcome = self
            .operation(id)
            .ok_or(SchedulerError::OperationNotFound { operation_id: *id })?;
        match &outcome.error {
            Some(error) => Err(error.clone().into_scheduler_error(self.batch_id, *id)),
            None => Ok(outcome.payload.as_ref()),
        }
    }

    /// `Ok` unless the batch was cancelled or an operation recorded a failure
    ///
    /// The first failure in execution order is returned.
    pub fn ensure_success(&self) -> Result<()> {
        if self.status == BatchStatus::Cancelled {
            return Err(SchedulerError::Cancelled {
                batch_id: self.batch_id,
            });
        }
        match self.errors().next() {
            Some((id, error)) => Err(error.clone().into_scheduler_error(self.batch_id, *id)),
            None => Ok(()),
        }
    }
}
