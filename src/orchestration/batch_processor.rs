//! # Batch Processor
//!
//! Public entry point tying the [`BatchRegistry`] to a [`BatchScheduler`].
//!
//! ```rust,no_run
//! use batch_scheduler::models::{OperationKind, OperationOptions};
//! use batch_scheduler::orchestration::{BatchProcessor, BatchScheduler, ExecutionRequest, OperationExecutor};
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Noop;
//!
//! #[async_trait]
//! impl OperationExecutor for Noop {
//!     async fn execute(&self, _: &ExecutionRequest, _: CancellationToken) -> anyhow::Result<serde_json::Value> {
//!         Ok(serde_json::Value::Null)
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let processor = BatchProcessor::new(BatchScheduler::new(Arc::new(Noop)).unwrap());
//! let batch_id = processor.create_batch("nightly");
//! let validate = processor
//!     .add_operation(batch_id, OperationKind::Validate, vec!["doc-1".into()], OperationOptions::new(), 5, vec![])
//!     .unwrap();
//! processor
//!     .add_operation(batch_id, OperationKind::Export, vec!["doc-1".into()], OperationOptions::new(), 5, vec![validate])
//!     .unwrap();
//!
//! let result = processor.execute(batch_id).await.unwrap();
//! assert!(result.is_success());
//! # });
//! ```

use crate::constants::priority;
use crate::error::{Result, SchedulerError};
use crate::logging::log_error;
use crate::models::{
    BatchId, BatchResult, Operation, OperationId, OperationKind, OperationOptions,
};
use crate::orchestration::progress_tracker::ProgressSnapshot;
use crate::orchestration::scheduler::{BatchRun, BatchScheduler, ExecutionHandle};
use crate::registry::{BatchRegistry, BatchSummary};
use std::sync::Arc;
use tracing::{debug, instrument};

/// Facade over batch creation, execution and result lookup
#[derive(Debug, Clone)]
pub struct BatchProcessor {
    registry: Arc<BatchRegistry>,
    scheduler: BatchScheduler,
}

impl BatchProcessor {
    /// Processor with a fresh registry sized from the scheduler's configuration
    pub fn new(scheduler: BatchScheduler) -> Self {
        let registry = Arc::new(BatchRegistry::new(scheduler.config().eta_window_size));
        Self::with_registry(scheduler, registry)
    }

    pub fn with_registry(scheduler: BatchScheduler, registry: Arc<BatchRegistry>) -> Self {
        Self {
            registry,
            scheduler,
        }
    }

    pub fn registry(&self) -> &Arc<BatchRegistry> {
        &self.registry
    }

    pub fn scheduler(&self) -> &BatchScheduler {
        &self.scheduler
    }

    pub fn create_batch(&self, name: impl Into<String>) -> BatchId {
        self.registry.create_batch(name)
    }

    /// Add an operation built from its parts
    ///
    /// `priority` must lie in 1..=10. Dependencies may name operations that
    /// have not been added yet; they are checked when the batch executes.
    pub fn add_operation(
        &self,
        batch_id: BatchId,
        kind: OperationKind,
        target_element_ids: Vec<String>,
        options: OperationOptions,
        priority: i32,
        depends_on: Vec<OperationId>,
    ) -> Result<OperationId> {
        if !priority::is_valid(priority) {
            return Err(SchedulerError::InvalidPriority { priority });
        }
        let priority =
            u8::try_from(priority).map_err(|_| SchedulerError::InvalidPriority { priority })?;

        let operation = Operation::new(kind, target_element_ids)
            .with_options(options)
            .with_priority(priority)
            .with_dependencies(depends_on);
        self.add(batch_id, operation)
    }

    /// Add a fully built operation
    pub fn add(&self, batch_id: BatchId, operation: Operation) -> Result<OperationId> {
        let batch = self
            .registry
            .get_batch(&batch_id)
            .ok_or(SchedulerError::BatchNotFound { batch_id })?;

        let (operation_id, total) = {
            let mut batch = batch.lock();
            let id = batch.add_operation(operation)?;
            (id, batch.len())
        };

        if let Some(progress) = self.registry.progress_tracker(&batch_id) {
            progress.set_total(total);
        }
        debug!(batch_id = %batch_id, operation_id = %operation_id, "Operation added");
        Ok(operation_id)
    }

    pub fn remove_operation(&self, batch_id: BatchId, operation_id: OperationId) -> Result<Operation> {
        let batch = self
            .registry
            .get_batch(&batch_id)
            .ok_or(SchedulerError::BatchNotFound { batch_id })?;
        let (removed, total) = {
            let mut batch = batch.lock();
            let removed = batch.remove_operation(&operation_id)?;
            (removed, batch.len())
        };
        if let Some(progress) = self.registry.progress_tracker(&batch_id) {
            progress.set_total(total);
        }
        Ok(removed)
    }

    /// Mark a pending operation Skipped so it never runs
    ///
    /// Counted as skipped in the batch's progress straight away, so a skip
    /// during execution is reflected in the next snapshot.
    pub fn skip_operation(&self, batch_id: BatchId, operation_id: OperationId) -> Result<()> {
        let batch = self
            .registry
            .get_batch(&batch_id)
            .ok_or(SchedulerError::BatchNotFound { batch_id })?;
        batch.lock().skip_operation(&operation_id)?;

        if let Some(progress) = self.registry.progress_tracker(&batch_id) {
            progress.record_skipped(operation_id);
        }
        debug!(batch_id = %batch_id, operation_id = %operation_id, "Operation skipped");
        Ok(())
    }

    /// Run a batch to completion and store its result
    #[instrument(skip(self), fields(batch_id = %batch_id))]
    pub async fn execute(&self, batch_id: BatchId) -> Result<BatchResult> {
        let run = self.begin(batch_id)?;
        Ok(run.drive().await)
    }

    /// Start a batch in the background; the result is stored when it finishes
    pub fn execute_async(&self, batch_id: BatchId) -> Result<ExecutionHandle> {
        let run = self.begin(batch_id)?;
        Ok(self.scheduler.spawn_run(run))
    }

    pub fn get_progress(&self, batch_id: BatchId) -> Option<ProgressSnapshot> {
        self.registry.get_progress(&batch_id)
    }

    pub fn get_result(&self, batch_id: BatchId) -> Option<BatchResult> {
        self.registry.get_result(&batch_id)
    }

    /// Request cancellation; `false` if the batch is not running
    pub fn cancel(&self, batch_id: BatchId) -> bool {
        self.scheduler.cancel(&batch_id)
    }

    pub async fn shutdown(&self) {
        self.scheduler.shutdown().await;
    }

    pub fn list_batches(&self) -> Vec<BatchSummary> {
        self.registry.list_batches()
    }

    pub fn active_batches(&self) -> Vec<BatchId> {
        self.scheduler.active_batches()
    }

    fn begin(&self, batch_id: BatchId) -> Result<BatchRun> {
        let (batch, progress) = self
            .registry
            .entry(&batch_id)
            .ok_or(SchedulerError::BatchNotFound { batch_id })?;

        let registry = self.registry.clone();
        let run = self.scheduler.begin(batch, progress).map_err(|e| {
            if e.is_structural() {
                debug!(batch_id = %batch_id, error = %e, "Execution rejected");
            } else {
                log_error("batch_processor", "execute", &e, Some(batch_id));
            }
            e
        })?;
        Ok(run.on_complete(move |result| registry.store_result(result.clone())))
    }
}
