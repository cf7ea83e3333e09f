//! # Batch Registry
//!
//! Thread-safe map from [`BatchId`] to the shared batch, its progress tracker
//! and, once a run finishes, its [`BatchResult`].
//!
//! Results are kept separately from the batch so `get_result` stays stable
//! while callers keep reading it; a later re-execution replaces it.

use crate::constants::defaults;
use crate::error::{Result, SchedulerError};
use crate::models::{Batch, BatchId, BatchResult, SharedBatch};
use crate::orchestration::{ProgressSnapshot, ProgressTracker};
use crate::state_machine::BatchStatus;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// Listing entry for a registered batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub id: BatchId,
    pub name: String,
    pub status: BatchStatus,
    pub operations: usize,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct RegisteredBatch {
    batch: SharedBatch,
    progress: Arc<ProgressTracker>,
}

#[derive(Debug)]
pub struct BatchRegistry {
    batches: DashMap<BatchId, RegisteredBatch>,
    results: DashMap<BatchId, BatchResult>,
    eta_window_size: usize,
}

impl Default for BatchRegistry {
    fn default() -> Self {
        Self::new(defaults::ETA_WINDOW_SIZE)
    }
}

impl BatchRegistry {
    /// Registry whose trackers average the last `eta_window_size` completions
    pub fn new(eta_window_size: usize) -> Self {
        Self {
            batches: DashMap::new(),
            results: DashMap::new(),
            eta_window_size,
        }
    }

    /// Create and register an empty batch
    pub fn create_batch(&self, name: impl Into<String>) -> BatchId {
        let batch = Batch::new(name);
        let batch_id = batch.id();
        info!(batch_id = %batch_id, batch_name = %batch.name(), "Batch created");
        self.batches.insert(batch_id, self.registration(batch));
        batch_id
    }

    /// Register a batch built elsewhere
    pub fn register_batch(&self, batch: Batch) -> Result<BatchId> {
        let batch_id = batch.id();
        match self.batches.entry(batch_id) {
            Entry::Occupied(_) => Err(SchedulerError::DuplicateBatch { batch_id }),
            Entry::Vacant(slot) => {
                debug!(batch_id = %batch_id, operations = batch.len(), "Batch registered");
                slot.insert(self.registration(batch));
                Ok(batch_id)
            }
        }
    }

    pub fn get_batch(&self, batch_id: &BatchId) -> Option<SharedBatch> {
        self.batches.get(batch_id).map(|entry| entry.batch.clone())
    }

    pub fn progress_tracker(&self, batch_id: &BatchId) -> Option<Arc<ProgressTracker>> {
        self.batches
            .get(batch_id)
            .map(|entry| entry.progress.clone())
    }

    pub(crate) fn entry(&self, batch_id: &BatchId) -> Option<(SharedBatch, Arc<ProgressTracker>)> {
        self.batches
            .get(batch_id)
            .map(|entry| (entry.batch.clone(), entry.progress.clone()))
    }

    /// Current progress, with the total refreshed from the batch
    pub fn get_progress(&self, batch_id: &BatchId) -> Option<ProgressSnapshot> {
        let (batch, progress) = self.entry(batch_id)?;
        let total = batch.lock().len();
        progress.set_total(total);
        Some(progress.snapshot())
    }

    pub fn get_result(&self, batch_id: &BatchId) -> Option<BatchResult> {
        self.results.get(batch_id).map(|entry| entry.value().clone())
    }

    pub fn store_result(&self, result: BatchResult) {
        debug!(batch_id = %result.batch_id, status = %result.status, "Storing batch result");
        self.results.insert(result.batch_id, result);
    }

    /// Drop a batch and its result; `None` if it was not registered
    pub fn remove_batch(&self, batch_id: &BatchId) -> Option<SharedBatch> {
        self.results.remove(batch_id);
        self.batches.remove(batch_id).map(|(_, entry)| entry.batch)
    }

    /// Summaries of every registered batch, oldest first
    pub fn list_batches(&self) -> Vec<BatchSummary> {
        let batches: Vec<SharedBatch> = self
            .batches
            .iter()
            .map(|entry| entry.batch.clone())
            .collect();

        let mut summaries: Vec<BatchSummary> = batches
            .iter()
            .map(|batch| {
                let batch = batch.lock();
                BatchSummary {
                    id: batch.id(),
                    name: batch.name().to_string(),
                    status: batch.status(),
                    operations: batch.len(),
                    created_at: batch.created_at(),
                    completed_at: batch.completed_at(),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        summaries
    }

    pub fn contains(&self, batch_id: &BatchId) -> bool {
        self.batches.contains_key(batch_id)
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    fn registration(&self, batch: Batch) -> RegisteredBatch {
        let progress = Arc::new(ProgressTracker::new(batch.id(), self.eta_window_size));
        progress.set_total(batch.len());
        RegisteredBatch {
            batch: batch.into_shared(),
            progress,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Operation, OperationKind};

    #[test]
    fn test_unknown_ids_return_none() {
        let registry = BatchRegistry::default();
        let missing = BatchId::new();
        assert!(registry.get_batch(&missing).is_none());
        assert!(registry.get_progress(&missing).is_none());
        assert!(registry.get_result(&missing).is_none());
        assert!(registry.remove_batch(&missing).is_none());
    }

    #[test]
    fn test_create_and_list() {
        let registry = BatchRegistry::default();
        let first = registry.create_batch("first");
        let second = registry.create_batch("second");

        let listed: Vec<BatchId> = registry.list_batches().iter().map(|s| s.id).collect();
        assert_eq!(listed.len(), 2);
        assert!(listed.contains(&first));
        assert!(listed.contains(&second));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_register_rejects_duplicates() {
        let registry = BatchRegistry::default();
        let mut batch = Batch::new("prebuilt");
        batch
            .add_operation(Operation::new(OperationKind::Merge, vec![]))
            .unwrap();
        let id = batch.id();
        let copy = batch.clone();

        assert_eq!(registry.register_batch(batch).unwrap(), id);
        assert_eq!(
            registry.register_batch(copy).unwrap_err(),
            SchedulerError::DuplicateBatch { batch_id: id }
        );
        assert_eq!(registry.get_progress(&id).unwrap().total, 1);
    }

    #[test]
    fn test_progress_total_follows_batch() {
        let registry = BatchRegistry::default();
        let id = registry.create_batch("growing");
        assert_eq!(registry.get_progress(&id).unwrap().total, 0);

        let batch = registry.get_batch(&id).unwrap();
        batch
            .lock()
            .add_operation(Operation::new(OperationKind::Split, vec![]))
            .unwrap();
        assert_eq!(registry.get_progress(&id).unwrap().total, 1);
    }
}
