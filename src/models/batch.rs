//! # Batch
//!
//! An owned collection of operations for one logical run, together with the
//! dependency graph analysis the scheduler needs:
//!
//! - a cached topological execution order (depth-first, post-order),
//! - the set of operations found on a dependency cycle ("unreachable"),
//! - the ready set: pending operations whose dependencies are all Completed,
//!   sorted by descending priority with ties broken by execution order.
//!
//! Mutating the operation set invalidates the cached order; it is recomputed
//! lazily on the next query.

use crate::constants::priority;
use crate::error::{Result, SchedulerError};
use crate::models::{BatchId, Operation, OperationId};
use crate::state_machine::{BatchStatus, OperationStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Batch shared between the registry, the scheduler loop and its units of work
pub type SharedBatch = Arc<parking_lot::Mutex<Batch>>;

/// Per-status operation counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStatistics {
    pub total: usize,
    pub pending: usize,
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub skipped: usize,
}

impl BatchStatistics {
    pub fn unfinished(&self) -> usize {
        self.pending + self.queued + self.running
    }
}

#[derive(Debug, Clone)]
pub struct Batch {
    id: BatchId,
    name: String,
    operations: HashMap<OperationId, Operation>,
    insertion_order: Vec<OperationId>,
    execution_order: Option<Vec<OperationId>>,
    unreachable: HashSet<OperationId>,
    status: BatchStatus,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
}

impl Batch {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(BatchId::new(), name)
    }

    pub fn with_id(id: BatchId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            operations: HashMap::new(),
            insertion_order: Vec::new(),
            execution_order: None,
            unreachable: HashSet::new(),
            status: BatchStatus::Pending,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn into_shared(self) -> SharedBatch {
        Arc::new(parking_lot::Mutex::new(self))
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> BatchStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn contains(&self, id: &OperationId) -> bool {
        self.operations.contains_key(id)
    }

    pub fn get_operation(&self, id: &OperationId) -> Option<&Operation> {
        self.operations.get(id)
    }

    pub(crate) fn operation_mut(&mut self, id: &OperationId) -> Option<&mut Operation> {
        self.operations.get_mut(id)
    }

    /// Operations in insertion order
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.operations.get(id))
    }

    /// Insert an operation; the cached execution order is invalidated
    pub fn add_operation(&mut self, operation: Operation) -> Result<OperationId> {
        if !priority::is_valid(i32::from(operation.priority)) {
            return Err(SchedulerError::InvalidPriority {
                priority: i32::from(operation.priority),
            });
        }
        if let Some(policy) = &operation.retry_policy {
            policy
                .validate()
                .map_err(|e| SchedulerError::InvalidRetryPolicy {
                    operation_id: operation.id,
                    reason: e.to_string(),
                })?;
        }
        if self.operations.contains_key(&operation.id) {
            return Err(SchedulerError::DuplicateId {
                operation_id: operation.id,
            });
        }

        let id = operation.id;
        debug!(
            batch_id = %self.id,
            operation_id = %id,
            kind = %operation.kind,
            priority = operation.priority,
            dependencies = operation.dependencies.len(),
            "Adding operation to batch"
        );
        self.insertion_order.push(id);
        self.operations.insert(id, operation);
        self.invalidate_order();
        Ok(id)
    }

    /// Remove an operation that is not queued or running
    pub fn remove_operation(&mut self, id: &OperationId) -> Result<Operation> {
        let status = self
            .operations
            .get(id)
            .map(Operation::status)
            .ok_or(SchedulerError::OperationNotFound { operation_id: *id })?;

        if status.is_active() {
            return Err(SchedulerError::OperationRunning { operation_id: *id });
        }

        self.insertion_order.retain(|existing| existing != id);
        self.invalidate_order();
        self.operations
            .remove(id)
            .ok_or(SchedulerError::OperationNotFound { operation_id: *id })
    }

    /// Mark a pending operation Skipped
    pub fn skip_operation(&mut self, id: &OperationId) -> Result<()> {
        let operation = self
            .operations
            .get_mut(id)
            .ok_or(SchedulerError::OperationNotFound { operation_id: *id })?;

        if operation.status().is_active() {
            return Err(SchedulerError::OperationRunning { operation_id: *id });
        }
        if !operation.mark_skipped() {
            return Err(SchedulerError::internal(format!(
                "operation {id} is {} and cannot be skipped",
                operation.status()
            )));
        }
        Ok(())
    }

    fn invalidate_order(&mut self) {
        self.execution_order = None;
        self.unreachable.clear();
    }

    fn ensure_order(&mut self) {
        if self.execution_order.is_none() {
            self.compute_execution_order();
        }
    }

    /// Depth-first topological sort over dependency edges
    ///
    /// Dependencies on ids not registered in this batch are excluded from the
    /// sort. A dependency reached while still in progress closes a cycle; that
    /// operation is recorded as unreachable and never becomes ready.
    pub fn compute_execution_order(&mut self) -> &[OperationId] {
        let mut order = Vec::with_capacity(self.operations.len());
        let mut visited: HashSet<OperationId> = HashSet::with_capacity(self.operations.len());
        let mut in_progress: HashSet<OperationId> = HashSet::new();
        let mut unreachable: HashSet<OperationId> = HashSet::new();

        for root in &self.insertion_order {
            if visited.contains(root) {
                continue;
            }

            // Explicit stack of (node, index of next dependency to visit)
            let mut stack: Vec<(OperationId, usize)> = vec![(*root, 0)];
            in_progress.insert(*root);

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;
                let dependencies = &self.operations[&node].dependencies;

                if frame.1 < dependencies.len() {
                    let dependency = dependencies[frame.1];
                    frame.1 += 1;

                    if !self.operations.contains_key(&dependency) {
                        continue;
                    }
                    if in_progress.contains(&dependency) {
                        warn!(
                            batch_id = %self.id,
                            operation_id = %dependency,
                            dependent_id = %node,
                            "Dependency cycle detected; operation marked unreachable"
                        );
                        unreachable.insert(dependency);
                        continue;
                    }
                    if visited.contains(&dependency) {
                        continue;
                    }

                    in_progress.insert(dependency);
                    stack.push((dependency, 0));
                } else {
                    stack.pop();
                    in_progress.remove(&node);
                    visited.insert(node);
                    order.push(node);
                }
            }
        }

        debug!(
            batch_id = %self.id,
            operations = order.len(),
            unreachable = unreachable.len(),
            "Computed execution order"
        );

        self.unreachable = unreachable;
        self.execution_order.insert(order)
    }

    /// Cached execution order, recomputed if the operation set changed
    pub fn execution_order(&mut self) -> Vec<OperationId> {
        self.ensure_order();
        self.execution_order.clone().unwrap_or_default()
    }

    /// Whether the operation was found on a dependency cycle
    pub fn is_unreachable(&mut self, id: &OperationId) -> bool {
        self.ensure_order();
        self.unreachable.contains(id)
    }

    fn dependencies_satisfied(&self, operation: &Operation) -> bool {
        operation.dependencies.iter().all(|dependency| {
            self.operations
                .get(dependency)
                .is_some_and(|dep| dep.status().satisfies_dependencies())
        })
    }

    /// Pending operations whose dependencies are all Completed
    ///
    /// Sorted by descending priority; ties keep execution order.
    pub fn ready_operations(&mut self) -> Vec<OperationId> {
        self.ensure_order();
        let Some(order) = self.execution_order.as_ref() else {
            return Vec::new();
        };

        let mut ready: Vec<(usize, u8, OperationId)> = order
            .iter()
            .enumerate()
            .filter_map(|(position, id)| {
                let operation = self.operations.get(id)?;
                let is_ready = operation.status() == OperationStatus::Pending
                    && !self.unreachable.contains(id)
                    && self.dependencies_satisfied(operation);
                is_ready.then_some((position, operation.priority, *id))
            })
            .collect();

        ready.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        ready.into_iter().map(|(_, _, id)| id).collect()
    }

    /// Why an operation's dependencies cannot be considered satisfied
    ///
    /// Returns `None` when every dependency is Completed and the operation is
    /// not on a cycle.
    pub fn unsatisfied_reason(&mut self, id: &OperationId) -> Option<String> {
        self.ensure_order();
        let operation = self.operations.get(id)?;

        if self.unreachable.contains(id) {
            return Some("operation is part of a dependency cycle".to_string());
        }

        let blockers: Vec<String> = operation
            .dependencies
            .iter()
            .filter_map(|dependency| match self.operations.get(dependency) {
                None => Some(format!("{dependency} (unregistered)")),
                Some(dep) if !dep.status().satisfies_dependencies() => {
                    let cyclic = if self.unreachable.contains(dependency) {
                        ", cyclic"
                    } else {
                        ""
                    };
                    Some(format!("{dependency} ({}{cyclic})", dep.status()))
                }
                Some(_) => None,
            })
            .collect();

        if blockers.is_empty() {
            None
        } else {
            Some(format!("dependencies not completed: {}", blockers.join(", ")))
        }
    }

    /// Pending operations that can never become ready
    ///
    /// An operation is blocked when it sits on a cycle, depends on an
    /// unregistered id, depends on an operation that reached a terminal state
    /// other than Completed, or depends on another blocked operation.
    pub fn blocked_operations(&mut self) -> Vec<OperationId> {
        self.ensure_order();
        let order = self.execution_order.clone().unwrap_or_default();
        let mut blocked: HashSet<OperationId> = HashSet::new();

        // dependencies precede dependents, except back-edges into cycles
        for id in &order {
            let Some(operation) = self.operations.get(id) else {
                continue;
            };
            if operation.status() != OperationStatus::Pending {
                continue;
            }
            let is_blocked = self.unreachable.contains(id)
                || operation.dependencies.iter().any(|dependency| {
                    match self.operations.get(dependency) {
                        None => true,
                        Some(dep) => {
                            blocked.contains(dependency)
                                || self.unreachable.contains(dependency)
                                || (dep.is_terminal() && !dep.status().satisfies_dependencies())
                        }
                    }
                });
            if is_blocked {
                blocked.insert(*id);
            }
        }

        self.insertion_order
            .iter()
            .filter(|id| blocked.contains(id))
            .copied()
            .collect()
    }

    /// Operations still Pending, in insertion order
    pub fn pending_operations(&self) -> Vec<OperationId> {
        self.operations_with_status(OperationStatus::Pending)
    }

    pub fn operations_with_status(&self, status: OperationStatus) -> Vec<OperationId> {
        self.operations()
            .filter(|op| op.status() == status)
            .map(|op| op.id)
            .collect()
    }

    /// Whether any operation has not reached a terminal state
    pub fn has_unfinished(&self) -> bool {
        self.operations.values().any(|op| !op.is_terminal())
    }

    pub fn running_count(&self) -> usize {
        self.operations
            .values()
            .filter(|op| op.status() == OperationStatus::Running)
            .count()
    }

    pub fn statistics(&self) -> BatchStatistics {
        let mut stats = BatchStatistics {
            total: self.operations.len(),
            ..BatchStatistics::default()
        };
        for operation in self.operations.values() {
            match operation.status() {
                OperationStatus::Pending => stats.pending += 1,
                OperationStatus::Queued => stats.queued += 1,
                OperationStatus::Running => stats.running += 1,
                OperationStatus::Completed => stats.completed += 1,
                OperationStatus::Failed => stats.failed += 1,
                OperationStatus::Cancelled => stats.cancelled += 1,
                OperationStatus::Skipped => stats.skipped += 1,
            }
        }
        stats
    }

    /// Final status derived from operation outcomes
    pub fn derive_final_status(&self) -> BatchStatus {
        let stats = self.statistics();
        BatchStatus::from_counts(stats.completed, stats.failed)
    }

    pub(crate) fn mark_started(&mut self) {
        self.status = BatchStatus::Running;
        self.started_at = Some(Utc::now());
        self.completed_at = None;
    }

    /// Flip a running batch to Cancelled when cancellation is requested
    ///
    /// `completed_at` stays unset until the run has unwound.
    pub(crate) fn mark_cancel_requested(&mut self) -> bool {
        if self.status != BatchStatus::Running {
            return false;
        }
        self.status = BatchStatus::Cancelled;
        true
    }

    pub(crate) fn mark_finished(&mut self, status: BatchStatus) {
        self.status = status;
        self.completed_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OperationError;
    use crate::models::{OperationKind, RetryPolicy};
    use serde_json::json;

    fn op(name: &str) -> Operation {
        Operation::new(OperationKind::Validate, vec![format!("{name}-element")]).with_name(name)
    }

    fn position(order: &[OperationId], id: OperationId) -> usize {
        order.iter().position(|candidate| *candidate == id).unwrap()
    }

    fn complete(batch: &mut Batch, id: OperationId) {
        let operation = batch.operation_mut(&id).unwrap();
        operation.mark_queued();
        operation.mark_running(1);
        operation.mark_completed(json!({}));
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let mut batch = Batch::new("dupes");
        let first = op("x");
        let duplicate = op("y").with_id(first.id);
        batch.add_operation(first).unwrap();
        let err = batch.add_operation(duplicate).unwrap_err();
        assert!(matches!(err, SchedulerError::DuplicateId { .. }));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_invalid_priority_is_rejected() {
        let mut batch = Batch::new("priorities");
        let err = batch.add_operation(op("x").with_priority(0)).unwrap_err();
        assert_eq!(err, SchedulerError::InvalidPriority { priority: 0 });
        let err = batch.add_operation(op("y").with_priority(11)).unwrap_err();
        assert_eq!(err, SchedulerError::InvalidPriority { priority: 11 });
    }

    #[test]
    fn test_invalid_retry_policy_is_rejected() {
        let mut batch = Batch::new("retries");
        let zero_attempts = op("x").with_retry_policy(RetryPolicy::default().with_max_attempts(0));
        let id = zero_attempts.id;

        let err = batch.add_operation(zero_attempts).unwrap_err();
        assert!(matches!(
            &err,
            SchedulerError::InvalidRetryPolicy { operation_id, reason }
                if *operation_id == id && reason.contains("max_attempts")
        ));
        assert!(err.is_structural());
        assert!(batch.is_empty());

        batch
            .add_operation(op("y").with_retry_policy(RetryPolicy::no_retry()))
            .unwrap();
    }

    #[test]
    fn test_order_respects_dependencies() {
        let mut batch = Batch::new("diamond");
        let a = op("a");
        let b = op("b").depends_on(a.id);
        let c = op("c").depends_on(a.id);
        let d = op("d").depends_on(b.id).depends_on(c.id);
        let (a_id, b_id, c_id, d_id) = (a.id, b.id, c.id, d.id);

        // Insert out of dependency order on purpose
        batch.add_operation(d).unwrap();
        batch.add_operation(c).unwrap();
        batch.add_operation(b).unwrap();
        batch.add_operation(a).unwrap();

        let order = batch.execution_order();
        assert_eq!(order.len(), 4);
        assert!(position(&order, a_id) < position(&order, b_id));
        assert!(position(&order, a_id) < position(&order, c_id));
        assert!(position(&order, b_id) < position(&order, d_id));
        assert!(position(&order, c_id) < position(&order, d_id));
    }

    #[test]
    fn test_cycle_marks_operation_unreachable() {
        let mut batch = Batch::new("cycle");
        let p_id = OperationId::new();
        let q_id = OperationId::new();
        batch
            .add_operation(op("p").with_id(p_id).depends_on(q_id))
            .unwrap();
        batch
            .add_operation(op("q").with_id(q_id).depends_on(p_id))
            .unwrap();

        let order = batch.execution_order();
        assert_eq!(order.len(), 2);
        assert!(batch.is_unreachable(&p_id));
        assert!(batch.ready_operations().is_empty());

        let mut blocked = batch.blocked_operations();
        blocked.sort();
        let mut expected = vec![p_id, q_id];
        expected.sort();
        assert_eq!(blocked, expected);
        assert!(batch.unsatisfied_reason(&p_id).unwrap().contains("cycle"));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let mut batch = Batch::new("self");
        let id = OperationId::new();
        batch.add_operation(op("loop").with_id(id).depends_on(id)).unwrap();
        assert!(batch.is_unreachable(&id));
        assert!(batch.ready_operations().is_empty());
    }

    #[test]
    fn test_ready_set_sorted_by_priority_then_order() {
        let mut batch = Batch::new("ready");
        let low = op("low").with_priority(2);
        let high = op("high").with_priority(9);
        let mid_first = op("mid-first").with_priority(5);
        let mid_second = op("mid-second").with_priority(5);
        let (low_id, high_id, mid_first_id, mid_second_id) =
            (low.id, high.id, mid_first.id, mid_second.id);
        batch.add_operation(low).unwrap();
        batch.add_operation(mid_first).unwrap();
        batch.add_operation(high).unwrap();
        batch.add_operation(mid_second).unwrap();

        assert_eq!(
            batch.ready_operations(),
            vec![high_id, mid_first_id, mid_second_id, low_id]
        );
    }

    #[test]
    fn test_dependents_become_ready_after_completion() {
        let mut batch = Batch::new("chain");
        let x = op("x");
        let y = op("y").depends_on(x.id);
        let (x_id, y_id) = (x.id, y.id);
        batch.add_operation(x).unwrap();
        batch.add_operation(y).unwrap();

        assert_eq!(batch.ready_operations(), vec![x_id]);
        complete(&mut batch, x_id);
        assert_eq!(batch.ready_operations(), vec![y_id]);
    }

    #[test]
    fn test_failed_dependency_blocks_dependents() {
        let mut batch = Batch::new("blocked");
        let x = op("x");
        let y = op("y").depends_on(x.id);
        let (x_id, y_id) = (x.id, y.id);
        batch.add_operation(x).unwrap();
        batch.add_operation(y).unwrap();

        let operation = batch.operation_mut(&x_id).unwrap();
        operation.mark_queued();
        operation.mark_running(1);
        operation.mark_failed(OperationError::executor("boom"));

        assert!(batch.ready_operations().is_empty());
        assert_eq!(batch.blocked_operations(), vec![y_id]);
        assert!(batch.unsatisfied_reason(&y_id).unwrap().contains("failed"));
    }

    #[test]
    fn test_unregistered_dependency_is_never_satisfied() {
        let mut batch = Batch::new("missing");
        let orphan = op("orphan").depends_on(OperationId::new());
        let orphan_id = orphan.id;
        batch.add_operation(orphan).unwrap();

        assert_eq!(batch.execution_order(), vec![orphan_id]);
        assert!(batch.ready_operations().is_empty());
        assert_eq!(batch.blocked_operations(), vec![orphan_id]);
        assert!(batch
            .unsatisfied_reason(&orphan_id)
            .unwrap()
            .contains("unregistered"));
    }

    #[test]
    fn test_adding_operation_invalidates_order() {
        let mut batch = Batch::new("late");
        let x = op("x");
        let x_id = x.id;
        batch.add_operation(x).unwrap();
        assert_eq!(batch.execution_order(), vec![x_id]);

        let y = op("y").depends_on(x_id);
        let y_id = y.id;
        batch.add_operation(y).unwrap();
        assert_eq!(batch.execution_order(), vec![x_id, y_id]);
    }

    #[test]
    fn test_remove_operation_rules() {
        let mut batch = Batch::new("remove");
        let x = op("x");
        let y = op("y");
        let (x_id, y_id) = (x.id, y.id);
        batch.add_operation(x).unwrap();
        batch.add_operation(y).unwrap();

        batch.operation_mut(&x_id).unwrap().mark_queued();
        batch.operation_mut(&x_id).unwrap().mark_running(1);
        let err = batch.remove_operation(&x_id).unwrap_err();
        assert_eq!(err, SchedulerError::OperationRunning { operation_id: x_id });

        let removed = batch.remove_operation(&y_id).unwrap();
        assert_eq!(removed.id, y_id);
        assert_eq!(batch.execution_order(), vec![x_id]);

        let missing = OperationId::new();
        assert!(matches!(
            batch.remove_operation(&missing),
            Err(SchedulerError::OperationNotFound { .. })
        ));
    }

    #[test]
    fn test_skip_and_statistics() {
        let mut batch = Batch::new("stats");
        let x = op("x");
        let y = op("y").depends_on(x.id);
        let (x_id, y_id) = (x.id, y.id);
        batch.add_operation(x).unwrap();
        batch.add_operation(y).unwrap();

        batch.skip_operation(&x_id).unwrap();
        let stats = batch.statistics();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.pending, 1);
        assert_eq!(stats.unfinished(), 1);

        // A skipped dependency does not satisfy its dependents
        assert!(batch.ready_operations().is_empty());
        assert_eq!(batch.blocked_operations(), vec![y_id]);
        assert!(batch.skip_operation(&x_id).is_err());
    }

    #[test]
    fn test_derive_final_status() {
        let mut batch = Batch::new("final");
        let x = op("x");
        let y = op("y");
        let (x_id, y_id) = (x.id, y.id);
        batch.add_operation(x).unwrap();
        batch.add_operation(y).unwrap();
        complete(&mut batch, x_id);
        assert_eq!(batch.derive_final_status(), BatchStatus::Completed);

        let operation = batch.operation_mut(&y_id).unwrap();
        operation.mark_failed(OperationError::dependency_unsatisfied("cycle"));
        assert_eq!(batch.derive_final_status(), BatchStatus::Partial);
    }

    #[test]
    fn test_long_chain_does_not_overflow() {
        let mut batch = Batch::new("chain");
        let ids: Vec<OperationId> = (0..20_000).map(|_| OperationId::new()).collect();

        // Insert in reverse so the DFS has to descend the whole chain
        for idx in (0..ids.len()).rev() {
            let mut operation = op("link").with_id(ids[idx]);
            if idx > 0 {
                operation = operation.depends_on(ids[idx - 1]);
            }
            batch.add_operation(operation).unwrap();
        }
        assert_eq!(batch.execution_order(), ids);
    }
}
