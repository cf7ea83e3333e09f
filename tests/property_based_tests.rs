mod common;

use batch_scheduler::models::{Batch, Operation, OperationId, OperationKind};
use batch_scheduler::orchestration::ProgressTracker;
use batch_scheduler::BatchId;
use common::strategies::*;
use proptest::prelude::*;
use std::collections::HashMap;
use std::time::Duration;

fn build_batch(dag: &DagSpec, insertion: &[usize]) -> (Batch, Vec<OperationId>) {
    let ids: Vec<OperationId> = (0..dag.len()).map(|_| OperationId::new()).collect();
    let mut batch = Batch::new("property");
    for &index in insertion {
        let operation = Operation::new(OperationKind::Validate, vec![format!("node-{index}")])
            .with_id(ids[index])
            .with_priority(dag.priorities[index])
            .with_dependencies(dag.deps[index].iter().map(|&dep| ids[dep]));
        batch.add_operation(operation).unwrap();
    }
    (batch, ids)
}

proptest! {
    /// Property: every operation of an acyclic batch appears exactly once in
    /// the execution order, after all of its dependencies
    #[test]
    fn execution_order_respects_dependencies(
        (dag, insertion) in dag_strategy(25)
            .prop_flat_map(|dag| {
                let len = dag.len();
                (Just(dag), shuffled_indexes(len))
            })
    ) {
        let (mut batch, ids) = build_batch(&dag, &insertion);
        let order = batch.execution_order();
        prop_assert_eq!(order.len(), dag.len());

        let position: HashMap<OperationId, usize> =
            order.iter().enumerate().map(|(pos, id)| (*id, pos)).collect();
        prop_assert_eq!(position.len(), dag.len());

        for (index, deps) in dag.deps.iter().enumerate() {
            for &dep in deps {
                prop_assert!(position[&ids[dep]] < position[&ids[index]]);
            }
            prop_assert!(!batch.is_unreachable(&ids[index]));
        }
    }

    /// Property: the ready set of a fresh batch is exactly the operations
    /// without dependencies, sorted by descending priority
    #[test]
    fn ready_set_is_roots_by_priority(dag in dag_strategy(25)) {
        let insertion: Vec<usize> = (0..dag.len()).collect();
        let (mut batch, ids) = build_batch(&dag, &insertion);
        let ready = batch.ready_operations();

        let roots: Vec<OperationId> = dag
            .deps
            .iter()
            .enumerate()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(index, _)| ids[index])
            .collect();
        prop_assert_eq!(ready.len(), roots.len());
        for id in &roots {
            prop_assert!(ready.contains(id));
        }

        let priorities: Vec<u8> = ready
            .iter()
            .map(|id| batch.get_operation(id).unwrap().priority)
            .collect();
        prop_assert!(priorities.windows(2).all(|pair| pair[0] >= pair[1]));
    }

    /// Property: completion percentage, success rate and remaining count stay
    /// consistent with the recorded outcomes
    #[test]
    fn progress_arithmetic_is_consistent(
        (total, completed, failed, skipped) in outcome_counts_strategy()
    ) {
        let tracker = ProgressTracker::new(BatchId::new(), 50);
        tracker.set_total(total);
        for _ in 0..completed {
            tracker.record_completed(OperationId::new(), Duration::from_millis(10));
        }
        for _ in 0..failed {
            tracker.record_failed(OperationId::new());
        }
        for _ in 0..skipped {
            tracker.record_skipped(OperationId::new());
        }

        let snapshot = tracker.snapshot();
        prop_assert_eq!(snapshot.remaining(), total - completed - failed - skipped);
        prop_assert!((0.0..=100.0).contains(&snapshot.completion_percentage));
        prop_assert!((0.0..=100.0).contains(&snapshot.success_rate));

        if total > 0 {
            let expected = completed as f64 / total as f64 * 100.0;
            prop_assert!((snapshot.completion_percentage - expected).abs() < 1e-9);
        }
        if completed > 0 {
            let expected_ms = 10 * snapshot.remaining() as u64;
            prop_assert_eq!(snapshot.estimated_remaining_ms, Some(expected_ms));
        } else {
            prop_assert_eq!(snapshot.estimated_remaining_ms, None);
        }
    }
}

#[cfg(test)]
mod cycle_invariants {
    use super::*;

    #[test]
    fn test_cycle_members_are_never_ready() {
        let (a, b, c) = (OperationId::new(), OperationId::new(), OperationId::new());
        let mut batch = Batch::new("cycle");
        batch
            .add_operation(Operation::new(OperationKind::Merge, vec![]).with_id(a).depends_on(c))
            .unwrap();
        batch
            .add_operation(Operation::new(OperationKind::Merge, vec![]).with_id(b).depends_on(a))
            .unwrap();
        batch
            .add_operation(Operation::new(OperationKind::Merge, vec![]).with_id(c).depends_on(b))
            .unwrap();

        assert!(batch.ready_operations().is_empty());
        assert_eq!(batch.blocked_operations().len(), 3);
        assert!([a, b, c].iter().any(|id| batch.is_unreachable(id)));
    }
}
