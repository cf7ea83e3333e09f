use proptest::prelude::*;

/// Acyclic dependency graph over `n` nodes
///
/// `deps[i]` only names nodes with a smaller index, so the graph can never
/// contain a cycle regardless of insertion order.
#[derive(Debug, Clone)]
pub struct DagSpec {
    pub priorities: Vec<u8>,
    pub deps: Vec<Vec<usize>>,
}

impl DagSpec {
    pub fn len(&self) -> usize {
        self.priorities.len()
    }
}

pub fn priority_strategy() -> impl Strategy<Value = u8> {
    1u8..=10
}

pub fn dag_strategy(max_nodes: usize) -> impl Strategy<Value = DagSpec> {
    (1..=max_nodes).prop_flat_map(|nodes| {
        let priorities = prop::collection::vec(priority_strategy(), nodes);
        let deps = (0..nodes)
            .map(|index| {
                if index == 0 {
                    Just(Vec::new()).boxed()
                } else {
                    prop::collection::vec(0..index, 0..=index.min(3))
                        .prop_map(|mut deps| {
                            deps.sort_unstable();
                            deps.dedup();
                            deps
                        })
                        .boxed()
                }
            })
            .collect::<Vec<_>>();
        (priorities, deps).prop_map(|(priorities, deps)| DagSpec { priorities, deps })
    })
}

/// Insertion order as a permutation of node indexes
pub fn shuffled_indexes(len: usize) -> impl Strategy<Value = Vec<usize>> {
    Just((0..len).collect::<Vec<_>>()).prop_shuffle()
}

/// Outcome counts for a batch of `total` operations: (completed, failed, skipped)
pub fn outcome_counts_strategy() -> impl Strategy<Value = (usize, usize, usize, usize)> {
    (0usize..200).prop_flat_map(|total| {
        (0..=total).prop_flat_map(move |completed| {
            (0..=total - completed).prop_flat_map(move |failed| {
                (0..=total - completed - failed)
                    .prop_map(move |skipped| (total, completed, failed, skipped))
            })
        })
    })
}
