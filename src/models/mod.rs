//! # Data Model
//!
//! Operations, batches and their terminal results.
//!
//! - [`Operation`] - one unit of work with kind, targets, options, dependencies and retry policy
//! - [`Batch`] - owned collection of operations with a cached topological execution order
//! - [`BatchResult`] / [`OperationResult`] - consolidated outcome of a batch run

pub mod batch;
pub mod ids;
pub mod operation;
pub mod options;
pub mod result;

pub use batch::{Batch, BatchStatistics, SharedBatch};
pub use ids::{BatchId, OperationId};
pub use operation::{Operation, OperationKind, RetryPolicy};
pub use options::OperationOptions;
pub use result::{BatchResult, OperationResult};
