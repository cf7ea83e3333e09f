// State machine module for batch orchestration
//
// Operation and batch lifecycle states plus the transition rules the scheduler
// enforces when it moves an operation between them.

pub mod states;

// Re-export main types for convenient access
pub use states::{BatchStatus, OperationStatus};
