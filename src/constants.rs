//! # System Constants
//!
//! Core constants and defaults that define the operational boundaries of the
//! batch scheduler.

// Re-export state types for convenience
pub use crate::state_machine::{BatchStatus, OperationStatus};

/// Event names emitted to event sinks
pub mod events {
    // Batch lifecycle events
    pub const BATCH_STARTED: &str = "batch.started";
    pub const BATCH_PROGRESS: &str = "batch.progress";
    pub const BATCH_COMPLETED: &str = "batch.completed";

    // Operation lifecycle events
    pub const OPERATION_DISPATCHED: &str = "operation.dispatched";
    pub const OPERATION_STARTED: &str = "operation.started";
    pub const OPERATION_RETRYING: &str = "operation.retrying";
    pub const OPERATION_COMPLETED: &str = "operation.completed";
    pub const OPERATION_FAILED: &str = "operation.failed";
    pub const OPERATION_CANCELLED: &str = "operation.cancelled";
}

/// Priority bounds for operations. Higher runs first.
pub mod priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;
    pub const DEFAULT: u8 = 5;

    /// Check whether a caller-supplied priority lies within bounds
    pub fn is_valid(priority: i32) -> bool {
        (i32::from(MIN)..=i32::from(MAX)).contains(&priority)
    }
}

/// Scheduler defaults
pub mod defaults {
    pub const MAX_CONCURRENT_OPERATIONS: usize = 4;
    pub const PROGRESS_INTERVAL_MS: u64 = 1000;
    pub const ETA_WINDOW_SIZE: usize = 1000;
    pub const EVENT_BUFFER_SIZE: usize = 1000;

    pub const MAX_ATTEMPTS: u32 = 3;
    pub const BASE_BACKOFF_MS: u64 = 1000;
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const MAX_BACKOFF_MS: u64 = 60_000;
    /// Upper bound on additive jitter as a fraction of the computed delay
    pub const MAX_JITTER: f64 = 0.1;
}
