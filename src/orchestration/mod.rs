//! # Orchestration
//!
//! Execution machinery for batches.
//!
//! ## Components
//!
//! - [`BatchScheduler`] - coordination loop, units of work, cancellation and shutdown
//! - [`ProgressTracker`] - counters and rolling time-remaining estimate per batch
//! - [`BackoffCalculator`] - exponential retry delays with additive jitter
//! - [`BatchProcessor`] - facade combining the registry with a scheduler
//! - [`OperationExecutor`] / [`ElementStore`] - seams to the code that does the work
//!
//! ## Flow
//!
//! ```text
//! BatchProcessor::execute
//!   └── BatchScheduler::begin ── registers the batch as active
//!         └── BatchRun::drive
//!               ├── ready set ──► OperationUnit::run ──► OperationExecutor::execute
//!               ├── ProgressTracker updates ──► EventSink::on_event / on_progress
//!               └── BatchResult ──► BatchRegistry + EventSink::on_batch_completed
//! ```

pub mod backoff_calculator;
pub mod batch_processor;
pub mod element_store;
pub(crate) mod progress_reporter;
pub mod progress_tracker;
pub mod scheduler;
pub mod types;

pub use backoff_calculator::BackoffCalculator;
pub use batch_processor::BatchProcessor;
pub use element_store::InMemoryElementStore;
pub use progress_tracker::{ProgressSnapshot, ProgressTracker};
pub use scheduler::{BatchScheduler, BatchSchedulerBuilder, ExecutionHandle};
pub use types::{Element, ElementStore, ExecutionRequest, OperationExecutor};
