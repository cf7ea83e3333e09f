#![allow(clippy::doc_markdown)] // Allow technical terms like DAG, ETA in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Batch Scheduler
//!
//! Dependency-aware scheduler that executes batches of business operations
//! against an external executor.
//!
//! ## Overview
//!
//! A batch is a set of operations (merge, split, validate, transform, export
//! or custom kinds) connected by "depends on" edges. The scheduler walks the
//! resulting DAG: an operation runs only after every dependency completed,
//! higher-priority operations are dispatched first, concurrency is bounded,
//! failed attempts are retried with exponential backoff and per-operation
//! timeouts are enforced. Progress, including an estimate of the time
//! remaining, is observable while a batch runs.
//!
//! ## Module Organization
//!
//! - [`models`] - operations, batches, ids, options and results
//! - [`state_machine`] - operation and batch lifecycle states
//! - [`orchestration`] - scheduler, progress tracking, backoff and the processor facade
//! - [`registry`] - in-memory batch, progress and result bookkeeping
//! - [`events`] - event types, sinks and the broadcast publisher
//! - [`config`] - scheduler configuration from defaults, files and environment
//! - [`error`] - structured error handling
//! - [`logging`] - tracing subscriber setup and structured log helpers
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use batch_scheduler::models::{OperationKind, OperationOptions};
//! use batch_scheduler::orchestration::{BatchProcessor, BatchScheduler, ExecutionRequest, OperationExecutor};
//! use batch_scheduler::config::SchedulerConfig;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! struct Printer;
//!
//! #[async_trait]
//! impl OperationExecutor for Printer {
//!     async fn execute(&self, request: &ExecutionRequest, _: CancellationToken) -> anyhow::Result<serde_json::Value> {
//!         println!("{} on {:?}", request.kind, request.target_element_ids);
//!         Ok(serde_json::json!({ "ok": true }))
//!     }
//! }
//!
//! # async fn example() -> batch_scheduler::Result<()> {
//! let scheduler = BatchScheduler::builder(Arc::new(Printer))
//!     .with_config(SchedulerConfig::default().with_max_concurrent_operations(8))
//!     .build()?;
//! let processor = BatchProcessor::new(scheduler);
//!
//! let batch = processor.create_batch("import");
//! let split = processor.add_operation(batch, OperationKind::Split, vec!["doc".into()], OperationOptions::new(), 5, vec![])?;
//! processor.add_operation(batch, OperationKind::Validate, vec!["doc".into()], OperationOptions::new(), 5, vec![split])?;
//!
//! let result = processor.execute(batch).await?;
//! println!("{} of {} succeeded", result.successful, result.total);
//! processor.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod registry;
pub mod state_machine;

pub use config::{ExecutionMode, SchedulerConfig};
pub use error::{OperationError, OperationErrorKind, Result, SchedulerError};
pub use events::{BatchEvent, EventPublisher, EventSink, LoggingEventSink, NoopEventSink};
pub use models::{
    Batch, BatchId, BatchResult, Operation, OperationId, OperationKind, OperationOptions,
    OperationResult, RetryPolicy,
};
pub use orchestration::{
    BatchProcessor, BatchScheduler, ElementStore, ExecutionHandle, ExecutionRequest,
    OperationExecutor, ProgressSnapshot,
};
pub use registry::BatchRegistry;
pub use state_machine::{BatchStatus, OperationStatus};
