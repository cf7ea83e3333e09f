//! # Registry
//!
//! In-memory bookkeeping for batches, their progress trackers and their
//! final results.
//!
//! Lookups of unknown batch ids return `None` rather than an error.

pub mod batch_registry;

pub use batch_registry::{BatchRegistry, BatchSummary};
