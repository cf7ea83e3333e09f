//! # Batch Events
//!
//! Notifications emitted by the scheduler while it drives a batch, and the
//! sinks that receive them.
//!
//! The scheduler reports through the [`EventSink`] trait. Every attempt and
//! outcome arrives via `on_event`; periodic heartbeats via `on_progress`; the
//! final consolidated result via `on_batch_completed`.

pub mod publisher;
pub mod sinks;
pub mod types;

pub use publisher::{EventPublisher, PublishedEvent};
pub use sinks::{FanoutEventSink, LoggingEventSink, NoopEventSink};
pub use types::BatchEvent;

use crate::models::BatchResult;
use crate::orchestration::ProgressSnapshot;

/// Receiver of scheduler notifications
///
/// Implementations are called from the scheduler's coordination loop and its
/// units of work and must not block.
pub trait EventSink: Send + Sync {
    /// Periodic or per-completion progress snapshot for a running batch
    fn on_progress(&self, snapshot: &ProgressSnapshot);

    /// Final result of a batch run
    fn on_batch_completed(&self, result: &BatchResult);

    /// Operation-level lifecycle event
    fn on_event(&self, _event: &BatchEvent) {}
}
