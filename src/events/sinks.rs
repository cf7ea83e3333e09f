//! Stock event sinks.

use crate::events::{BatchEvent, EventSink};
use crate::models::BatchResult;
use crate::orchestration::ProgressSnapshot;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Discards every notification
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn on_progress(&self, _snapshot: &ProgressSnapshot) {}

    fn on_batch_completed(&self, _result: &BatchResult) {}
}

/// Writes notifications to the tracing subscriber
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl EventSink for LoggingEventSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        info!(
            batch_id = %snapshot.batch_id,
            total = snapshot.total,
            completed = snapshot.completed,
            failed = snapshot.failed,
            skipped = snapshot.skipped,
            completion_percentage = snapshot.completion_percentage,
            estimated_remaining_ms = snapshot.estimated_remaining_ms,
            "BATCH_PROGRESS"
        );
    }

    fn on_batch_completed(&self, result: &BatchResult) {
        info!(
            batch_id = %result.batch_id,
            batch_name = %result.batch_name,
            status = %result.status,
            successful = result.successful,
            failed = result.failed,
            cancelled = result.cancelled,
            duration_ms = result.duration_ms,
            "BATCH_COMPLETED"
        );
    }

    fn on_event(&self, event: &BatchEvent) {
        match event {
            BatchEvent::OperationFailed {
                batch_id,
                operation_id,
                attempts,
                error,
            } => warn!(
                batch_id = %batch_id,
                operation_id = %operation_id,
                attempts = attempts,
                error = %error,
                "OPERATION_FAILED"
            ),
            other => debug!(
                event = other.name(),
                batch_id = %other.batch_id(),
                operation_id = ?other.operation_id(),
                "BATCH_EVENT"
            ),
        }
    }
}

/// Forwards every notification to each inner sink in order
#[derive(Clone, Default)]
pub struct FanoutEventSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutEventSink {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self { sinks }
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl std::fmt::Debug for FanoutEventSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FanoutEventSink")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl EventSink for FanoutEventSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        for sink in &self.sinks {
            sink.on_progress(snapshot);
        }
    }

    fn on_batch_completed(&self, result: &BatchResult) {
        for sink in &self.sinks {
            sink.on_batch_completed(result);
        }
    }

    fn on_event(&self, event: &BatchEvent) {
        for sink in &self.sinks {
            sink.on_event(event);
        }
    }
}
