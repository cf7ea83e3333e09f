//! # Progress Tracker
//!
//! Per-batch counters, completion percentage, success rate and a rolling
//! estimate of the time remaining.
//!
//! The estimate averages the wall-clock durations of the most recent
//! completed operations (a bounded window) and multiplies by the number of
//! operations that have not yet finished. Failed, cancelled and skipped
//! operations count as finished but do not feed the window.

use crate::constants::defaults;
use crate::models::{BatchId, BatchStatistics, OperationId};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

/// Point-in-time view of a batch's progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub batch_id: BatchId,
    pub total: usize,
    pub completed: usize,
    pub failed: usize,
    /// Cancelled and skipped operations
    pub skipped: usize,
    /// Operations dispatched and not yet finished
    pub in_flight: usize,
    /// Most recently dispatched operation still in flight
    pub current_operation: Option<OperationId>,
    pub completion_percentage: f64,
    pub success_rate: f64,
    pub estimated_remaining_ms: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub last_updated: DateTime<Utc>,
}

impl ProgressSnapshot {
    /// Operations that have not reached a terminal state
    pub fn remaining(&self) -> usize {
        self.total
            .saturating_sub(self.completed + self.failed + self.skipped)
    }

    pub fn estimated_remaining(&self) -> Option<Duration> {
        self.estimated_remaining_ms.map(Duration::from_millis)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }
}

#[derive(Debug)]
struct TrackerState {
    total: usize,
    completed: usize,
    failed: usize,
    skipped: usize,
    in_flight: Vec<OperationId>,
    window: VecDeque<Duration>,
    window_sum: Duration,
    started_at: Option<DateTime<Utc>>,
    last_updated: DateTime<Utc>,
}

impl TrackerState {
    fn finish(&mut self, id: &OperationId) {
        self.in_flight.retain(|candidate| candidate != id);
        self.last_updated = Utc::now();
    }

    fn remaining(&self) -> usize {
        self.total
            .saturating_sub(self.completed + self.failed + self.skipped)
    }

    fn completion_percentage(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.completed as f64 / self.total as f64 * 100.0
        }
    }

    fn success_rate(&self) -> f64 {
        let finished = self.completed + self.failed;
        if finished == 0 {
            100.0
        } else {
            self.completed as f64 / finished as f64 * 100.0
        }
    }

    fn estimated_remaining(&self) -> Option<Duration> {
        if self.window.is_empty() {
            return None;
        }
        let average = self.window_sum / self.window.len() as u32;
        let remaining = u32::try_from(self.remaining()).unwrap_or(u32::MAX);
        Some(average.saturating_mul(remaining))
    }
}

/// Thread-safe progress accounting for one batch
#[derive(Debug)]
pub struct ProgressTracker {
    batch_id: BatchId,
    window_size: usize,
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new(batch_id: BatchId, window_size: usize) -> Self {
        Self {
            batch_id,
            window_size: window_size.max(1),
            state: Mutex::new(TrackerState {
                total: 0,
                completed: 0,
                failed: 0,
                skipped: 0,
                in_flight: Vec::new(),
                window: VecDeque::new(),
                window_sum: Duration::ZERO,
                started_at: None,
                last_updated: Utc::now(),
            }),
        }
    }

    pub fn with_default_window(batch_id: BatchId) -> Self {
        Self::new(batch_id, defaults::ETA_WINDOW_SIZE)
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Reset counters at the start of an execution, seeded from the batch's
    /// current statistics so operations finished by an earlier run still count
    pub fn start(&self, stats: &BatchStatistics) {
        let mut state = self.state.lock();
        state.total = stats.total;
        state.completed = stats.completed;
        state.failed = stats.failed;
        state.skipped = stats.cancelled + stats.skipped;
        state.in_flight.clear();
        state.started_at = Some(Utc::now());
        state.last_updated = Utc::now();
    }

    /// Align the counters with the batch's statistics once a run has ended
    ///
    /// Keeps the estimate window and the start time. Anything still listed as
    /// in flight is dropped.
    pub fn reconcile(&self, stats: &BatchStatistics) {
        let mut state = self.state.lock();
        state.total = stats.total;
        state.completed = stats.completed;
        state.failed = stats.failed;
        state.skipped = stats.cancelled + stats.skipped;
        state.in_flight.clear();
        state.last_updated = Utc::now();
    }

    pub fn set_total(&self, total: usize) {
        let mut state = self.state.lock();
        if state.total != total {
            state.total = total;
            state.last_updated = Utc::now();
        }
    }

    pub fn record_dispatch(&self, id: OperationId) {
        let mut state = self.state.lock();
        state.in_flight.push(id);
        state.last_updated = Utc::now();
    }

    /// Record a completion and feed its duration into the estimate window
    pub fn record_completed(&self, id: OperationId, duration: Duration) {
        let mut state = self.state.lock();
        state.completed += 1;
        state.window.push_back(duration);
        state.window_sum += duration;
        while state.window.len() > self.window_size {
            if let Some(evicted) = state.window.pop_front() {
                state.window_sum = state.window_sum.saturating_sub(evicted);
            }
        }
        state.finish(&id);
    }

    pub fn record_failed(&self, id: OperationId) {
        let mut state = self.state.lock();
        state.failed += 1;
        state.finish(&id);
    }

    /// Record a cancelled or skipped operation
    pub fn record_skipped(&self, id: OperationId) {
        let mut state = self.state.lock();
        state.skipped += 1;
        state.finish(&id);
    }

    pub fn completion_percentage(&self) -> f64 {
        self.state.lock().completion_percentage()
    }

    pub fn success_rate(&self) -> f64 {
        self.state.lock().success_rate()
    }

    pub fn estimated_remaining(&self) -> Option<Duration> {
        self.state.lock().estimated_remaining()
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock();
        ProgressSnapshot {
            batch_id: self.batch_id,
            total: state.total,
            completed: state.completed,
            failed: state.failed,
            skipped: state.skipped,
            in_flight: state.in_flight.len(),
            current_operation: state.in_flight.last().copied(),
            completion_percentage: state.completion_percentage(),
            success_rate: state.success_rate(),
            estimated_remaining_ms: state
                .estimated_remaining()
                .map(|eta| u64::try_from(eta.as_millis()).unwrap_or(u64::MAX)),
            started_at: state.started_at,
            last_updated: state.last_updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(total: usize, window: usize) -> ProgressTracker {
        let tracker = ProgressTracker::new(BatchId::new(), window);
        tracker.set_total(total);
        tracker
    }

    #[test]
    fn test_empty_batch_is_fully_complete() {
        let tracker = tracker(0, 10);
        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.completion_percentage, 100.0);
        assert_eq!(snapshot.success_rate, 100.0);
        assert_eq!(snapshot.estimated_remaining_ms, None);
        assert!(snapshot.is_finished());
    }

    #[test]
    fn test_percentages() {
        let tracker = tracker(4, 10);
        let (a, b, c) = (OperationId::new(), OperationId::new(), OperationId::new());

        tracker.record_completed(a, Duration::from_millis(10));
        tracker.record_failed(b);
        tracker.record_skipped(c);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.completed, 1);
        assert_eq!(snapshot.failed, 1);
        assert_eq!(snapshot.skipped, 1);
        assert_eq!(snapshot.completion_percentage, 25.0);
        assert_eq!(snapshot.success_rate, 50.0);
        assert_eq!(snapshot.remaining(), 1);
    }

    #[test]
    fn test_estimate_uses_rolling_window_average() {
        let tracker = tracker(10, 2);
        tracker.record_completed(OperationId::new(), Duration::from_millis(1_000));
        tracker.record_completed(OperationId::new(), Duration::from_millis(100));
        tracker.record_completed(OperationId::new(), Duration::from_millis(300));

        // window holds 100ms and 300ms; 7 operations remain
        assert_eq!(
            tracker.estimated_remaining(),
            Some(Duration::from_millis(1_400))
        );
    }

    #[test]
    fn test_estimate_ignores_failures() {
        let tracker = tracker(3, 10);
        tracker.record_failed(OperationId::new());
        assert_eq!(tracker.estimated_remaining(), None);

        tracker.record_completed(OperationId::new(), Duration::from_millis(50));
        assert_eq!(tracker.estimated_remaining(), Some(Duration::from_millis(50)));
    }

    #[test]
    fn test_in_flight_tracking() {
        let tracker = tracker(2, 10);
        let (a, b) = (OperationId::new(), OperationId::new());
        tracker.record_dispatch(a);
        tracker.record_dispatch(b);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.in_flight, 2);
        assert_eq!(snapshot.current_operation, Some(b));

        tracker.record_completed(b, Duration::from_millis(5));
        assert_eq!(tracker.snapshot().current_operation, Some(a));
    }

    #[test]
    fn test_reconcile_overrides_drifted_counters() {
        let tracker = tracker(3, 10);
        let a = OperationId::new();
        tracker.record_dispatch(a);
        tracker.record_completed(OperationId::new(), Duration::from_millis(20));

        let stats = BatchStatistics {
            total: 3,
            completed: 1,
            failed: 1,
            skipped: 1,
            ..BatchStatistics::default()
        };
        tracker.reconcile(&stats);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.remaining(), 0);
        assert_eq!(snapshot.in_flight, 0);
        assert!(snapshot.is_finished());
        assert_eq!(snapshot.estimated_remaining_ms, Some(0));
    }

    #[test]
    fn test_start_seeds_from_statistics() {
        let tracker = tracker(0, 10);
        let stats = BatchStatistics {
            total: 5,
            pending: 2,
            completed: 2,
            cancelled: 1,
            ..BatchStatistics::default()
        };
        tracker.start(&stats);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.total, 5);
        assert_eq!(snapshot.completed, 2);
        assert_eq!(snapshot.skipped, 1);
        assert!(snapshot.started_at.is_some());
    }
}
