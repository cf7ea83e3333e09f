use crate::config::SchedulerConfig;
use crate::events::{BatchEvent, EventSink};
use crate::models::BatchResult;
use crate::orchestration::ProgressSnapshot;
use tokio::sync::broadcast;

/// Broadcast event publisher for batch lifecycle events
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<PublishedEvent>,
}

/// Event that has been published
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub name: &'static str,
    pub event: BatchEvent,
    pub published_at: chrono::DateTime<chrono::Utc>,
}

impl EventPublisher {
    /// Create a new event publisher with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publisher whose channel holds `event_buffer_size` undelivered events
    /// per subscriber
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self::new(config.event_buffer_size)
    }

    /// Publish an event, returning the number of subscribers it reached
    pub fn publish(&self, event: BatchEvent) -> usize {
        let published = PublishedEvent {
            name: event.name(),
            event,
            published_at: chrono::Utc::now(),
        };

        // No subscribers is acceptable - events are published even if no one is listening
        self.sender.send(published).unwrap_or(0)
    }

    /// Subscribe to events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.sender.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventPublisher {
    fn default() -> Self {
        Self::new(crate::constants::defaults::EVENT_BUFFER_SIZE)
    }
}

impl EventSink for EventPublisher {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.publish(BatchEvent::Progress(snapshot.clone()));
    }

    fn on_batch_completed(&self, result: &BatchResult) {
        self.publish(BatchEvent::BatchCompleted(result.clone()));
    }

    fn on_event(&self, event: &BatchEvent) {
        self.publish(event.clone());
    }
}
