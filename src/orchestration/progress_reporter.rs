//! Background heartbeat that pushes progress snapshots of every running batch
//! to the event sink on a fixed interval.

use crate::events::EventSink;
use crate::orchestration::progress_tracker::ProgressSnapshot;
use crate::orchestration::scheduler::ActiveBatches;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

#[derive(Debug)]
pub(crate) struct ProgressReporter {
    stop: CancellationToken,
    handle: JoinHandle<()>,
}

impl ProgressReporter {
    pub(crate) fn spawn(
        runtime: &Handle,
        active: ActiveBatches,
        sink: Arc<dyn EventSink>,
        interval: Duration,
    ) -> Self {
        let stop = CancellationToken::new();
        let token = stop.clone();

        let handle = runtime.spawn(async move {
            debug!(interval_ms = interval.as_millis() as u64, "Progress reporter started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // first tick completes immediately
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        // collect first so no map shard is locked while sinks run
                        let snapshots: Vec<ProgressSnapshot> = active
                            .iter()
                            .map(|entry| entry.value().progress.snapshot())
                            .collect();
                        for snapshot in &snapshots {
                            sink.on_progress(snapshot);
                        }
                    }
                }
            }
            debug!("Progress reporter stopped");
        });

        Self { stop, handle }
    }

    pub(crate) async fn stop(self) {
        self.stop.cancel();
        if let Err(e) = self.handle.await {
            error!(error = %e, "Progress reporter task failed");
        }
    }
}
