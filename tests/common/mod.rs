#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use batch_scheduler::events::{BatchEvent, EventSink};
use batch_scheduler::models::{BatchResult, Operation, OperationKind};
use batch_scheduler::orchestration::{ExecutionRequest, OperationExecutor, ProgressSnapshot};
use batch_scheduler::OperationId;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// How the mock executor behaves for a given target element
#[derive(Debug, Clone)]
pub enum Script {
    /// Succeed after the executor's default delay
    Succeed,
    /// Fail the first `n` attempts, then succeed
    FailTimes(u32),
    /// Fail every attempt
    AlwaysFail,
    /// Succeed after sleeping for the given duration
    Sleep(Duration),
    /// Block until cancelled, then return an error
    WaitForCancel,
}

#[derive(Debug, Clone)]
pub struct ExecutionRecord {
    pub operation_id: OperationId,
    pub target: String,
    pub attempt: u32,
    pub started: Instant,
}

/// Mock executor whose behaviour is scripted per target element id
///
/// Records every call and the peak number of calls in flight at once.
#[derive(Debug)]
pub struct ScriptedExecutor {
    scripts: Mutex<HashMap<String, Script>>,
    records: Mutex<Vec<ExecutionRecord>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
    delay: Duration,
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(5))
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            records: Mutex::new(Vec::new()),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn script(self, target: &str, script: Script) -> Self {
        self.scripts.lock().insert(target.to_string(), script);
        self
    }

    pub fn records(&self) -> Vec<ExecutionRecord> {
        self.records.lock().clone()
    }

    pub fn records_for(&self, target: &str) -> Vec<ExecutionRecord> {
        self.records
            .lock()
            .iter()
            .filter(|record| record.target == target)
            .cloned()
            .collect()
    }

    /// Targets in the order their first attempt started
    pub fn start_order(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for record in self.records.lock().iter() {
            if !seen.contains(&record.target) {
                seen.push(record.target.clone());
            }
        }
        seen
    }

    pub fn call_count(&self) -> usize {
        self.records.lock().len()
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn peak_running(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    /// Poll until `count` calls are in flight or the deadline passes
    pub async fn wait_until_running(&self, count: usize, deadline: Duration) -> bool {
        let started = Instant::now();
        while started.elapsed() < deadline {
            if self.running() >= count {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
        false
    }
}

#[async_trait]
impl OperationExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &ExecutionRequest,
        cancellation: CancellationToken,
    ) -> anyhow::Result<Value> {
        let target = request
            .target_element_ids
            .first()
            .cloned()
            .unwrap_or_default();

        self.records.lock().push(ExecutionRecord {
            operation_id: request.operation_id,
            target: target.clone(),
            attempt: request.attempt,
            started: Instant::now(),
        });
        let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now_running, Ordering::SeqCst);
        let _guard = RunningGuard(&self.running);

        let script = self
            .scripts
            .lock()
            .get(&target)
            .cloned()
            .unwrap_or(Script::Succeed);

        match script {
            Script::Succeed => {
                tokio::time::sleep(self.delay).await;
                Ok(json!({ "target": target, "attempt": request.attempt }))
            }
            Script::FailTimes(failures) => {
                tokio::time::sleep(self.delay).await;
                if request.attempt <= failures {
                    anyhow::bail!("scripted failure on attempt {}", request.attempt);
                }
                Ok(json!({ "target": target, "attempt": request.attempt }))
            }
            Script::AlwaysFail => {
                tokio::time::sleep(self.delay).await;
                anyhow::bail!("scripted permanent failure for {target}")
            }
            Script::Sleep(duration) => {
                tokio::time::sleep(duration).await;
                Ok(json!({ "target": target, "slept_ms": duration.as_millis() as u64 }))
            }
            Script::WaitForCancel => {
                cancellation.cancelled().await;
                anyhow::bail!("aborted by cancellation")
            }
        }
    }
}

/// Event sink that keeps everything it receives
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub progress: Mutex<Vec<ProgressSnapshot>>,
    pub completed: Mutex<Vec<BatchResult>>,
    pub events: Mutex<Vec<BatchEvent>>,
}

impl RecordingSink {
    pub fn event_names(&self) -> Vec<&'static str> {
        self.events.lock().iter().map(BatchEvent::name).collect()
    }
}

impl EventSink for RecordingSink {
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self.progress.lock().push(snapshot.clone());
    }

    fn on_batch_completed(&self, result: &BatchResult) {
        self.completed.lock().push(result.clone());
    }

    fn on_event(&self, event: &BatchEvent) {
        self.events.lock().push(event.clone());
    }
}

/// Operation whose single target element doubles as its script key
pub fn op(target: &str) -> Operation {
    Operation::new(OperationKind::Transform, vec![target.to_string()]).with_name(target)
}
