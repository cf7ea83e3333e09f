//! # Batch Scheduler
//!
//! Drives a batch of operations to completion.
//!
//! ## Parallel mode
//!
//! The coordination loop repeatedly:
//!
//! 1. collects the ready set (pending operations whose dependencies are all
//!    Completed, highest priority first),
//! 2. dispatches as many as the free concurrency slots allow onto a
//!    [`JoinSet`],
//! 3. waits for any in-flight unit to finish (or for cancellation).
//!
//! When nothing is in flight and nothing is ready while operations remain
//! pending, the batch is deadlocked: every remaining pending operation is
//! failed with `dependency_unsatisfied` and the run ends.
//!
//! ## Sequential mode
//!
//! Operations run one at a time in topological order. An operation whose
//! dependencies are not all Completed when its turn comes is failed with
//! `dependency_unsatisfied` instead of being run.
//!
//! ## Units of work
//!
//! Each dispatched operation runs as an [`OperationUnit`]: it optionally
//! resolves target elements, then performs attempts against the
//! [`OperationExecutor`] with per-attempt timeout, exponential backoff between
//! retryable failures and cooperative cancellation. The operation keeps its
//! concurrency slot while it waits out a backoff delay.
//!
//! ## Cancellation and shutdown
//!
//! Every running batch owns a child of the scheduler's root
//! [`CancellationToken`]; every attempt receives a child of the batch token.
//! Cancelling a batch stops further dispatch, marks pending operations
//! Cancelled and waits for in-flight attempts to observe the token.
//! [`BatchScheduler::shutdown`] cancels the root token, waits for every active
//! batch to unwind and stops the progress reporter.

use crate::config::{ExecutionMode, SchedulerConfig};
use crate::error::{OperationError, OperationErrorKind, Result, SchedulerError};
use crate::events::{BatchEvent, EventSink, FanoutEventSink};
use crate::logging::{log_batch_operation, log_error, log_operation_event};
use crate::models::{
    Batch, BatchId, BatchResult, OperationId, OperationKind, OperationOptions, RetryPolicy,
    SharedBatch,
};
use crate::orchestration::backoff_calculator::BackoffCalculator;
use crate::orchestration::progress_reporter::ProgressReporter;
use crate::orchestration::progress_tracker::ProgressTracker;
use crate::orchestration::types::{ElementStore, ExecutionRequest, OperationExecutor};
use crate::state_machine::{BatchStatus, OperationStatus};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::Value;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

/// Bookkeeping for a batch that is currently executing
#[derive(Debug, Clone)]
pub(crate) struct ActiveBatch {
    run_id: u64,
    batch: SharedBatch,
    pub(crate) cancel: CancellationToken,
    pub(crate) progress: Arc<ProgressTracker>,
}

pub(crate) type ActiveBatches = Arc<DashMap<BatchId, ActiveBatch>>;

struct SchedulerInner {
    config: SchedulerConfig,
    executor: Arc<dyn OperationExecutor>,
    sink: Arc<dyn EventSink>,
    element_store: Option<Arc<dyn ElementStore>>,
    backoff: BackoffCalculator,
    active: ActiveBatches,
    /// Signalled whenever a batch leaves `active`
    unwound: Notify,
    root: CancellationToken,
    shut_down: AtomicBool,
    next_run_id: AtomicU64,
    reporter: parking_lot::Mutex<Option<ProgressReporter>>,
}

/// Builder for [`BatchScheduler`]
pub struct BatchSchedulerBuilder {
    config: SchedulerConfig,
    executor: Arc<dyn OperationExecutor>,
    sinks: Vec<Arc<dyn EventSink>>,
    element_store: Option<Arc<dyn ElementStore>>,
    backoff: BackoffCalculator,
}

impl BatchSchedulerBuilder {
    pub fn new(executor: Arc<dyn OperationExecutor>) -> Self {
        Self {
            config: SchedulerConfig::default(),
            executor,
            sinks: Vec::new(),
            element_store: None,
            backoff: BackoffCalculator::default(),
        }
    }

    pub fn with_config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add an event sink; may be called more than once
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_element_store(mut self, store: Arc<dyn ElementStore>) -> Self {
        self.element_store = Some(store);
        self
    }

    pub fn with_backoff_calculator(mut self, backoff: BackoffCalculator) -> Self {
        self.backoff = backoff;
        self
    }

    /// Validate the configuration and build the scheduler
    pub fn build(self) -> Result<BatchScheduler> {
        self.config.validate()?;

        let sink: Arc<dyn EventSink> = Arc::new(FanoutEventSink::new(self.sinks));

        Ok(BatchScheduler {
            inner: Arc::new(SchedulerInner {
                config: self.config,
                executor: self.executor,
                sink,
                element_store: self.element_store,
                backoff: self.backoff,
                active: Arc::new(DashMap::new()),
                unwound: Notify::new(),
                root: CancellationToken::new(),
                shut_down: AtomicBool::new(false),
                next_run_id: AtomicU64::new(1),
                reporter: parking_lot::Mutex::new(None),
            }),
        })
    }
}

/// Executes batches against an [`OperationExecutor`]
///
/// Cheap to clone; clones share the same active-batch table, root
/// cancellation token and progress reporter.
#[derive(Clone)]
pub struct BatchScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for BatchScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchScheduler")
            .field("config", &self.inner.config)
            .field("active_batches", &self.inner.active.len())
            .field("shut_down", &self.is_shut_down())
            .finish()
    }
}

impl BatchScheduler {
    pub fn builder(executor: Arc<dyn OperationExecutor>) -> BatchSchedulerBuilder {
        BatchSchedulerBuilder::new(executor)
    }

    /// Scheduler with default configuration and no event sinks
    pub fn new(executor: Arc<dyn OperationExecutor>) -> Result<Self> {
        Self::builder(executor).build()
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    pub fn is_running(&self, batch_id: &BatchId) -> bool {
        self.inner.active.contains_key(batch_id)
    }

    pub fn active_batches(&self) -> Vec<BatchId> {
        self.inner.active.iter().map(|entry| *entry.key()).collect()
    }

    /// Run a batch to completion
    ///
    /// Fails only for structural reasons: the batch is already running or the
    /// scheduler has been shut down. Operation failures are reported in the
    /// returned result.
    pub async fn execute(
        &self,
        batch: &SharedBatch,
        progress: &Arc<ProgressTracker>,
    ) -> Result<BatchResult> {
        let run = self.begin(batch.clone(), progress.clone())?;
        Ok(run.drive().await)
    }

    /// Start a batch on a background task and return a handle to it
    pub fn execute_async(
        &self,
        batch: &SharedBatch,
        progress: &Arc<ProgressTracker>,
    ) -> Result<ExecutionHandle> {
        let run = self.begin(batch.clone(), progress.clone())?;
        Ok(self.spawn_run(run))
    }

    /// Request cooperative cancellation of a running batch
    ///
    /// The batch reads as Cancelled from this point on, even while in-flight
    /// attempts are still unwinding. Returns `false` when the batch is not
    /// currently running.
    pub fn cancel(&self, batch_id: &BatchId) -> bool {
        let Some((cancel, batch)) = self
            .inner
            .active
            .get(batch_id)
            .map(|active| (active.cancel.clone(), active.batch.clone()))
        else {
            return false;
        };

        cancel.cancel();
        let flipped = batch.lock().mark_cancel_requested();
        log_batch_operation(
            "cancel_requested",
            *batch_id,
            BatchStatus::Cancelled,
            (!flipped).then_some("run has not started yet"),
        );
        true
    }

    /// Cancel every running batch, wait for them to unwind and stop the
    /// progress reporter. Further executions fail with `ShutDown`.
    ///
    /// Idempotent: later calls wait for the same unwinding and return.
    pub async fn shutdown(&self) {
        if !self.inner.shut_down.swap(true, Ordering::SeqCst) {
            info!(
                active_batches = self.inner.active.len(),
                "Shutting down batch scheduler"
            );
        }
        self.inner.root.cancel();

        loop {
            let unwound = self.inner.unwound.notified();
            if self.inner.active.is_empty() {
                break;
            }
            unwound.await;
        }

        let reporter = self.inner.reporter.lock().take();
        if let Some(reporter) = reporter {
            reporter.stop().await;
            info!("Batch scheduler shut down");
        }
    }

    /// Register a batch as running without starting it
    pub(crate) fn begin(
        &self,
        batch: SharedBatch,
        progress: Arc<ProgressTracker>,
    ) -> Result<BatchRun> {
        if self.is_shut_down() {
            return Err(SchedulerError::ShutDown);
        }
        let runtime = Handle::try_current()
            .map_err(|e| SchedulerError::internal(format!("no tokio runtime available: {e}")))?;

        let batch_id = batch.lock().id();
        let cancel = self.inner.root.child_token();
        let run_id = self.inner.next_run_id.fetch_add(1, Ordering::Relaxed);

        match self.inner.active.entry(batch_id) {
            Entry::Occupied(_) => return Err(SchedulerError::AlreadyRunning { batch_id }),
            Entry::Vacant(slot) => {
                slot.insert(ActiveBatch {
                    run_id,
                    batch: batch.clone(),
                    cancel: cancel.clone(),
                    progress: progress.clone(),
                });
            }
        }

        self.ensure_reporter(&runtime);

        Ok(BatchRun {
            inner: self.inner.clone(),
            runtime,
            run_id,
            batch_id,
            batch,
            progress,
            cancel,
            on_complete: None,
            started_at: None,
            finished: false,
        })
    }

    pub(crate) fn spawn_run(&self, run: BatchRun) -> ExecutionHandle {
        let batch_id = run.batch_id;
        let runtime = run.runtime.clone();
        let join = runtime.spawn(run.drive());
        ExecutionHandle {
            batch_id,
            join,
            scheduler: self.clone(),
        }
    }

    fn ensure_reporter(&self, runtime: &Handle) {
        let mut reporter = self.inner.reporter.lock();
        if reporter.is_none() && !self.is_shut_down() {
            *reporter = Some(ProgressReporter::spawn(
                runtime,
                self.inner.active.clone(),
                self.inner.sink.clone(),
                self.inner.config.progress_interval(),
            ));
        }
    }
}

/// Handle to a batch started with `execute_async`
#[derive(Debug)]
pub struct ExecutionHandle {
    batch_id: BatchId,
    join: JoinHandle<BatchResult>,
    scheduler: BatchScheduler,
}

impl ExecutionHandle {
    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    /// Request cooperative cancellation; `false` if the batch already finished
    pub fn cancel(&self) -> bool {
        self.scheduler.cancel(&self.batch_id)
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the batch to finish and return its result
    pub async fn wait(self) -> Result<BatchResult> {
        self.join.await.map_err(|e| {
            SchedulerError::internal(format!("batch task for {} failed: {e}", self.batch_id))
        })
    }
}

type CompletionHook = Box<dyn FnOnce(&BatchResult) + Send + Sync + 'static>;

/// One execution of one batch
///
/// Dropping a run that started but never finished (its `execute` future was
/// abandoned) counts as cancellation: operations it had queued or running
/// are marked Cancelled along with everything still pending, the result is
/// recorded, and the batch is freed for another execution.
pub(crate) struct BatchRun {
    inner: Arc<SchedulerInner>,
    runtime: Handle,
    run_id: u64,
    batch_id: BatchId,
    batch: SharedBatch,
    progress: Arc<ProgressTracker>,
    cancel: CancellationToken,
    on_complete: Option<CompletionHook>,
    started_at: Option<DateTime<Utc>>,
    finished: bool,
}

impl Drop for BatchRun {
    fn drop(&mut self) {
        if !self.finished && self.started_at.is_some() {
            self.abandon();
        }
        self.release();
    }
}

enum SequentialStep {
    Run(OperationUnit),
    Fail(OperationId, String),
    Skip,
}

impl BatchRun {
    /// Invoke `hook` with the final result before completion is announced
    pub(crate) fn on_complete(
        mut self,
        hook: impl FnOnce(&BatchResult) + Send + Sync + 'static,
    ) -> Self {
        self.on_complete = Some(Box::new(hook));
        self
    }

    #[instrument(skip(self), fields(batch_id = %self.batch_id))]
    pub(crate) async fn drive(mut self) -> BatchResult {
        let started_at = Utc::now();
        self.started_at = Some(started_at);
        let (batch_name, total) = {
            let mut batch = self.batch.lock();
            batch.mark_started();
            self.progress.start(&batch.statistics());
            (batch.name().to_string(), batch.len())
        };

        debug!(
            execution_mode = ?self.inner.config.execution_mode,
            max_concurrent = self.inner.config.max_concurrent_operations,
            "Batch execution starting"
        );
        log_batch_operation(
            "started",
            self.batch_id,
            BatchStatus::Running,
            Some(&format!("{batch_name}: {total} operations")),
        );
        self.inner.sink.on_event(&BatchEvent::BatchStarted {
            batch_id: self.batch_id,
            batch_name,
            total,
            started_at,
        });

        let cancelled = match self.inner.config.execution_mode {
            ExecutionMode::Parallel => self.run_parallel().await,
            ExecutionMode::Sequential => self.run_sequential().await,
        };

        self.finalize(cancelled)
    }

    /// Returns whether the run was cancelled
    async fn run_parallel(&self) -> bool {
        let max_concurrent = self.inner.config.max_concurrent_operations;
        let mut in_flight: JoinSet<OperationId> = JoinSet::new();

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let units = {
                let mut batch = self.batch.lock();
                self.progress.set_total(batch.len());
                let capacity = max_concurrent.saturating_sub(in_flight.len());
                let ready = batch.ready_operations();

                let mut units = Vec::with_capacity(capacity.min(ready.len()));
                for id in ready.into_iter().take(capacity) {
                    if let Some(unit) = self.claim(&mut batch, id) {
                        units.push(unit);
                    }
                }
                units
            };

            for unit in units {
                self.announce_dispatch(unit.spec.id);
                in_flight.spawn_on(unit.run(), &self.runtime);
            }

            if in_flight.is_empty() {
                self.fail_stranded();
                break;
            }

            tokio::select! {
                joined = in_flight.join_next() => {
                    if let Some(Err(e)) = joined {
                        log_error("scheduler", "join_operation", &e, Some(self.batch_id));
                    }
                }
                _ = self.cancel.cancelled() => {}
            }
        }

        if !self.cancel.is_cancelled() {
            return false;
        }

        debug!(
            in_flight = in_flight.len(),
            "Cancellation observed, draining in-flight operations"
        );
        self.cancel_pending();
        while let Some(joined) = in_flight.join_next().await {
            if let Err(e) = joined {
                log_error("scheduler", "join_operation", &e, Some(self.batch_id));
            }
        }
        true
    }

    /// Returns whether the run was cancelled
    async fn run_sequential(&self) -> bool {
        let mut visited: HashSet<OperationId> = HashSet::new();

        loop {
            if self.cancel.is_cancelled() {
                self.cancel_pending();
                return true;
            }

            let step = {
                let mut batch = self.batch.lock();
                self.progress.set_total(batch.len());
                let next = batch
                    .execution_order()
                    .into_iter()
                    .find(|id| !visited.contains(id));
                let Some(id) = next else {
                    break;
                };
                visited.insert(id);

                let pending = batch
                    .get_operation(&id)
                    .is_some_and(|op| op.status() == OperationStatus::Pending);
                if !pending {
                    SequentialStep::Skip
                } else if let Some(reason) = batch.unsatisfied_reason(&id) {
                    SequentialStep::Fail(id, reason)
                } else {
                    match self.claim(&mut batch, id) {
                        Some(unit) => SequentialStep::Run(unit),
                        None => SequentialStep::Skip,
                    }
                }
            };

            match step {
                SequentialStep::Run(unit) => {
                    self.announce_dispatch(unit.spec.id);
                    unit.run().await;
                }
                SequentialStep::Fail(id, reason) => {
                    fail_operation(
                        &self.inner,
                        &self.batch,
                        &self.progress,
                        self.batch_id,
                        id,
                        OperationError::dependency_unsatisfied(reason),
                    );
                }
                SequentialStep::Skip => {}
            }
        }

        // Operations added behind the walk, or cancelled while the last unit ran
        if self.cancel.is_cancelled() {
            self.cancel_pending();
            return true;
        }
        self.fail_stranded();
        false
    }

    /// Move a ready operation to Queued and package it as a unit of work
    fn claim(&self, batch: &mut Batch, id: OperationId) -> Option<OperationUnit> {
        let operation = batch.operation_mut(&id)?;
        if !operation.mark_queued() {
            return None;
        }

        let spec = OperationSpec {
            id,
            kind: operation.kind.clone(),
            target_element_ids: operation.target_element_ids.clone(),
            options: operation.options.clone(),
            retry: operation
                .retry_policy
                .clone()
                .unwrap_or_else(|| self.inner.config.retry.clone()),
            timeout: operation
                .timeout()
                .or_else(|| self.inner.config.default_operation_timeout()),
        };

        Some(OperationUnit {
            inner: self.inner.clone(),
            batch: self.batch.clone(),
            progress: self.progress.clone(),
            batch_id: self.batch_id,
            cancel: self.cancel.clone(),
            spec,
        })
    }

    fn announce_dispatch(&self, operation_id: OperationId) {
        debug!(operation_id = %operation_id, "Dispatching operation");
        self.progress.record_dispatch(operation_id);
        self.inner.sink.on_event(&BatchEvent::OperationDispatched {
            batch_id: self.batch_id,
            operation_id,
        });
    }

    /// Fail every operation still pending once nothing can make progress
    fn fail_stranded(&self) {
        let stranded: Vec<(OperationId, String)> = {
            let mut batch = self.batch.lock();
            let pending = batch.pending_operations();
            pending
                .into_iter()
                .map(|id| {
                    let reason = batch
                        .unsatisfied_reason(&id)
                        .unwrap_or_else(|| "no runnable path to completion".to_string());
                    (id, reason)
                })
                .collect()
        };

        if stranded.is_empty() {
            return;
        }

        warn!(
            stranded = stranded.len(),
            "No operation is ready or in flight; failing remaining pending operations"
        );
        for (id, reason) in stranded {
            fail_operation(
                &self.inner,
                &self.batch,
                &self.progress,
                self.batch_id,
                id,
                OperationError::dependency_unsatisfied(reason),
            );
        }
    }

    fn cancel_pending(&self) {
        self.cancel_matching(|status| status == OperationStatus::Pending);
    }

    /// Cancel every operation whose status satisfies `select`
    fn cancel_matching(&self, select: impl Fn(OperationStatus) -> bool) {
        let cancelled: Vec<OperationId> = {
            let mut batch = self.batch.lock();
            let selected: Vec<OperationId> = batch
                .operations()
                .filter(|operation| select(operation.status()))
                .map(|operation| operation.id)
                .collect();
            selected
                .into_iter()
                .filter(|id| {
                    batch
                        .operation_mut(id)
                        .is_some_and(|operation| operation.mark_cancelled())
                })
                .collect()
        };

        for id in cancelled {
            self.progress.record_skipped(id);
            self.inner.sink.on_event(&BatchEvent::OperationCancelled {
                batch_id: self.batch_id,
                operation_id: id,
            });
        }
    }

    fn finalize(mut self, cancelled: bool) -> BatchResult {
        self.complete(cancelled)
    }

    /// Cancel an execution whose driving future was dropped mid-run
    ///
    /// In-flight units were aborted with the future, so whatever they had
    /// queued or running will never report back.
    fn abandon(&mut self) {
        self.cancel.cancel();
        self.cancel_matching(|status| status.is_active());
        self.cancel_pending();
        log_batch_operation(
            "abandoned",
            self.batch_id,
            BatchStatus::Cancelled,
            Some("execution dropped before completion"),
        );
        self.complete(true);
    }

    fn complete(&mut self, cancelled: bool) -> BatchResult {
        self.finished = true;
        let started_at = self.started_at.unwrap_or_else(Utc::now);
        let result = {
            let mut batch = self.batch.lock();
            let status = if cancelled {
                BatchStatus::Cancelled
            } else {
                batch.derive_final_status()
            };
            batch.mark_finished(status);
            self.progress.reconcile(&batch.statistics());
            BatchResult::from_batch(&mut batch, status, started_at, Utc::now())
        };

        if let Some(hook) = self.on_complete.take() {
            hook(&result);
        }
        self.release();

        log_batch_operation(
            "finished",
            self.batch_id,
            result.status,
            Some(&format!(
                "{} completed, {} failed, {} cancelled, {} skipped in {}ms",
                result.successful,
                result.failed,
                result.cancelled,
                result.skipped,
                result.duration_ms
            )),
        );

        self.inner.sink.on_progress(&self.progress.snapshot());
        self.inner.sink.on_batch_completed(&result);
        result
    }

    /// Remove this run from the active table if it still owns the entry
    fn release(&self) {
        let removed = self
            .inner
            .active
            .remove_if(&self.batch_id, |_, active| active.run_id == self.run_id);
        if removed.is_some() {
            self.inner.unwound.notify_waiters();
        }
    }
}

/// Immutable inputs of a unit of work, captured at dispatch
#[derive(Debug, Clone)]
struct OperationSpec {
    id: OperationId,
    kind: OperationKind,
    target_element_ids: Vec<String>,
    options: OperationOptions,
    retry: RetryPolicy,
    timeout: Option<Duration>,
}

/// A dispatched operation running through its attempts
struct OperationUnit {
    inner: Arc<SchedulerInner>,
    batch: SharedBatch,
    progress: Arc<ProgressTracker>,
    batch_id: BatchId,
    cancel: CancellationToken,
    spec: OperationSpec,
}

enum AttemptOutcome {
    Succeeded(Value),
    Failed(OperationError),
}

impl OperationUnit {
    #[instrument(skip(self), fields(batch_id = %self.batch_id, operation_id = %self.spec.id, kind = %self.spec.kind))]
    async fn run(self) -> OperationId {
        let id = self.spec.id;

        if let Some(error) = self.resolve_elements().await {
            self.finish_failed(error, 0);
            return id;
        }

        let started = Instant::now();
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                self.finish_cancelled();
                return id;
            }

            attempt += 1;
            if !self.begin_attempt(attempt) {
                return id;
            }

            match self.attempt(attempt).await {
                AttemptOutcome::Succeeded(payload) => {
                    self.finish_completed(payload, attempt, started.elapsed());
                    return id;
                }
                AttemptOutcome::Failed(_) if self.cancel.is_cancelled() => {
                    self.finish_cancelled();
                    return id;
                }
                AttemptOutcome::Failed(error)
                    if error.is_retryable() && attempt < self.spec.retry.max_attempts =>
                {
                    let delay = self.inner.backoff.delay_for(&self.spec.retry, attempt);
                    warn!(
                        attempt = attempt,
                        max_attempts = self.spec.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "Operation attempt failed, retrying after backoff"
                    );
                    self.inner.sink.on_event(&BatchEvent::OperationRetrying {
                        batch_id: self.batch_id,
                        operation_id: id,
                        attempt,
                        delay_ms: delay.as_millis() as u64,
                        error,
                    });

                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = self.cancel.cancelled() => {
                            self.finish_cancelled();
                            return id;
                        }
                    }
                }
                AttemptOutcome::Failed(error) => {
                    self.finish_failed(error, attempt);
                    return id;
                }
            }
        }
    }

    /// Resolve target elements when an element store is configured
    async fn resolve_elements(&self) -> Option<OperationError> {
        let store = self.inner.element_store.as_ref()?;
        if self.spec.target_element_ids.is_empty() {
            return None;
        }

        match store.resolve(&self.spec.target_element_ids).await {
            Ok(elements) => {
                let found: HashSet<&str> = elements.iter().map(|e| e.id.as_str()).collect();
                let missing: Vec<String> = self
                    .spec
                    .target_element_ids
                    .iter()
                    .filter(|id| !found.contains(id.as_str()))
                    .cloned()
                    .collect();
                if missing.is_empty() {
                    None
                } else {
                    Some(OperationError::elements_not_found(&missing))
                }
            }
            Err(e) => Some(OperationError::new(
                OperationErrorKind::ElementsNotFound,
                format!("element store lookup failed: {e:#}"),
            )),
        }
    }

    fn begin_attempt(&self, attempt: u32) -> bool {
        let started = {
            let mut batch = self.batch.lock();
            batch
                .operation_mut(&self.spec.id)
                .is_some_and(|operation| operation.mark_running(attempt))
        };

        if started {
            debug!(attempt = attempt, "Operation attempt started");
            self.inner.sink.on_event(&BatchEvent::OperationStarted {
                batch_id: self.batch_id,
                operation_id: self.spec.id,
                attempt,
            });
        } else {
            warn!(attempt = attempt, "Operation could not enter Running; abandoning");
            self.progress.record_skipped(self.spec.id);
        }
        started
    }

    async fn attempt(&self, attempt: u32) -> AttemptOutcome {
        let request = ExecutionRequest {
            batch_id: self.batch_id,
            operation_id: self.spec.id,
            kind: self.spec.kind.clone(),
            target_element_ids: self.spec.target_element_ids.clone(),
            options: self.spec.options.clone(),
            attempt,
        };
        let attempt_token = self.cancel.child_token();
        let execution =
            AssertUnwindSafe(self.inner.executor.execute(&request, attempt_token.clone()))
                .catch_unwind();

        let outcome = match self.spec.timeout {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    attempt_token.cancel();
                    return AttemptOutcome::Failed(OperationError::timeout(limit));
                }
            },
            None => execution.await,
        };

        match outcome {
            Ok(Ok(payload)) => AttemptOutcome::Succeeded(payload),
            Ok(Err(e)) => AttemptOutcome::Failed(OperationError::executor(format!("{e:#}"))),
            Err(panic) => AttemptOutcome::Failed(OperationError::executor(format!(
                "executor panicked: {}",
                panic_message(panic.as_ref())
            ))),
        }
    }

    fn finish_completed(&self, payload: Value, attempts: u32, elapsed: Duration) {
        let completed = {
            let mut batch = self.batch.lock();
            batch
                .operation_mut(&self.spec.id)
                .is_some_and(|operation| operation.mark_completed(payload))
        };
        if !completed {
            return;
        }

        log_operation_event(
            self.batch_id,
            self.spec.id,
            OperationStatus::Completed,
            attempts,
            Some(&format!("{}ms", elapsed.as_millis())),
        );
        self.progress.record_completed(self.spec.id, elapsed);
        self.inner.sink.on_event(&BatchEvent::OperationCompleted {
            batch_id: self.batch_id,
            operation_id: self.spec.id,
            attempts,
            duration_ms: elapsed.as_millis() as u64,
        });
        self.inner.sink.on_progress(&self.progress.snapshot());
    }

    fn finish_failed(&self, error: OperationError, attempts: u32) {
        debug!(attempts = attempts, "Operation exhausted its attempts");
        fail_operation(
            &self.inner,
            &self.batch,
            &self.progress,
            self.batch_id,
            self.spec.id,
            error,
        );
        self.inner.sink.on_progress(&self.progress.snapshot());
    }

    fn finish_cancelled(&self) {
        let cancelled = {
            let mut batch = self.batch.lock();
            batch
                .operation_mut(&self.spec.id)
                .is_some_and(|operation| operation.mark_cancelled())
        };
        if !cancelled {
            return;
        }

        log_operation_event(
            self.batch_id,
            self.spec.id,
            OperationStatus::Cancelled,
            0,
            None,
        );
        self.progress.record_skipped(self.spec.id);
        self.inner.sink.on_event(&BatchEvent::OperationCancelled {
            batch_id: self.batch_id,
            operation_id: self.spec.id,
        });
    }
}

/// Mark an operation Failed and report it
fn fail_operation(
    inner: &SchedulerInner,
    batch: &SharedBatch,
    progress: &ProgressTracker,
    batch_id: BatchId,
    operation_id: OperationId,
    error: OperationError,
) {
    let attempts = {
        let mut batch = batch.lock();
        batch.operation_mut(&operation_id).and_then(|operation| {
            operation
                .mark_failed(error.clone())
                .then(|| operation.attempts())
        })
    };
    let Some(attempts) = attempts else {
        return;
    };

    log_operation_event(
        batch_id,
        operation_id,
        OperationStatus::Failed,
        attempts,
        Some(&error.to_string()),
    );
    progress.record_failed(operation_id);
    inner.sink.on_event(&BatchEvent::OperationFailed {
        batch_id,
        operation_id,
        attempts,
        error,
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
