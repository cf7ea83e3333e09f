//! # Operation
//!
//! One schedulable unit of work: what to do ([`OperationKind`]), which
//! elements it acts on, its declared dependencies, priority and retry policy,
//! plus the mutable lifecycle fields the scheduler updates as it runs.

use crate::config::{ConfigResult, ConfigurationError};
use crate::constants::{defaults, priority};
use crate::error::OperationError;
use crate::models::{OperationId, OperationOptions};
use crate::state_machine::OperationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// Business operation performed by the external executor
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Merge,
    Split,
    Validate,
    Transform,
    Export,
    /// Executor-defined operation identified by name
    Custom(String),
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Merge => write!(f, "merge"),
            Self::Split => write!(f, "split"),
            Self::Validate => write!(f, "validate"),
            Self::Transform => write!(f, "transform"),
            Self::Export => write!(f, "export"),
            Self::Custom(name) => write!(f, "custom:{name}"),
        }
    }
}

impl std::str::FromStr for OperationKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "merge" => Ok(Self::Merge),
            "split" => Ok(Self::Split),
            "validate" => Ok(Self::Validate),
            "transform" => Ok(Self::Transform),
            "export" => Ok(Self::Export),
            other => match other.strip_prefix("custom:") {
                Some(name) if !name.is_empty() => Ok(Self::Custom(name.to_string())),
                _ => Err(format!("Invalid operation kind: {s}")),
            },
        }
    }
}

/// Retry policy for an operation
///
/// The delay before attempt `n + 1` is `base_backoff * multiplier^(n - 1)`,
/// capped at `max_backoff`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub multiplier: f64,
    pub max_backoff_ms: u64,
    /// Add up to 10% of the delay on top; never shortens it
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::MAX_ATTEMPTS,
            base_backoff_ms: defaults::BASE_BACKOFF_MS,
            multiplier: defaults::BACKOFF_MULTIPLIER,
            max_backoff_ms: defaults::MAX_BACKOFF_MS,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    /// A policy that makes exactly one attempt
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_backoff(mut self, base: Duration, multiplier: f64, max: Duration) -> Self {
        self.base_backoff_ms = base.as_millis() as u64;
        self.multiplier = multiplier;
        self.max_backoff_ms = max.as_millis() as u64;
        self
    }

    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_attempts == 0 {
            return Err(ConfigurationError::invalid_value(
                "retry.max_attempts",
                "0",
                "must be at least 1",
            ));
        }
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            return Err(ConfigurationError::invalid_value(
                "retry.multiplier",
                self.multiplier.to_string(),
                "must be a finite number >= 1.0",
            ));
        }
        if self.max_backoff_ms < self.base_backoff_ms {
            return Err(ConfigurationError::invalid_value(
                "retry.max_backoff_ms",
                self.max_backoff_ms.to_string(),
                "must not be smaller than retry.base_backoff_ms",
            ));
        }
        Ok(())
    }
}

/// A schedulable unit of work
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub id: OperationId,
    /// Optional human-readable label used in logs and results
    pub name: Option<String>,
    pub kind: OperationKind,
    /// Opaque element identifiers, in caller order
    pub target_element_ids: Vec<String>,
    pub options: OperationOptions,
    /// 1-10, higher runs first among equally-ready operations
    pub priority: u8,
    /// Operations that must be Completed before this one may start
    pub dependencies: Vec<OperationId>,
    /// Falls back to the scheduler's configured policy when absent
    pub retry_policy: Option<RetryPolicy>,
    /// Falls back to the scheduler's default timeout when absent
    pub timeout_ms: Option<u64>,
    pub created_at: DateTime<Utc>,

    pub(crate) status: OperationStatus,
    pub(crate) attempts: u32,
    pub(crate) started_at: Option<DateTime<Utc>>,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) result: Option<Value>,
    pub(crate) error: Option<OperationError>,
}

impl Operation {
    /// Create a pending operation with default priority and no dependencies
    pub fn new(kind: OperationKind, target_element_ids: Vec<String>) -> Self {
        Self {
            id: OperationId::new(),
            name: None,
            kind,
            target_element_ids,
            options: OperationOptions::default(),
            priority: priority::DEFAULT,
            dependencies: Vec::new(),
            retry_policy: None,
            timeout_ms: None,
            created_at: Utc::now(),
            status: OperationStatus::Pending,
            attempts: 0,
            started_at: None,
            completed_at: None,
            result: None,
            error: None,
        }
    }

    pub fn with_id(mut self, id: OperationId) -> Self {
        self.id = id;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority;
        self
    }

    /// Replace the dependency set; duplicates are dropped, order preserved
    pub fn with_dependencies(mut self, dependencies: impl IntoIterator<Item = OperationId>) -> Self {
        self.dependencies.clear();
        for dependency in dependencies {
            self.push_dependency(dependency);
        }
        self
    }

    pub fn depends_on(mut self, dependency: OperationId) -> Self {
        self.push_dependency(dependency);
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    fn push_dependency(&mut self, dependency: OperationId) {
        if !self.dependencies.contains(&dependency) {
            self.dependencies.push(dependency);
        }
    }

    /// Label used in logs: the name if set, otherwise the id
    pub fn label(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.id.to_string())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn status(&self) -> OperationStatus {
        self.status
    }

    /// Number of executor attempts made so far
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&OperationError> {
        self.error.as_ref()
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Wall-clock time between first start and terminal transition
    pub fn duration(&self) -> Option<Duration> {
        match (self.started_at, self.completed_at) {
            (Some(start), Some(end)) => (end - start).to_std().ok(),
            _ => None,
        }
    }

    fn transition(&mut self, next: OperationStatus) -> bool {
        if !self.status.can_transition_to(next) {
            warn!(
                operation_id = %self.id,
                from = %self.status,
                to = %next,
                "Rejected invalid operation transition"
            );
            return false;
        }
        self.status = next;
        true
    }

    pub(crate) fn mark_queued(&mut self) -> bool {
        self.transition(OperationStatus::Queued)
    }

    pub(crate) fn mark_running(&mut self, attempt: u32) -> bool {
        if !self.transition(OperationStatus::Running) {
            return false;
        }
        self.attempts = attempt;
        self.started_at.get_or_insert_with(Utc::now);
        true
    }

    pub(crate) fn mark_completed(&mut self, payload: Value) -> bool {
        if !self.transition(OperationStatus::Completed) {
            return false;
        }
        self.result = Some(payload);
        self.error = None;
        self.completed_at = Some(Utc::now());
        true
    }

    pub(crate) fn mark_failed(&mut self, error: OperationError) -> bool {
        if !self.transition(OperationStatus::Failed) {
            return false;
        }
        self.error = Some(error);
        self.completed_at = Some(Utc::now());
        true
    }

    pub(crate) fn mark_cancelled(&mut self) -> bool {
        if !self.transition(OperationStatus::Cancelled) {
            return false;
        }
        self.error = Some(OperationError::cancelled());
        self.completed_at = Some(Utc::now());
        true
    }

    pub(crate) fn mark_skipped(&mut self) -> bool {
        if !self.transition(OperationStatus::Skipped) {
            return false;
        }
        self.completed_at = Some(Utc::now());
        true
    }
}
