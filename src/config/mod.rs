//! # Scheduler Configuration
//!
//! Configuration for the batch scheduler: concurrency, execution strategy,
//! progress reporting cadence and the default retry policy.
//!
//! ## Sources
//!
//! - [`SchedulerConfig::default()`] for built-in defaults
//! - [`SchedulerConfig::from_env()`] for `BATCH_SCHEDULER_*` overrides on top of the defaults
//! - [`SchedulerConfig::load()`] for a TOML/YAML file layered under `BATCH_SCHEDULER__*` environment keys
//!
//! ## Usage
//!
//! ```rust
//! use batch_scheduler::config::{ExecutionMode, SchedulerConfig};
//!
//! let config = SchedulerConfig::default()
//!     .with_max_concurrent_operations(8)
//!     .with_execution_mode(ExecutionMode::Parallel);
//! assert!(config.validate().is_ok());
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use crate::models::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ENV_PREFIX;

/// Strategy used to drive a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Fan out ready operations up to the concurrency limit
    #[default]
    Parallel,
    /// Walk the execution order one operation at a time
    Sequential,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "parallel" => Ok(Self::Parallel),
            "sequential" => Ok(Self::Sequential),
            _ => Err(format!("Invalid execution mode: {s}")),
        }
    }
}

/// Root scheduler configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of operations running at once within one batch
    pub max_concurrent_operations: usize,
    /// Parallel (default) or sequential execution
    pub execution_mode: ExecutionMode,
    /// Interval of the background progress heartbeat
    pub progress_interval_ms: u64,
    /// Timeout applied to operations that do not declare their own
    pub default_operation_timeout_ms: Option<u64>,
    /// Number of completed-operation durations kept for the ETA average
    pub eta_window_size: usize,
    /// Capacity of the broadcast channel used by `EventPublisher`
    pub event_buffer_size: usize,
    /// Retry policy applied to operations that do not declare their own
    pub retry: RetryPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_operations: defaults::MAX_CONCURRENT_OPERATIONS,
            execution_mode: ExecutionMode::Parallel,
            progress_interval_ms: defaults::PROGRESS_INTERVAL_MS,
            default_operation_timeout_ms: None,
            eta_window_size: defaults::ETA_WINDOW_SIZE,
            event_buffer_size: defaults::EVENT_BUFFER_SIZE,
            retry: RetryPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_max_concurrent_operations(mut self, max: usize) -> Self {
        self.max_concurrent_operations = max;
        self
    }

    pub fn with_execution_mode(mut self, mode: ExecutionMode) -> Self {
        self.execution_mode = mode;
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_default_operation_timeout(mut self, timeout: Duration) -> Self {
        self.default_operation_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_eta_window_size(mut self, size: usize) -> Self {
        self.eta_window_size = size;
        self
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn default_operation_timeout(&self) -> Option<Duration> {
        self.default_operation_timeout_ms.map(Duration::from_millis)
    }

    /// Build configuration from defaults plus `BATCH_SCHEDULER_*` environment overrides
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();

        if let Some(value) = read_env("MAX_CONCURRENT_OPERATIONS") {
            config.max_concurrent_operations = parse_env("MAX_CONCURRENT_OPERATIONS", &value)?;
        }

        if let Some(value) = read_env("EXECUTION_MODE") {
            config.execution_mode = value.parse().map_err(|reason| {
                ConfigurationError::invalid_environment(env_name("EXECUTION_MODE"), reason)
            })?;
        }

        if let Some(value) = read_env("PROGRESS_INTERVAL_MS") {
            config.progress_interval_ms = parse_env("PROGRESS_INTERVAL_MS", &value)?;
        }

        if let Some(value) = read_env("DEFAULT_OPERATION_TIMEOUT_MS") {
            config.default_operation_timeout_ms =
                Some(parse_env("DEFAULT_OPERATION_TIMEOUT_MS", &value)?);
        }

        if let Some(value) = read_env("RETRY_MAX_ATTEMPTS") {
            config.retry.max_attempts = parse_env("RETRY_MAX_ATTEMPTS", &value)?;
        }

        if let Some(value) = read_env("RETRY_BASE_BACKOFF_MS") {
            config.retry.base_backoff_ms = parse_env("RETRY_BASE_BACKOFF_MS", &value)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the scheduler cannot honor
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_concurrent_operations == 0 {
            return Err(ConfigurationError::invalid_value(
                "max_concurrent_operations",
                "0",
                "must be at least 1",
            ));
        }
        if self.progress_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "progress_interval_ms",
                "0",
                "must be greater than zero",
            ));
        }
        if self.eta_window_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "eta_window_size",
                "0",
                "must be at least 1",
            ));
        }
        if self.event_buffer_size == 0 {
            return Err(ConfigurationError::invalid_value(
                "event_buffer_size",
                "0",
                "must be at least 1",
            ));
        }
        self.retry.validate()
    }
}

fn env_name(key: &str) -> String {
    format!("{ENV_PREFIX}_{key}")
}

fn read_env(key: &str) -> Option<String> {
    std::env::var(env_name(key)).ok()
}

fn parse_env<T>(key: &str, value: &str) -> ConfigResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigurationError::invalid_environment(env_name(key), e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = SchedulerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_concurrent_operations, 4);
        assert_eq!(config.execution_mode, ExecutionMode::Parallel);
        assert_eq!(config.progress_interval(), Duration::from_secs(1));
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.default_operation_timeout().is_none());
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = SchedulerConfig::default().with_max_concurrent_operations(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_operations"));
    }

    #[test]
    fn test_invalid_retry_policy_is_rejected() {
        let retry = RetryPolicy {
            multiplier: 0.5,
            ..RetryPolicy::default()
        };
        let config = SchedulerConfig::default().with_retry_policy(retry);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_execution_mode_parsing() {
        assert_eq!("Sequential".parse(), Ok(ExecutionMode::Sequential));
        assert_eq!("parallel".parse(), Ok(ExecutionMode::Parallel));
        assert!("round_robin".parse::<ExecutionMode>().is_err());
    }
}
