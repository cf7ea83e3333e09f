//! Configuration Loader
//!
//! Layers an optional configuration file (TOML, YAML or JSON, detected by
//! extension) under `BATCH_SCHEDULER__*` environment keys. Nested keys use a
//! double underscore, e.g. `BATCH_SCHEDULER__RETRY__MAX_ATTEMPTS=5`.

use super::error::ConfigResult;
use super::SchedulerConfig;
use config::{Config, Environment, File};
use std::path::Path;
use tracing::debug;

/// Prefix for scheduler environment variables
pub const ENV_PREFIX: &str = "BATCH_SCHEDULER";

impl SchedulerConfig {
    /// Load configuration from `path` with environment overrides
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_from_sources(Some(path.as_ref()), environment_source())
    }

    /// Load configuration from environment overrides only
    pub fn load_from_environment() -> ConfigResult<Self> {
        Self::load_from_sources(None, environment_source())
    }

    /// Load configuration from an optional file and an explicit environment source
    ///
    /// Exposed so tests can supply environment values without mutating the
    /// process environment.
    pub fn load_from_sources(path: Option<&Path>, environment: Environment) -> ConfigResult<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading scheduler configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: SchedulerConfig = builder
            .add_source(environment)
            .build()?
            .try_deserialize()?;

        config.validate()?;

        debug!(
            max_concurrent_operations = config.max_concurrent_operations,
            execution_mode = ?config.execution_mode,
            progress_interval_ms = config.progress_interval_ms,
            max_attempts = config.retry.max_attempts,
            "Scheduler configuration loaded"
        );

        Ok(config)
    }
}

/// Environment source for `BATCH_SCHEDULER__*` keys
pub fn environment_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .try_parsing(true)
}
