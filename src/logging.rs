//! # Structured Logging Module
//!
//! Environment-aware structured logging for the scheduler's async
//! coordination loop and its units of work.
//!
//! The level follows `BATCH_SCHEDULER_ENV` (`production` logs at `info`,
//! everything else at `debug`) unless `RUST_LOG` is set. Output is
//! human-readable by default; `BATCH_SCHEDULER_LOG_FORMAT=json` switches the
//! console layer to JSON lines.

use crate::models::{BatchId, OperationId};
use crate::state_machine::{BatchStatus, OperationStatus};
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

const ENVIRONMENT_VAR: &str = "BATCH_SCHEDULER_ENV";
const LOG_FORMAT_VAR: &str = "BATCH_SCHEDULER_LOG_FORMAT";

/// Initialize structured logging with environment-specific configuration
///
/// Safe to call more than once and safe to call when the host application
/// already installed a global subscriber.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let json = use_json_format();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));

        let console = if json {
            fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .boxed()
        };

        let subscriber = tracing_subscriber::registry()
            .with(console.with_filter(filter));

        // Another global subscriber (e.g. from the host application) is fine
        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Current environment name
fn get_environment() -> String {
    std::env::var(ENVIRONMENT_VAR)
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Default log level for an environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

fn use_json_format() -> bool {
    std::env::var(LOG_FORMAT_VAR)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Uniform record for a batch lifecycle step (`started`, `finished`,
/// `cancel_requested`, `abandoned`)
pub fn log_batch_operation(
    operation: &str,
    batch_id: BatchId,
    status: BatchStatus,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        batch_id = %batch_id,
        status = %status,
        details = details,
        "BATCH_OPERATION"
    );
}

/// Uniform record for an operation reaching a terminal status
///
/// Failures are logged at `warn`, everything else at `info`.
pub fn log_operation_event(
    batch_id: BatchId,
    operation_id: OperationId,
    status: OperationStatus,
    attempts: u32,
    details: Option<&str>,
) {
    if status == OperationStatus::Failed {
        tracing::warn!(
            batch_id = %batch_id,
            operation_id = %operation_id,
            status = %status,
            attempts = attempts,
            details = details,
            "OPERATION_EVENT"
        );
    } else {
        tracing::info!(
            batch_id = %batch_id,
            operation_id = %operation_id,
            status = %status,
            attempts = attempts,
            details = details,
            "OPERATION_EVENT"
        );
    }
}

/// Error that the scheduler absorbed instead of returning
pub fn log_error(
    component: &str,
    operation: &str,
    error: &dyn std::fmt::Display,
    batch_id: Option<BatchId>,
) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        batch_id = ?batch_id,
        "ERROR"
    );
}
