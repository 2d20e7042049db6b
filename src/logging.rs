//! # Structured Logging Module
//!
//! Environment-aware structured logging that outputs to the console and to a
//! JSON log file per worker process. The library itself only emits `tracing`
//! events; installing a subscriber is left to the process hosting the worker.

use chrono::Utc;
use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;
use std::time::Duration;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::job::JobOutcome;

static LOG_GUARD: OnceLock<Option<WorkerGuard>> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOG_GUARD.get_or_init(|| {
        let environment = get_environment();
        let log_level = get_log_level(&environment);
        let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));

        let console = fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(filter());

        let log_dir = PathBuf::from("log");
        if let Err(e) = fs::create_dir_all(&log_dir) {
            // Console-only when the log directory is unusable
            let _ = tracing_subscriber::registry().with(console).try_init();
            tracing::warn!(error = %e, "Could not create log directory, logging to console only");
            return None;
        }

        // Log file name carries environment, PID and timestamp
        let pid = process::id();
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S").to_string();
        let log_filename = format!("worker.{environment}.{pid}.{timestamp}.log");
        let file_appender = tracing_appender::rolling::never(&log_dir, &log_filename);
        let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

        let subscriber = tracing_subscriber::registry().with(console).with(
            fmt::layer()
                .with_writer(file_writer)
                .with_target(true)
                .with_thread_names(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter()),
        );

        // A global subscriber may already be installed by the host process
        if subscriber.try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = pid,
            environment = %environment,
            log_file = %log_dir.join(&log_filename).display(),
            "🔧 STRUCTURED LOGGING: Initialized with file output"
        );

        Some(guard)
    });
}

/// Get current environment from environment variables
fn get_environment() -> String {
    std::env::var("POWERHOSE_ENV")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> String {
    match environment {
        "test" => "debug".to_string(),
        "development" => "debug".to_string(),
        "production" => "info".to_string(),
        _ => "debug".to_string(),
    }
}

/// Log structured data for worker lifecycle operations
pub fn log_worker_operation(operation: &str, identity: &str, status: &str, details: Option<&str>) {
    tracing::info!(
        operation = %operation,
        identity = %identity,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "👷 WORKER_OPERATION"
    );
}

/// Log structured data for an executed job
pub fn log_job_execution(identity: &str, elapsed: Duration, outcome: &JobOutcome) {
    let elapsed_us = elapsed.as_micros() as u64;
    match outcome {
        JobOutcome::Completed(result) => tracing::debug!(
            identity = %identity,
            elapsed_us = elapsed_us,
            result_bytes = result.len(),
            status = "completed",
            "🔧 JOB_EXECUTION"
        ),
        JobOutcome::Failed(error) => tracing::warn!(
            identity = %identity,
            elapsed_us = elapsed_us,
            error = %error,
            status = "failed",
            "🔧 JOB_EXECUTION"
        ),
    }
}

/// Log error with full context
pub fn log_error(component: &str, operation: &str, error: &str, context: Option<&str>) {
    tracing::error!(
        component = %component,
        operation = %operation,
        error = %error,
        context = context,
        timestamp = %Utc::now().to_rfc3339(),
        "❌ ERROR"
    );
}
