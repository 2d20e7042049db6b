//! # Worker Configuration
//!
//! Layered configuration for a worker process: built-in defaults, then an
//! optional file (format picked from its extension), then `POWERHOSE_*`
//! environment variables. Nested keys use a double underscore, e.g.
//! `POWERHOSE_HEARTBEAT__MAX_FAILURES=5`.

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

use crate::constants::{defaults, seconds_to_duration, CONFIG_ENV_PREFIX, MIN_TIMEOUT};
use crate::error::ConfigurationError;

/// Heartbeat policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Delay between liveness pings. Must be shorter than the worker timeout.
    #[serde(default = "default_heartbeat_interval")]
    pub interval_seconds: f64,

    /// Consecutive failed heartbeats before the worker declares itself unresponsive
    #[serde(default = "default_max_failures")]
    pub max_failures: u32,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_seconds: defaults::HEARTBEAT_INTERVAL_SECONDS,
            max_failures: defaults::HEARTBEAT_MAX_FAILURES,
        }
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        seconds_to_duration(self.interval_seconds)
    }
}

/// Worker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Dispatcher endpoint the worker registers with
    pub endpoint: String,

    /// Identity template; `$WID` is replaced by the process id
    pub identity: String,

    /// Applied to job polling and to every registration or heartbeat round trip
    #[serde(default = "default_timeout")]
    pub timeout_seconds: f64,

    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Pause before the channels are torn down on shutdown
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

fn default_timeout() -> f64 {
    defaults::TIMEOUT_SECONDS
}

fn default_heartbeat_interval() -> f64 {
    defaults::HEARTBEAT_INTERVAL_SECONDS
}

fn default_max_failures() -> u32 {
    defaults::HEARTBEAT_MAX_FAILURES
}

fn default_shutdown_grace_ms() -> u64 {
    defaults::SHUTDOWN_GRACE_MS
}

impl WorkerConfig {
    /// Configuration with default timeouts for the given endpoint and identity
    pub fn new(endpoint: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            identity: identity.into(),
            timeout_seconds: defaults::TIMEOUT_SECONDS,
            heartbeat: HeartbeatConfig::default(),
            shutdown_grace_ms: defaults::SHUTDOWN_GRACE_MS,
        }
    }

    /// Load from an optional file and `POWERHOSE_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_prefix(path, CONFIG_ENV_PREFIX)
    }

    /// Load using a custom environment variable prefix
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, ConfigurationError> {
        let mut builder = Config::builder()
            .set_default("timeout_seconds", defaults::TIMEOUT_SECONDS)?
            .set_default(
                "heartbeat.interval_seconds",
                defaults::HEARTBEAT_INTERVAL_SECONDS,
            )?
            .set_default(
                "heartbeat.max_failures",
                i64::from(defaults::HEARTBEAT_MAX_FAILURES),
            )?
            .set_default("shutdown_grace_ms", defaults::SHUTDOWN_GRACE_MS as i64)?;

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading worker configuration file");
            builder = builder.add_source(File::from(path).required(true));
        }

        let config: WorkerConfig = builder
            .add_source(
                Environment::with_prefix(env_prefix)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the worker cannot run with
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.endpoint.trim().is_empty() {
            return Err(ConfigurationError::invalid("endpoint", "must not be empty"));
        }
        if self.identity.trim().is_empty() {
            return Err(ConfigurationError::invalid("identity", "must not be empty"));
        }
        check_seconds("timeout_seconds", self.timeout_seconds)?;
        check_seconds("heartbeat.interval_seconds", self.heartbeat.interval_seconds)?;
        if self.heartbeat.interval_seconds >= self.timeout_seconds {
            return Err(ConfigurationError::invalid(
                "heartbeat.interval_seconds",
                format!(
                    "must be shorter than timeout_seconds ({} >= {})",
                    self.heartbeat.interval_seconds, self.timeout_seconds
                ),
            ));
        }
        if self.heartbeat.max_failures == 0 {
            return Err(ConfigurationError::invalid(
                "heartbeat.max_failures",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        seconds_to_duration(self.timeout_seconds)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// A duration in seconds must convert to at least [`MIN_TIMEOUT`]
fn check_seconds(field: &'static str, seconds: f64) -> Result<(), ConfigurationError> {
    match Duration::try_from_secs_f64(seconds) {
        Ok(duration) if duration >= MIN_TIMEOUT => Ok(()),
        Ok(_) => Err(ConfigurationError::invalid(
            field,
            format!("must be at least {}ms, got {seconds}", MIN_TIMEOUT.as_millis()),
        )),
        Err(_) => Err(ConfigurationError::invalid(
            field,
            format!("must be a positive number of seconds within range, got {seconds}"),
        )),
    }
}
