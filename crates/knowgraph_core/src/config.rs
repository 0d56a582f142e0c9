//! Store configuration.
//!
//! # Responsibility
//! - Hold the tunables of the node store and its status reporter.
//! - Load them from an optional JSON file where every field may be omitted.
//!
//! # Invariants
//! - `read_fan_out` is within `1..=MAX_READ_FAN_OUT`.
//! - All durations are strictly positive.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

/// Upper bound for concurrent per-node reads during `list()`.
pub const MAX_READ_FAN_OUT: usize = 64;

/// How `list()` treats an index payload that cannot be decoded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexDecodePolicy {
    /// Log the failure and continue with an empty index.
    #[default]
    Lenient,
    /// Fail the read with a decode error.
    Strict,
}

/// Node store tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreConfig {
    pub index_decode_policy: IndexDecodePolicy,
    /// Maximum number of node reads in flight during one `list()`.
    pub read_fan_out: usize,
    /// Longest wait for the per-store mutation lock.
    pub mutation_lock_timeout_ms: u64,
    /// How long a success status stays visible before returning to idle.
    pub success_display_ms: u64,
    /// How long an error status stays visible before returning to idle.
    pub error_display_ms: u64,
    /// SQLite busy timeout for the file-backed ledger.
    pub ledger_busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            index_decode_policy: IndexDecodePolicy::Lenient,
            read_fan_out: 8,
            mutation_lock_timeout_ms: 30_000,
            success_display_ms: 2_000,
            error_display_ms: 3_000,
            ledger_busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    /// Reads and validates a JSON config file.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|err| ConfigError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.read_fan_out == 0 || self.read_fan_out > MAX_READ_FAN_OUT {
            return Err(ConfigError::Invalid(format!(
                "read_fan_out must be within 1..={MAX_READ_FAN_OUT}, got {}",
                self.read_fan_out
            )));
        }
        for (name, value) in [
            ("mutation_lock_timeout_ms", self.mutation_lock_timeout_ms),
            ("success_display_ms", self.success_display_ms),
            ("error_display_ms", self.error_display_ms),
            ("ledger_busy_timeout_ms", self.ledger_busy_timeout_ms),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }
        Ok(())
    }

    pub fn mutation_lock_timeout(&self) -> Duration {
        Duration::from_millis(self.mutation_lock_timeout_ms)
    }

    pub fn success_display(&self) -> Duration {
        Duration::from_millis(self.success_display_ms)
    }

    pub fn error_display(&self) -> Duration {
        Duration::from_millis(self.error_display_ms)
    }

    pub fn ledger_busy_timeout(&self) -> Duration {
        Duration::from_millis(self.ledger_busy_timeout_ms)
    }
}

/// Config loading failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Io { path: String, message: String },
    Parse(String),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, message } => write!(f, "failed to read config `{path}`: {message}"),
            Self::Parse(message) => write!(f, "invalid config: {message}"),
            Self::Invalid(message) => write!(f, "invalid config value: {message}"),
        }
    }
}

impl Error for ConfigError {}
