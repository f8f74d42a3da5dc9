//! Engine configuration.
//!
//! Defaults favour small, frequent commitments. Every field can be overridden
//! from the environment with [`EngineConfig::from_env`]:
//!
//! | Variable | Field |
//! |----------|-------|
//! | `SEALBATCH_MAX_BATCH_SIZE` | `max_batch_size` |
//! | `SEALBATCH_BATCH_TIMEOUT_MS` | `batch_timeout` |
//! | `SEALBATCH_BATCHING_ENABLED` | `batching_enabled` |
//! | `SEALBATCH_SUBMIT_TIMEOUT_MS` | `submit_timeout` |
//! | `SEALBATCH_FALLBACK_CLOCK_START` | `fallback_clock_start` |
//! | `SEALBATCH_MAX_PENDING` | `max_pending` |

use std::time::Duration;

use crate::error::{Error, Result};

// =============================================================================
// Defaults
// =============================================================================

/// Records per batch before the size trigger fires.
pub const DEFAULT_MAX_BATCH_SIZE: usize = 10;

/// Upper bound accepted for `max_batch_size`.
pub const MAX_BATCH_SIZE_LIMIT: usize = 100;

/// Time trigger, measured from the oldest queued record.
pub const DEFAULT_BATCH_TIMEOUT_MS: u64 = 5_000;

/// Bound on a single adapter submission.
pub const DEFAULT_SUBMIT_TIMEOUT_MS: u64 = 30_000;

/// Records allowed to wait in the queue before producers are held back.
pub const DEFAULT_MAX_PENDING: usize = 1_000;

/// Upper bound accepted for `max_pending`.
pub const MAX_PENDING_LIMIT: usize = 1_000_000;

const ENV_MAX_BATCH_SIZE: &str = "SEALBATCH_MAX_BATCH_SIZE";
const ENV_BATCH_TIMEOUT_MS: &str = "SEALBATCH_BATCH_TIMEOUT_MS";
const ENV_BATCHING_ENABLED: &str = "SEALBATCH_BATCHING_ENABLED";
const ENV_SUBMIT_TIMEOUT_MS: &str = "SEALBATCH_SUBMIT_TIMEOUT_MS";
const ENV_FALLBACK_CLOCK_START: &str = "SEALBATCH_FALLBACK_CLOCK_START";
const ENV_MAX_PENDING: &str = "SEALBATCH_MAX_PENDING";

// =============================================================================
// Engine Configuration
// =============================================================================

/// Configuration for an [`Engine`](crate::api::Engine).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Size trigger. Must be in `1..=MAX_BATCH_SIZE_LIMIT`.
    pub max_batch_size: usize,

    /// Time trigger. Must be non-zero.
    pub batch_timeout: Duration,

    /// When false, every `compress` call seals its record immediately.
    pub batching_enabled: bool,

    /// Bound on one adapter call. Must be non-zero.
    pub submit_timeout: Duration,

    /// Initial logical clock of the fallback compressor. Must leave room
    /// for at least one fallback commitment.
    pub fallback_clock_start: u64,

    /// Queue capacity. Must be in `max_batch_size..=MAX_PENDING_LIMIT`.
    pub max_pending: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_batch_size: DEFAULT_MAX_BATCH_SIZE,
            batch_timeout: Duration::from_millis(DEFAULT_BATCH_TIMEOUT_MS),
            batching_enabled: true,
            submit_timeout: Duration::from_millis(DEFAULT_SUBMIT_TIMEOUT_MS),
            fallback_clock_start: 0,
            max_pending: DEFAULT_MAX_PENDING,
        }
    }
}

impl EngineConfig {
    /// Checks every field.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 || self.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return Err(Error::InvalidConfig {
                field: "max_batch_size",
                reason: format!(
                    "must be between 1 and {} (got {})",
                    MAX_BATCH_SIZE_LIMIT, self.max_batch_size
                ),
            });
        }
        if self.batch_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                field: "batch_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.submit_timeout.is_zero() {
            return Err(Error::InvalidConfig {
                field: "submit_timeout",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.fallback_clock_start == u64::MAX {
            return Err(Error::InvalidConfig {
                field: "fallback_clock_start",
                reason: "leaves no clock values for fallback commitments".to_string(),
            });
        }
        if self.max_pending < self.max_batch_size || self.max_pending > MAX_PENDING_LIMIT {
            return Err(Error::InvalidConfig {
                field: "max_pending",
                reason: format!(
                    "must be between max_batch_size ({}) and {} (got {})",
                    self.max_batch_size, MAX_PENDING_LIMIT, self.max_pending
                ),
            });
        }
        Ok(())
    }

    /// Defaults overlaid with `SEALBATCH_*` environment variables, validated.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Like [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(value) = lookup(ENV_MAX_BATCH_SIZE) {
            config.max_batch_size = parse("max_batch_size", &value)?;
        }
        if let Some(value) = lookup(ENV_BATCH_TIMEOUT_MS) {
            config.batch_timeout = Duration::from_millis(parse("batch_timeout", &value)?);
        }
        if let Some(value) = lookup(ENV_BATCHING_ENABLED) {
            config.batching_enabled = parse_bool("batching_enabled", &value)?;
        }
        if let Some(value) = lookup(ENV_SUBMIT_TIMEOUT_MS) {
            config.submit_timeout = Duration::from_millis(parse("submit_timeout", &value)?);
        }
        if let Some(value) = lookup(ENV_FALLBACK_CLOCK_START) {
            config.fallback_clock_start = parse("fallback_clock_start", &value)?;
        }
        if let Some(value) = lookup(ENV_MAX_PENDING) {
            config.max_pending = parse("max_pending", &value)?;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse<T: std::str::FromStr>(field: &'static str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| Error::InvalidConfig {
        field,
        reason: format!("cannot parse {:?}: {}", value, e),
    })
}

fn parse_bool(field: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::InvalidConfig {
            field,
            reason: format!("cannot parse {:?} as a boolean", value),
        }),
    }
}
