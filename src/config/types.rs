//! Engine configuration.
//!
//! Durations are expressed in milliseconds so the structures read naturally
//! in YAML. Every field has a default, so an empty document is a valid
//! configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::cache::{DEFAULT_MAX_SIZE, DEFAULT_TTL};
use crate::core::retry::RetryPolicy;

use super::error::ConfigError;

pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_SWEEP_INTERVAL_MS: u64 = 60_000;

/// Settings for a [`TaskEngine`](crate::TaskEngine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of tasks running at once.
    pub max_concurrency: usize,
    /// Retries after the first failed attempt.
    pub retry_attempts: u32,
    /// Delay between attempts.
    pub retry_delay_ms: u64,
    /// Per-attempt timeout for tasks without their own.
    pub default_timeout_ms: u64,
    pub cache: CacheConfig,
}

impl EngineConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Retry policy applied to every task.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_attempts, self.retry_delay())
    }

    /// Check that the configuration can drive an engine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrency == 0 {
            return Err(ConfigError::InvalidConfig(
                "max_concurrency cannot be zero".into(),
            ));
        }
        if self.default_timeout_ms == 0 {
            return Err(ConfigError::InvalidConfig(
                "default_timeout_ms cannot be zero".into(),
            ));
        }
        if self.cache.sweep_interval_ms == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "cache.sweep_interval_ms cannot be zero, use null to disable".into(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            retry_attempts: 0,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            cache: CacheConfig::default(),
        }
    }
}

/// Result cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries; zero disables caching.
    pub max_size: usize,
    /// TTL for entries whose task does not set one.
    pub default_ttl_ms: u64,
    /// Interval of the background expiry sweep; `None` disables it.
    pub sweep_interval_ms: Option<u64>,
}

impl CacheConfig {
    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_ms.map(Duration::from_millis)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            default_ttl_ms: DEFAULT_TTL.as_millis() as u64,
            sweep_interval_ms: Some(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}
