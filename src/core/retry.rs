//! Retry policy applied by the engine to failing tasks.
//!
//! Every failure is retried the same way: executor failures, executor errors
//! and timeouts alike, separated by a uniform delay.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Retry policy for task execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retry attempts, not including the initial attempt (0 = no retries).
    /// For example, `max_retries = 3` means up to 3 retries after the initial failure,
    /// for a total of 4 attempts.
    pub max_retries: u32,

    /// Fixed delay between attempts.
    #[serde(with = "serde_duration")]
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy with no retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            delay: Duration::ZERO,
        }
    }

    /// Create a policy with fixed delay retries.
    pub fn fixed(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    /// Total number of executor invocations allowed.
    pub fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Check if another attempt is allowed given the attempts already made.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.total_attempts()
    }
}

impl Default for RetryPolicy {
    /// Default policy: no retries.
    fn default() -> Self {
        Self::none()
    }
}

/// Serializes Duration as milliseconds.
mod serde_duration {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        (duration.as_millis() as u64).serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
