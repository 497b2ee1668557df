//! Content-addressed memoization of task results.
//!
//! Results are stored under a digest of the task's identity and validated on
//! every lookup against a second digest of its full configuration. Entries
//! also expire by TTL and are evicted oldest-first when the store is full.

mod digest;
mod manager;

use thiserror::Error;

pub use digest::{calculate_checksum, generate_cache_key};
pub use manager::{
    CacheEntry, CacheManager, CacheStats, DEFAULT_MAX_SIZE, DEFAULT_TTL, SweeperHandle,
};

/// Errors raised by the cache.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The task configuration could not be serialized for hashing.
    #[error("failed to serialize task for hashing: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An invalidation pattern is not a valid regular expression.
    #[error("invalid invalidation pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}
