//! Configuration loading and parsing.
//!
//! This module provides the engine settings and the YAML task file format
//! consumed by the command-line tool.

mod error;
mod types;
mod yaml;

pub use error::ConfigError;
pub use types::{
    CacheConfig, DEFAULT_MAX_CONCURRENCY, DEFAULT_RETRY_DELAY_MS, DEFAULT_SWEEP_INTERVAL_MS,
    DEFAULT_TIMEOUT_MS, EngineConfig,
};
pub use yaml::{CacheDefinition, TaskDefinition, TaskFile, TaskFileLoader};
