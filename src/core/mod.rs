//! Core data model and dependency resolution.

pub mod environment;
pub mod resolver;
pub mod result;
pub mod retry;
pub mod task;
pub mod types;
