//! Cache key and checksum derivation.
//!
//! The key says *what* a task is and picks the cache slot. The checksum says
//! whether the task's inputs changed since the slot was filled. Two tasks that
//! share a key but differ elsewhere in their config land in the same slot, and
//! the checksum mismatch is what turns the lookup into a miss.

use sha2::{Digest, Sha256};

use crate::core::task::Task;

use super::CacheError;

/// Field separator, so adjacent fields cannot run into each other.
const SEPARATOR: [u8; 1] = [0];

/// Identity digest over type, name, cache key, environment and working directory.
pub fn generate_cache_key(task: &Task) -> Result<String, CacheError> {
    let env = serde_json::to_vec(&task.config.env)?;
    let working_dir = task
        .config
        .working_dir
        .as_ref()
        .map(|dir| dir.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut hasher = Sha256::new();
    hasher.update(task.task_type.as_str().as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(task.name.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(cache_key_component(task).as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(&env);
    hasher.update(SEPARATOR);
    hasher.update(working_dir.as_bytes());

    Ok(format!("{:x}", hasher.finalize()))
}

/// Staleness digest over type, name, the full serialized config and cache key.
pub fn calculate_checksum(task: &Task) -> Result<String, CacheError> {
    let config = serde_json::to_vec(&task.config)?;

    let mut hasher = Sha256::new();
    hasher.update(task.task_type.as_str().as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(task.name.as_bytes());
    hasher.update(SEPARATOR);
    hasher.update(&config);
    hasher.update(SEPARATOR);
    hasher.update(cache_key_component(task).as_bytes());

    Ok(format!("{:x}", hasher.finalize()))
}

fn cache_key_component(task: &Task) -> &str {
    task.config
        .cache
        .as_ref()
        .and_then(|options| options.key.as_deref())
        .unwrap_or("")
}
