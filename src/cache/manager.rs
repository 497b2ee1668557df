//! In-memory result cache with TTL, checksum validation and size-bounded eviction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use regex::Regex;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::core::result::TaskResult;
use crate::core::task::Task;

use super::CacheError;
use super::digest::{calculate_checksum, generate_cache_key};

/// Default number of entries kept before eviction starts.
pub const DEFAULT_MAX_SIZE: usize = 1000;

/// Default entry lifetime.
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

/// A cached task result.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Identity digest the entry is stored under.
    pub key: String,
    pub result: TaskResult,
    /// When the entry was written.
    pub timestamp: Instant,
    pub ttl: Duration,
    /// Staleness digest of the task config that produced the result.
    pub checksum: String,
    /// Insertion order, breaks timestamp ties during eviction.
    sequence: u64,
}

impl CacheEntry {
    /// Whether the entry outlived its TTL at `now`.
    pub fn is_expired(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.timestamp) > self.ttl
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheStats {
    pub entries: usize,
    pub max_size: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[derive(Default)]
struct CacheStore {
    entries: HashMap<String, CacheEntry>,
    next_sequence: u64,
}

/// Content-addressed memo store for task results.
///
/// Only tasks whose config carries [`CacheOptions`](crate::CacheOptions)
/// are looked up or stored.
pub struct CacheManager {
    store: RwLock<CacheStore>,
    max_size: usize,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    /// Create a cache holding at most `max_size` entries.
    ///
    /// A `max_size` of zero disables storage.
    pub fn new(max_size: usize, default_ttl: Duration) -> Self {
        Self {
            store: RwLock::new(CacheStore::default()),
            max_size,
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Look up a valid cached result for `task`.
    ///
    /// Returns `None` when the task does not opt into caching, no entry
    /// exists, the entry expired, or the task config no longer matches the
    /// stored checksum. Expired and stale entries are removed.
    pub async fn get(&self, task: &Task) -> Result<Option<TaskResult>, CacheError> {
        if !task.is_cacheable() {
            return Ok(None);
        }

        let key = generate_cache_key(task)?;
        let mut store = self.store.write().await;

        let Some(entry) = store.entries.get(&key) else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            trace!(task = %task.id, "cache miss");
            return Ok(None);
        };

        if entry.is_expired(Instant::now()) {
            store.entries.remove(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(task = %task.id, "cache entry expired");
            return Ok(None);
        }

        let checksum = calculate_checksum(task)?;
        if entry.checksum != checksum {
            store.entries.remove(&key);
            self.misses.fetch_add(1, Ordering::Relaxed);
            debug!(task = %task.id, "cache entry stale, config changed");
            return Ok(None);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        trace!(task = %task.id, "cache hit");
        Ok(Some(entry.result.clone()))
    }

    /// Store a result for `task`.
    ///
    /// When the cache is full and `task` maps to a new slot, the single
    /// oldest entry is evicted first.
    pub async fn set(&self, task: &Task, result: &TaskResult) -> Result<(), CacheError> {
        let Some(options) = task.config.cache.as_ref() else {
            return Ok(());
        };
        if self.max_size == 0 {
            return Ok(());
        }

        let key = generate_cache_key(task)?;
        let checksum = calculate_checksum(task)?;
        let ttl = options.ttl.unwrap_or(self.default_ttl);

        let mut store = self.store.write().await;
        if !store.entries.contains_key(&key) && store.entries.len() >= self.max_size {
            self.evict_oldest(&mut store);
        }

        let sequence = store.next_sequence;
        store.next_sequence += 1;
        store.entries.insert(
            key.clone(),
            CacheEntry {
                key,
                result: result.clone(),
                timestamp: Instant::now(),
                ttl,
                checksum,
                sequence,
            },
        );

        Ok(())
    }

    fn evict_oldest(&self, store: &mut CacheStore) {
        let oldest = store
            .entries
            .values()
            .min_by_key(|entry| (entry.timestamp, entry.sequence))
            .map(|entry| entry.key.clone());

        if let Some(key) = oldest {
            store.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "evicted oldest cache entry");
        }
    }

    /// Remove entries.
    ///
    /// Without a pattern everything is cleared. A pattern is a regular
    /// expression matched against the raw key digests, not task names.
    /// Returns the number of removed entries.
    pub async fn invalidate(&self, pattern: Option<&str>) -> Result<usize, CacheError> {
        let mut store = self.store.write().await;
        let before = store.entries.len();

        match pattern {
            None => store.entries.clear(),
            Some(pattern) => {
                let regex = Regex::new(pattern)?;
                store.entries.retain(|key, _| !regex.is_match(key));
            }
        }

        let removed = before - store.entries.len();
        debug!(removed, pattern = ?pattern, "cache invalidated");
        Ok(removed)
    }

    /// Drop every TTL-expired entry. Returns the number removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut store = self.store.write().await;
        let before = store.entries.len();
        store.entries.retain(|_, entry| !entry.is_expired(now));
        before - store.entries.len()
    }

    /// Whether an entry exists under the given raw key.
    pub async fn contains_key(&self, key: &str) -> bool {
        self.store.read().await.entries.contains_key(key)
    }

    /// Raw keys currently stored.
    pub async fn keys(&self) -> Vec<String> {
        self.store.read().await.entries.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.entries.is_empty()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len().await,
            max_size: self.max_size,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Periodically sweep expired entries on the current tokio runtime.
    ///
    /// The sweep stops when the returned handle is dropped or the cache
    /// itself is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> SweeperHandle {
        let cache: Weak<Self> = Arc::downgrade(self);
        let interval = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(cache) = cache.upgrade() else {
                    break;
                };
                let removed = cache.sweep_expired().await;
                if removed > 0 {
                    debug!(removed, "swept expired cache entries");
                }
            }
        });

        SweeperHandle { handle }
    }
}

impl Default for CacheManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE, DEFAULT_TTL)
    }
}

/// Owns the background sweep task; aborts it on drop.
pub struct SweeperHandle {
    handle: JoinHandle<()>,
}

impl SweeperHandle {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
