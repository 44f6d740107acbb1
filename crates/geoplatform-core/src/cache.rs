//! Key-value cache abstractions for storing fetched data.
//!
//! Client code only calls the operations of [`KeyValueCache`]; storage and
//! eviction are the cache implementation's business.
//!
//! # Implementations
//!
//! - [`MemoryCache`]: In-memory cache with optional size limit and per-entry expiry

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use crate::error::CacheError;

/// A cache for storing fetched data.
///
/// Keys are derived by the caller; values are raw bytes. Each call is atomic
/// with respect to other calls on the same cache.
pub trait KeyValueCache: Send + Sync {
    /// Get data from the cache. Expired entries read as absent.
    fn get(&self, key: &str) -> Option<Vec<u8>>;

    /// Store data, replacing any previous value for `key`.
    ///
    /// With an `expiry` the entry stops being returned once that much time
    /// has passed.
    fn put(&self, key: &str, value: Vec<u8>, expiry: Option<Duration>) -> Result<(), CacheError>;

    /// Check if a live entry exists without retrieving it.
    fn contains(&self, key: &str) -> bool;

    /// Remove data from the cache.
    fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Clear all cached data.
    fn clear(&self) -> Result<(), CacheError>;
}

#[derive(Debug)]
struct Entry {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

#[derive(Debug, Default)]
struct MemoryCacheInner {
    entries: HashMap<String, Entry>,
    /// Insertion order for eviction.
    order: Vec<String>,
    current_size: usize,
}

impl MemoryCacheInner {
    fn remove_entry(&mut self, key: &str) {
        if let Some(old) = self.entries.remove(key) {
            self.current_size -= old.data.len();
            self.order.retain(|k| k != key);
        }
    }
}

/// An in-memory cache.
///
/// This cache stores data in a `HashMap` protected by a `RwLock`. It's
/// suitable for short-lived applications or when disk caching is not needed.
///
/// The cache has an optional maximum size in bytes. When the limit is exceeded,
/// the oldest entries are evicted.
#[derive(Debug)]
pub struct MemoryCache {
    data: Arc<RwLock<MemoryCacheInner>>,
    max_size: Option<usize>,
}

impl MemoryCache {
    /// Create a new memory cache with no size limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(MemoryCacheInner::default())),
            max_size: None,
        }
    }

    /// Create a new memory cache with a maximum size in bytes.
    #[must_use]
    pub fn with_max_size(max_size: usize) -> Self {
        Self {
            data: Arc::new(RwLock::new(MemoryCacheInner::default())),
            max_size: Some(max_size),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryCacheInner> {
        self.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryCacheInner> {
        self.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the current size of cached data in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.read().current_size
    }

    /// Get the number of cached entries, expired ones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Check if the cache is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for MemoryCache {
    fn clone(&self) -> Self {
        Self {
            data: Arc::clone(&self.data),
            max_size: self.max_size,
        }
    }
}

impl KeyValueCache for MemoryCache {
    fn get(&self, key: &str) -> Option<Vec<u8>> {
        let cache = self.read();
        cache
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(Instant::now()))
            .map(|entry| entry.data.clone())
    }

    fn put(&self, key: &str, value: Vec<u8>, expiry: Option<Duration>) -> Result<(), CacheError> {
        let data_size = value.len();
        if self.max_size.is_some_and(|max| data_size > max) {
            return Err(CacheError::new(
                "put",
                format!("{data_size} bytes exceed the cache capacity"),
            ));
        }

        let mut cache = self.write();

        // If the entry already exists, remove it first.
        cache.remove_entry(key);

        // Evict old entries if we have a size limit.
        if let Some(max_size) = self.max_size {
            while cache.current_size + data_size > max_size && !cache.order.is_empty() {
                let oldest = cache.order.remove(0);
                if let Some(old) = cache.entries.remove(&oldest) {
                    cache.current_size -= old.data.len();
                }
            }
        }

        let expires_at = expiry.map(|ttl| Instant::now() + ttl);
        cache.entries.insert(
            key.to_string(),
            Entry {
                data: value,
                expires_at,
            },
        );
        cache.order.push(key.to_string());
        cache.current_size += data_size;

        Ok(())
    }

    fn contains(&self, key: &str) -> bool {
        let cache = self.read();
        cache
            .entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired(Instant::now()))
    }

    fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.write().remove_entry(key);
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        let mut cache = self.write();
        cache.entries.clear();
        cache.order.clear();
        cache.current_size = 0;
        Ok(())
    }
}
