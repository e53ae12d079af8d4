//! In-process LRU cache backend with per-entry expiry.
//!
//! # Invariants
//! - Capacity is bounded; least recently used entries are evicted first.
//! - Expired entries are never returned and are dropped on access.

use crate::cache::backend::{CacheBackend, CacheError};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Capacity used when callers do not configure one.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

struct Entry {
    value: Vec<u8>,
    /// `None` when the TTL reaches past what `Instant` can represent.
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |expires_at| expires_at > now)
    }
}

/// Mutex-guarded LRU map shared across requests.
pub struct MemoryCacheBackend {
    entries: Mutex<LruCache<String, Entry>>,
}

impl MemoryCacheBackend {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of stored entries, including not yet collected expired ones.
    pub fn len(&self) -> usize {
        self.entries.lock().map_or(0, |entries| entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryCacheBackend {
    fn default() -> Self {
        Self::new(NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap_or(NonZeroUsize::MIN))
    }
}

impl CacheBackend for MemoryCacheBackend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        let now = Instant::now();
        let expired = match entries.get(key) {
            Some(entry) if entry.is_live(now) => return Ok(Some(entry.value.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.pop(key);
        }
        Ok(None)
    }

    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError> {
        let mut entries = self.entries.lock().map_err(|_| CacheError::Poisoned)?;
        entries.put(
            key.to_string(),
            Entry {
                value: value.to_vec(),
                expires_at: Instant::now().checked_add(ttl),
            },
        );
        Ok(())
    }
}
