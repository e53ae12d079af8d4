//! Fail-open revision cache used by the banner service read path.

use crate::cache::backend::CacheBackend;
use log::{debug, warn};
use std::sync::Arc;
use std::time::Duration;

/// Default expiry for cached banner content.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

/// Best-effort key to bytes accessor with a fixed TTL.
///
/// Cloning is cheap and shares the backend, so one cache can serve every
/// request-scoped service instance.
pub struct RevisionCache<B: CacheBackend> {
    backend: Arc<B>,
    ttl: Duration,
}

impl<B: CacheBackend> Clone for RevisionCache<B> {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            ttl: self.ttl,
        }
    }
}

impl<B: CacheBackend> RevisionCache<B> {
    pub fn new(backend: Arc<B>, ttl: Duration) -> Self {
        Self { backend, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached bytes, or `None` on miss or backend failure.
    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        match self.backend.get(key) {
            Ok(Some(value)) => {
                debug!("event=cache_get module=cache status=hit key={key}");
                Some(value)
            }
            Ok(None) => {
                debug!("event=cache_get module=cache status=miss key={key}");
                None
            }
            Err(err) => {
                warn!("event=cache_get module=cache status=degraded key={key} error={err}");
                None
            }
        }
    }

    /// Stores bytes under `key`; failures are logged and dropped.
    pub fn set(&self, key: &str, value: &[u8]) {
        if let Err(err) = self.backend.set(key, value, self.ttl) {
            warn!("event=cache_set module=cache status=degraded key={key} error={err}");
        }
    }
}
