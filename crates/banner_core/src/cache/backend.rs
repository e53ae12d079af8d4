//! Pluggable cache client boundary.

use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Failure reported by a cache backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheError {
    /// Backend cannot be reached or refused the request.
    Unavailable(String),
    /// Backend state was poisoned by a panicking writer.
    Poisoned,
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(message) => write!(f, "cache unavailable: {message}"),
            Self::Poisoned => write!(f, "cache state poisoned"),
        }
    }
}

impl Error for CacheError {}

/// Fallible key/value client with per-write expiry.
///
/// Implementations must be safe to share between concurrent requests.
pub trait CacheBackend: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError>;
    fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), CacheError>;
}
