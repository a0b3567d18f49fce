use std::num::NonZeroUsize;
use std::time::{Duration, Instant};

/// A single cache entry with optional expiration.
#[derive(Debug, Clone)]
pub(crate) struct CacheEntry<V> {
    pub(crate) value: V,
    expires_at: Option<Instant>,
}

impl<V> CacheEntry<V> {
    /// Creates a new cache entry with optional TTL. A TTL too large to
    /// represent as an instant never expires.
    pub(crate) fn new(value: V, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.and_then(|d| Instant::now().checked_add(d));
        Self { value, expires_at }
    }

    /// Returns true if this entry has expired.
    pub(crate) fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }
}

/// LRU capacity for `max_entries`; zero is raised to one.
pub(crate) fn capacity(max_entries: usize) -> NonZeroUsize {
    NonZeroUsize::new(max_entries).unwrap_or(NonZeroUsize::MIN)
}
