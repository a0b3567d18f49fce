use std::time::Duration;

use async_trait::async_trait;

use super::Result;

/// Byte-oriented key/value cache.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Gets a value from the cache by key.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Sets a value in the cache with an optional TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>) -> Result<()>;

    /// Deletes a value from the cache by key.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Deletes all values matching a pattern (e.g., "Order:query:*").
    async fn delete_pattern(&self, pattern: &str) -> Result<()>;
}

/// Typed cache a repository consults around its store.
///
/// Values handed to `set` and `set_all` are already sanitized. Values
/// returned from `try_get` and `try_get_all` belong to the caller; mutating
/// them never affects what is cached.
#[async_trait]
pub trait CachingStrategy<T, K>: Send + Sync
where
    T: Send + Sync + 'static,
    K: Send + Sync + 'static,
{
    async fn try_get(&self, key: &K) -> Result<Option<T>>;

    async fn set(&self, key: &K, item: T) -> Result<()>;

    async fn invalidate(&self, key: &K) -> Result<()>;

    /// Gets the cached result of a query run with the given fetch strategy
    /// fingerprint.
    async fn try_get_all(&self, fingerprint: &str) -> Result<Option<Vec<T>>>;

    async fn set_all(&self, fingerprint: &str, items: Vec<T>) -> Result<()>;

    /// Drops every cached query result.
    async fn invalidate_all(&self) -> Result<()>;

    async fn contains(&self, key: &K) -> Result<bool> {
        Ok(self.try_get(key).await?.is_some())
    }
}
