use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::RwLock;

use repokit_core::cache::{CachingStrategy, Result};
use repokit_core::entity::RepositoryKey;
use repokit_core::sanitize::{sanitize_with, DeferredPolicy, Sanitize};

use crate::cache::memory::{capacity, CacheEntry};
use crate::RepositoryConfig;

/// Caching strategy holding detached values in LRU maps.
///
/// Items and query results are bounded separately by `max_entries`. Every
/// read hands out a fresh copy, so callers can never reach into the cache.
pub struct MemoryCachingStrategy<T, K> {
    items: Arc<RwLock<LruCache<K, CacheEntry<T>>>>,
    queries: Arc<RwLock<LruCache<String, CacheEntry<Vec<T>>>>>,
    ttl: Option<Duration>,
    policy: DeferredPolicy,
}

impl<T, K> Clone for MemoryCachingStrategy<T, K> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            queries: Arc::clone(&self.queries),
            ttl: self.ttl,
            policy: self.policy,
        }
    }
}

impl<T, K> fmt::Debug for MemoryCachingStrategy<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryCachingStrategy")
            .field("ttl", &self.ttl)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl<T, K: RepositoryKey> MemoryCachingStrategy<T, K> {
    pub fn new(max_entries: usize, ttl: Option<Duration>) -> Self {
        Self {
            items: Arc::new(RwLock::new(LruCache::new(capacity(max_entries)))),
            queries: Arc::new(RwLock::new(LruCache::new(capacity(max_entries)))),
            ttl,
            policy: DeferredPolicy::default(),
        }
    }

    /// Sized and timed from `config`.
    pub fn from_config(config: &RepositoryConfig) -> Self {
        Self::new(config.cache_max_entries, Some(config.cache_ttl()))
            .with_deferred_policy(config.deferred_policy)
    }

    /// Policy used when copying values out of the cache.
    pub fn with_deferred_policy(mut self, policy: DeferredPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Number of cached items, expired ones included.
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl<T, K> CachingStrategy<T, K> for MemoryCachingStrategy<T, K>
where
    T: Sanitize + Send + Sync + 'static,
    K: RepositoryKey,
{
    async fn try_get(&self, key: &K) -> Result<Option<T>> {
        let mut items = self.items.write().await;
        let expired = match items.get(key) {
            Some(entry) if !entry.is_expired() => {
                return Ok(Some(sanitize_with(&entry.value, self.policy)));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            items.pop(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &K, item: T) -> Result<()> {
        let mut items = self.items.write().await;
        items.put(key.clone(), CacheEntry::new(item, self.ttl));
        Ok(())
    }

    async fn invalidate(&self, key: &K) -> Result<()> {
        self.items.write().await.pop(key);
        Ok(())
    }

    async fn try_get_all(&self, fingerprint: &str) -> Result<Option<Vec<T>>> {
        let mut queries = self.queries.write().await;
        let expired = match queries.get(fingerprint) {
            Some(entry) if !entry.is_expired() => {
                return Ok(Some(sanitize_with(&entry.value, self.policy)));
            }
            Some(_) => true,
            None => false,
        };
        if expired {
            queries.pop(fingerprint);
        }
        Ok(None)
    }

    async fn set_all(&self, fingerprint: &str, items: Vec<T>) -> Result<()> {
        let mut queries = self.queries.write().await;
        queries.put(fingerprint.to_string(), CacheEntry::new(items, self.ttl));
        Ok(())
    }

    async fn invalidate_all(&self) -> Result<()> {
        self.queries.write().await.clear();
        Ok(())
    }

    async fn contains(&self, key: &K) -> Result<bool> {
        let items = self.items.read().await;
        Ok(items.peek(key).is_some_and(|entry| !entry.is_expired()))
    }
}
