use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use repokit_core::cache::{
    deserialize, entity_key, entity_pattern, query_key, query_pattern, serialize, Cache,
    CachingStrategy, Result,
};
use repokit_core::entity::{Entity, RepositoryKey};

/// Caching strategy that stores entities as JSON in a byte [`Cache`].
///
/// Keys are namespaced by entity name (see `repokit_core::cache::entity_key`),
/// so one cache can serve several repositories. Deserializing always yields
/// a fresh value, detached from whatever was cached.
pub struct SerializedCachingStrategy<T, K, C> {
    cache: Arc<C>,
    ttl: Option<Duration>,
    _types: PhantomData<fn() -> (T, K)>,
}

impl<T, K, C> SerializedCachingStrategy<T, K, C> {
    /// Creates a strategy over `cache`; `ttl` applies to every value it writes.
    pub fn new(cache: Arc<C>, ttl: Option<Duration>) -> Self {
        Self {
            cache,
            ttl,
            _types: PhantomData,
        }
    }
}

impl<T, K, C> SerializedCachingStrategy<T, K, C>
where
    T: Entity,
    C: Cache,
{
    /// Drops every cached item and query result of `T`, leaving other
    /// entity types sharing the cache untouched.
    pub async fn clear(&self) -> Result<()> {
        tracing::debug!(entity = T::entity_name(), "Clearing cached entities");
        self.cache
            .delete_pattern(&entity_pattern(T::entity_name()))
            .await
    }
}

impl<T, K, C> Clone for SerializedCachingStrategy<T, K, C> {
    fn clone(&self) -> Self {
        Self::new(Arc::clone(&self.cache), self.ttl)
    }
}

impl<T, K, C> fmt::Debug for SerializedCachingStrategy<T, K, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializedCachingStrategy")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<T, K, C> CachingStrategy<T, K> for SerializedCachingStrategy<T, K, C>
where
    T: Entity + Serialize + DeserializeOwned,
    K: RepositoryKey,
    C: Cache + 'static,
{
    async fn try_get(&self, key: &K) -> Result<Option<T>> {
        match self.cache.get(&entity_key(T::entity_name(), key)).await? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &K, item: T) -> Result<()> {
        let bytes = serialize(&item)?;
        self.cache
            .set(&entity_key(T::entity_name(), key), &bytes, self.ttl)
            .await
    }

    async fn invalidate(&self, key: &K) -> Result<()> {
        self.cache.delete(&entity_key(T::entity_name(), key)).await
    }

    async fn try_get_all(&self, fingerprint: &str) -> Result<Option<Vec<T>>> {
        match self.cache.get(&query_key(T::entity_name(), fingerprint)).await? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set_all(&self, fingerprint: &str, items: Vec<T>) -> Result<()> {
        let bytes = serialize(&items)?;
        self.cache
            .set(&query_key(T::entity_name(), fingerprint), &bytes, self.ttl)
            .await
    }

    async fn invalidate_all(&self) -> Result<()> {
        self.cache
            .delete_pattern(&query_pattern(T::entity_name()))
            .await
    }

    async fn contains(&self, key: &K) -> Result<bool> {
        Ok(self
            .cache
            .get(&entity_key(T::entity_name(), key))
            .await?
            .is_some())
    }
}
