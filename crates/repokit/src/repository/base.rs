use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use repokit_core::cache::CachingStrategy;
use repokit_core::entity::{ensure_key, resolve_key, Entity, KeyDescriptor, RepositoryKey};
use repokit_core::fetch::{apply_fetch_strategy, FetchStrategy};
use repokit_core::sanitize::{sanitize_with, Sanitize};
use repokit_core::storage::{StoreAdapter, StoreQuery};

use super::{Batch, Change, Lifecycle};
use crate::{RepositoryConfig, RepositoryError, Result, TrackingConflictPolicy};

/// Generic repository for entity `T` keyed by `K`, persisted through store
/// adapter `S`.
///
/// Implements the cache-aside pattern when a [`CachingStrategy`] is attached:
/// - **Reads**: check the cache first, on miss load from the store and cache
///   a sanitized copy
/// - **Writes**: stage in the store, commit, then refresh or invalidate the
///   cached copy and drop every cached query result
///
/// Cache failures never fail an operation; they are logged and treated as a
/// miss. The repository owns its store handle and releases it exactly once,
/// on [`dispose`](Self::dispose) or when dropped.
pub struct Repository<T, K, S>
where
    T: Entity,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    store: Option<S>,
    key: KeyDescriptor<T, K>,
    caching: Option<Arc<dyn CachingStrategy<T, K>>>,
    config: RepositoryConfig,
    /// Keys deleted through this repository, so `lifecycle` can report
    /// `Removed`. Grows with every distinct deleted key until the key is
    /// added again or [`forget_removed`](Repository::forget_removed) is called.
    removed: HashSet<K>,
}

impl<T, K, S> Repository<T, K, S>
where
    T: Entity,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    /// Creates a repository configured from the environment.
    ///
    /// Fails with [`RepositoryError::Configuration`] when `T` has no usable
    /// key of type `K`; the store handle is released in that case.
    pub fn new(store: S) -> Result<Self> {
        Self::with_config(store, RepositoryConfig::default())
    }

    pub fn with_config(mut store: S, config: RepositoryConfig) -> Result<Self> {
        let key = match resolve_key::<T, K>() {
            Ok(key) => key,
            Err(err) => {
                store.release();
                return Err(err.into());
            }
        };

        tracing::debug!(
            entity = T::entity_name(),
            key = key.member(),
            "Repository created"
        );
        Ok(Self {
            store: Some(store),
            key,
            caching: None,
            config,
            removed: HashSet::new(),
        })
    }

    /// Attaches a caching strategy. The strategy may be shared with other
    /// repositories.
    pub fn with_caching(mut self, caching: Arc<dyn CachingStrategy<T, K>>) -> Self {
        self.caching = Some(caching);
        self
    }

    pub fn key_descriptor(&self) -> KeyDescriptor<T, K> {
        self.key
    }

    /// Reads the key of `entity`.
    pub fn key_of(&self, entity: &T) -> K {
        self.key.get(entity)
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    pub fn is_disposed(&self) -> bool {
        self.store.is_none()
    }

    /// The underlying store adapter.
    pub fn store(&self) -> Result<&S> {
        self.store
            .as_ref()
            .ok_or(RepositoryError::Disposed(T::entity_name()))
    }

    pub fn store_mut(&mut self) -> Result<&mut S> {
        self.store
            .as_mut()
            .ok_or(RepositoryError::Disposed(T::entity_name()))
    }

    /// Releases the store handle and detaches the caching strategy.
    ///
    /// Idempotent; every later operation fails with
    /// [`RepositoryError::Disposed`].
    pub fn dispose(&mut self) {
        if let Some(mut store) = self.store.take() {
            store.release();
            self.caching = None;
            tracing::debug!(entity = T::entity_name(), "Repository disposed");
        }
    }

    /// Starts a query over the store, eager-loading the strategy's include
    /// paths in declaration order.
    pub fn query(&self, strategy: Option<&FetchStrategy<T>>) -> Result<S::Query> {
        let query = self.store()?.query()?;
        Ok(apply_fetch_strategy(query, strategy)?)
    }

    /// Reports where `key` stands. Keys deleted through this repository
    /// report [`Lifecycle::Removed`] until forgotten.
    pub async fn lifecycle(&self, key: &K) -> Result<Lifecycle> {
        let state = self.store()?.entry_state(key).await?;
        let cached = match &self.caching {
            Some(caching) => caching.contains(key).await.unwrap_or_else(|err| {
                tracing::warn!(entity = T::entity_name(), key = %key, error = %err, "Cache lookup failed");
                false
            }),
            None => false,
        };
        Ok(Lifecycle::from_parts(
            state,
            self.removed.contains(key),
            cached,
        ))
    }

    /// Drops the record of deleted keys; they report
    /// [`Lifecycle::Transient`] afterwards.
    pub fn forget_removed(&mut self) {
        self.removed.clear();
    }

    pub(super) fn discard_staged(&mut self) {
        if let Some(store) = self.store.as_mut() {
            store.discard();
        }
    }

    pub(super) async fn commit_staged(&mut self) -> Result<()> {
        Ok(self.store_mut()?.commit().await?)
    }

    pub(super) async fn stage_update(&mut self, entity: &T) -> Result<Change<T, K>> {
        let key = self.key.get(entity);
        if let Err(conflict) = self.store_mut()?.mark_modified(entity).await {
            match self.config.tracking_conflicts {
                TrackingConflictPolicy::Suppress => tracing::debug!(
                    entity = T::entity_name(),
                    key = %key,
                    error = %conflict,
                    "Tracking conflict suppressed"
                ),
                TrackingConflictPolicy::Propagate => return Err(conflict.into()),
            }
        }
        tracing::debug!(entity = T::entity_name(), key = %key, "Staged update");
        Ok(Change::Updated(key))
    }

    pub(super) async fn stage_delete(&mut self, entity: &T) -> Result<Change<T, K>> {
        let key = self.key.get(entity);
        self.store_mut()?.remove(entity).await?;
        tracing::debug!(entity = T::entity_name(), key = %key, "Staged delete");
        Ok(Change::Deleted(key))
    }

    /// Applies the cache effects of committed changes.
    pub(super) async fn settle(&mut self, changes: Vec<Change<T, K>>) {
        if changes.is_empty() {
            return;
        }

        for change in changes {
            match change {
                Change::Added { key, copy } => {
                    self.removed.remove(&key);
                    if let (Some(caching), Some(copy)) = (&self.caching, copy) {
                        if let Err(err) = caching.set(&key, copy).await {
                            tracing::warn!(entity = T::entity_name(), key = %key, error = %err, "Failed to cache entity");
                        }
                    }
                }
                Change::Updated(key) => self.invalidate(&key).await,
                Change::Deleted(key) => {
                    self.invalidate(&key).await;
                    self.removed.insert(key);
                }
            }
        }

        if let Some(caching) = &self.caching {
            if let Err(err) = caching.invalidate_all().await {
                tracing::warn!(entity = T::entity_name(), error = %err, "Failed to invalidate cached queries");
            }
        }
    }

    async fn invalidate(&self, key: &K) {
        if let Some(caching) = &self.caching {
            if let Err(err) = caching.invalidate(key).await {
                tracing::warn!(entity = T::entity_name(), key = %key, error = %err, "Failed to invalidate cached entity");
            }
        }
    }
}

impl<T, K, S> Repository<T, K, S>
where
    T: Entity + Sanitize,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    /// Starts a batch: staged writes are committed together by
    /// [`Batch::commit`], or discarded if the batch is dropped first.
    pub fn batch(&mut self) -> Result<Batch<'_, T, K, S>> {
        self.store()?;
        Ok(Batch::new(self))
    }

    /// Inserts `entity`, generating its key first when the key type is
    /// client-generated and the key is unassigned.
    ///
    /// On success the key on `entity` is the persisted one, including keys
    /// assigned by the store.
    pub async fn add(&mut self, entity: &mut T) -> Result<()> {
        let mut batch = self.batch()?;
        batch.add(entity).await?;
        batch.commit().await
    }

    /// Persists changes to `entity`, which need not have been loaded through
    /// this repository.
    pub async fn update(&mut self, entity: &T) -> Result<()> {
        let mut batch = self.batch()?;
        batch.update(entity).await?;
        batch.commit().await
    }

    pub async fn delete(&mut self, entity: &T) -> Result<()> {
        let mut batch = self.batch()?;
        batch.delete(entity).await?;
        batch.commit().await
    }

    /// Deletes the entity stored under `key`.
    pub async fn delete_by_key(&mut self, key: &K) -> Result<()> {
        let entity = self
            .store_mut()?
            .find_by_key(key)
            .await?
            .ok_or_else(|| RepositoryError::NotFound {
                entity_type: T::entity_name(),
                id: key.to_string(),
            })?;
        self.delete(&entity).await
    }

    pub async fn add_many(&mut self, entities: &mut [T]) -> Result<()> {
        let mut batch = self.batch()?;
        for entity in entities.iter_mut() {
            batch.add(entity).await?;
        }
        batch.commit().await
    }

    pub async fn update_many(&mut self, entities: &[T]) -> Result<()> {
        let mut batch = self.batch()?;
        for entity in entities {
            batch.update(entity).await?;
        }
        batch.commit().await
    }

    pub async fn delete_many(&mut self, entities: &[T]) -> Result<()> {
        let mut batch = self.batch()?;
        for entity in entities {
            batch.delete(entity).await?;
        }
        batch.commit().await
    }

    /// Looks an entity up by key, cache first.
    pub async fn get(&mut self, key: &K) -> Result<Option<T>> {
        self.store()?;
        if let Some(caching) = &self.caching {
            match caching.try_get(key).await {
                Ok(Some(entity)) => {
                    tracing::trace!(entity = T::entity_name(), key = %key, "Cache hit");
                    return Ok(Some(entity));
                }
                Ok(None) => tracing::trace!(entity = T::entity_name(), key = %key, "Cache miss"),
                Err(err) => tracing::warn!(
                    entity = T::entity_name(),
                    key = %key,
                    error = %err,
                    "Cache read failed, falling back to store"
                ),
            }
        }

        let found = self.store_mut()?.find_by_key(key).await?;
        if let (Some(caching), Some(entity)) = (&self.caching, &found) {
            let copy = sanitize_with(entity, self.config.deferred_policy);
            if let Err(err) = caching.set(key, copy).await {
                tracing::warn!(entity = T::entity_name(), key = %key, error = %err, "Failed to cache entity");
            }
        }
        Ok(found)
    }

    pub async fn exists(&mut self, key: &K) -> Result<bool> {
        self.store()?;
        if let Some(caching) = &self.caching {
            match caching.contains(key).await {
                Ok(true) => return Ok(true),
                Ok(false) => {}
                Err(err) => tracing::warn!(
                    entity = T::entity_name(),
                    key = %key,
                    error = %err,
                    "Cache lookup failed, falling back to store"
                ),
            }
        }
        Ok(self.store_mut()?.find_by_key(key).await?.is_some())
    }

    /// Runs a query with the given fetch strategy, caching the result per
    /// strategy until the next write.
    pub async fn get_all(&self, strategy: Option<&FetchStrategy<T>>) -> Result<Vec<T>> {
        let fingerprint = strategy.map(FetchStrategy::fingerprint).unwrap_or_default();
        if let Some(caching) = &self.caching {
            match caching.try_get_all(&fingerprint).await {
                Ok(Some(entities)) => {
                    tracing::trace!(entity = T::entity_name(), %fingerprint, count = entities.len(), "Cache hit for query");
                    return Ok(entities);
                }
                Ok(None) => tracing::trace!(entity = T::entity_name(), %fingerprint, "Cache miss for query"),
                Err(err) => tracing::warn!(
                    entity = T::entity_name(),
                    error = %err,
                    "Cached query read failed, falling back to store"
                ),
            }
        }

        let entities = self.query(strategy)?.fetch().await?;
        if let Some(caching) = &self.caching {
            let copies = sanitize_with(&entities, self.config.deferred_policy);
            if let Err(err) = caching.set_all(&fingerprint, copies).await {
                tracing::warn!(entity = T::entity_name(), error = %err, "Failed to cache query result");
            }
        }
        Ok(entities)
    }

    pub(super) async fn stage_add(&mut self, entity: &mut T) -> Result<Change<T, K>> {
        self.store()?;
        if ensure_key(&self.key, entity)? {
            tracing::trace!(entity = T::entity_name(), key = %self.key.get_ref(entity), "Generated key");
        }
        self.store_mut()?.add(entity).await?;

        let key = self.key.get(entity);
        tracing::debug!(entity = T::entity_name(), key = %key, "Staged add");
        let copy = self
            .caching
            .as_ref()
            .map(|_| sanitize_with(entity, self.config.deferred_policy));
        Ok(Change::Added { key, copy })
    }
}

impl<T, K, S> Drop for Repository<T, K, S>
where
    T: Entity,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    fn drop(&mut self) {
        self.dispose();
    }
}

impl<T, K, S> fmt::Debug for Repository<T, K, S>
where
    T: Entity,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Repository")
            .field("entity", &T::entity_name())
            .field("key", &self.key)
            .field("cached", &self.caching.is_some())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

#[cfg(all(test, feature = "inmemory", feature = "memory"))]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use repokit_core::cache::CacheError;
    use repokit_core::entity::EntityShape;
    use repokit_core::sanitize::{DeferredPolicy, Related, SanitizeContext};
    use repokit_core::storage::{self, EntryState, StoreError, TrackingConflict};
    use uuid::Uuid;

    use crate::caching::MemoryCachingStrategy;
    use crate::storage::{InMemoryDatabase, InMemoryStore};

    // Spy store adapter

    #[derive(Default)]
    struct Calls {
        add: AtomicUsize,
        mark_modified: AtomicUsize,
        find: AtomicUsize,
        commit: AtomicUsize,
        discard: AtomicUsize,
        release: AtomicUsize,
    }

    fn count(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    struct SpyStore<T> {
        calls: Arc<Calls>,
        includes: Arc<Mutex<Vec<String>>>,
        rows: Vec<T>,
        key_of: fn(&T) -> i64,
        set_key: fn(&mut T, i64),
        next_id: i64,
        conflict: bool,
        fail_commit: bool,
    }

    impl<T> SpyStore<T> {
        fn new(calls: &Arc<Calls>, key_of: fn(&T) -> i64, set_key: fn(&mut T, i64)) -> Self {
            Self {
                calls: Arc::clone(calls),
                includes: Arc::new(Mutex::new(Vec::new())),
                rows: Vec::new(),
                key_of,
                set_key,
                next_id: 0,
                conflict: false,
                fail_commit: false,
            }
        }
    }

    #[derive(Debug)]
    struct SpyQuery<T> {
        includes: Arc<Mutex<Vec<String>>>,
        rows: Vec<T>,
    }

    #[async_trait]
    impl<T: Entity> StoreQuery<T> for SpyQuery<T> {
        fn include(self, path: &str) -> storage::Result<Self> {
            if path.is_empty() {
                return Err(StoreError::InvalidIncludePath {
                    entity_type: T::entity_name(),
                    path: path.to_string(),
                });
            }
            self.includes.lock().unwrap().push(path.to_string());
            Ok(self)
        }

        async fn fetch(self) -> storage::Result<Vec<T>> {
            Ok(self.rows)
        }
    }

    #[async_trait]
    impl<T: Entity + Clone> StoreAdapter<T, i64> for SpyStore<T> {
        type Query = SpyQuery<T>;

        async fn add(&mut self, entity: &mut T) -> storage::Result<()> {
            self.calls.add.fetch_add(1, Ordering::SeqCst);
            if (self.key_of)(entity) == 0 {
                self.next_id += 1;
                (self.set_key)(entity, self.next_id);
            }
            self.rows.push(entity.clone());
            Ok(())
        }

        async fn remove(&mut self, entity: &T) -> storage::Result<()> {
            let key = (self.key_of)(entity);
            let key_of = self.key_of;
            self.rows.retain(|row| key_of(row) != key);
            Ok(())
        }

        async fn mark_modified(&mut self, entity: &T) -> std::result::Result<(), TrackingConflict> {
            self.calls.mark_modified.fetch_add(1, Ordering::SeqCst);
            if self.conflict {
                return Err(TrackingConflict {
                    entity_type: T::entity_name(),
                    id: (self.key_of)(entity).to_string(),
                    reason: "another instance is tracked".to_string(),
                });
            }
            Ok(())
        }

        async fn find_by_key(&mut self, key: &i64) -> storage::Result<Option<T>> {
            self.calls.find.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .rows
                .iter()
                .find(|row| (self.key_of)(row) == *key)
                .cloned())
        }

        fn query(&self) -> storage::Result<Self::Query> {
            Ok(SpyQuery {
                includes: Arc::clone(&self.includes),
                rows: self.rows.clone(),
            })
        }

        async fn commit(&mut self) -> storage::Result<()> {
            self.calls.commit.fetch_add(1, Ordering::SeqCst);
            if self.fail_commit {
                return Err(StoreError::ConnectionFailed("reset by peer".to_string()));
            }
            Ok(())
        }

        fn discard(&mut self) {
            self.calls.discard.fetch_add(1, Ordering::SeqCst);
        }

        async fn entry_state(&self, key: &i64) -> storage::Result<EntryState> {
            Ok(if self.rows.iter().any(|row| (self.key_of)(row) == *key) {
                EntryState::Persisted
            } else {
                EntryState::Detached
            })
        }

        fn release(&mut self) {
            self.calls.release.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Caching strategy whose backend is always down.
    struct UnreachableCache;

    #[async_trait]
    impl CachingStrategy<Account, i64> for UnreachableCache {
        async fn try_get(&self, _key: &i64) -> repokit_core::cache::Result<Option<Account>> {
            Err(CacheError::ConnectionFailed("refused".to_string()))
        }

        async fn set(&self, _key: &i64, _item: Account) -> repokit_core::cache::Result<()> {
            Err(CacheError::ConnectionFailed("refused".to_string()))
        }

        async fn invalidate(&self, _key: &i64) -> repokit_core::cache::Result<()> {
            Err(CacheError::ConnectionFailed("refused".to_string()))
        }

        async fn try_get_all(
            &self,
            _fingerprint: &str,
        ) -> repokit_core::cache::Result<Option<Vec<Account>>> {
            Err(CacheError::ConnectionFailed("refused".to_string()))
        }

        async fn set_all(
            &self,
            _fingerprint: &str,
            _items: Vec<Account>,
        ) -> repokit_core::cache::Result<()> {
            Err(CacheError::ConnectionFailed("refused".to_string()))
        }

        async fn invalidate_all(&self) -> repokit_core::cache::Result<()> {
            Err(CacheError::ConnectionFailed("refused".to_string()))
        }
    }

    // Entities

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Account {
        id: i64,
        owner: String,
        notes: Related<Vec<String>>,
    }

    impl Entity for Account {
        fn describe(shape: &mut EntityShape<Self>) {
            shape
                .field("id", |a| &a.id, |a| &mut a.id)
                .field("owner", |a| &a.owner, |a| &mut a.owner)
                .field("notes", |a| &a.notes, |a| &mut a.notes);
        }
    }

    impl Sanitize for Account {
        fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
            Self {
                id: self.id.sanitize(cx),
                owner: self.owner.sanitize(cx),
                notes: self.notes.sanitize(cx),
            }
        }
    }

    #[derive(Debug, Clone, Default)]
    struct Memo {
        text: String,
    }

    impl Entity for Memo {
        fn describe(shape: &mut EntityShape<Self>) {
            shape.field("text", |m| &m.text, |m| &mut m.text);
        }
    }

    impl Sanitize for Memo {
        fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
            Self {
                text: self.text.sanitize(cx),
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Order {
        number: u32,
    }

    impl Sanitize for Order {
        fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
            Self {
                number: self.number.sanitize(cx),
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Customer {
        id: Uuid,
        name: String,
        orders: Related<Vec<Order>>,
    }

    impl Entity for Customer {
        fn describe(shape: &mut EntityShape<Self>) {
            shape
                .field("id", |c| &c.id, |c| &mut c.id)
                .field("name", |c| &c.name, |c| &mut c.name)
                .field("orders", |c| &c.orders, |c| &mut c.orders);
        }
    }

    impl Sanitize for Customer {
        fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
            Self {
                id: self.id.sanitize(cx),
                name: self.name.sanitize(cx),
                orders: self.orders.sanitize(cx),
            }
        }
    }

    #[derive(Debug, Clone, Default, PartialEq)]
    struct Ticket {
        ticket_id: String,
        title: String,
    }

    impl Entity for Ticket {
        fn describe(shape: &mut EntityShape<Self>) {
            shape
                .field("ticket_id", |t| &t.ticket_id, |t| &mut t.ticket_id)
                .field("title", |t| &t.title, |t| &mut t.title);
        }
    }

    impl Sanitize for Ticket {
        fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
            Self {
                ticket_id: self.ticket_id.sanitize(cx),
                title: self.title.sanitize(cx),
            }
        }
    }

    // Helpers

    type AccountRepository = Repository<Account, i64, SpyStore<Account>>;
    type CustomerRepository = Repository<Customer, Uuid, InMemoryStore<Customer, Uuid>>;

    fn account_store(calls: &Arc<Calls>) -> SpyStore<Account> {
        SpyStore::new(calls, |a| a.id, |a, id| a.id = id)
    }

    fn account_repository(store: SpyStore<Account>, config: RepositoryConfig) -> AccountRepository {
        Repository::with_config(store, config).unwrap()
    }

    fn account(id: i64, owner: &str) -> Account {
        Account {
            id,
            owner: owner.to_string(),
            notes: Related::Unloaded,
        }
    }

    fn memory_caching<T: Sanitize + Send + Sync + 'static, K: RepositoryKey>(
    ) -> Arc<MemoryCachingStrategy<T, K>> {
        Arc::new(MemoryCachingStrategy::new(100, None))
    }

    fn customer_repository(
        database: &InMemoryDatabase<Customer, Uuid>,
        caching: Option<Arc<MemoryCachingStrategy<Customer, Uuid>>>,
    ) -> CustomerRepository {
        let repository = Repository::with_config(database.open().unwrap(), RepositoryConfig::new())
            .unwrap();
        match caching {
            Some(caching) => repository.with_caching(caching),
            None => repository,
        }
    }

    fn customer(name: &str) -> Customer {
        Customer {
            name: name.to_string(),
            ..Default::default()
        }
    }

    // Query path

    #[tokio::test]
    async fn test_query_applies_includes_in_declaration_order() {
        let calls = Arc::new(Calls::default());
        let store = account_store(&calls);
        let includes = Arc::clone(&store.includes);
        let repository = account_repository(store, RepositoryConfig::new());
        let strategy = FetchStrategy::new().include("Orders").include("Orders.Items");

        repository.query(Some(&strategy)).unwrap();

        assert_eq!(*includes.lock().unwrap(), vec!["Orders", "Orders.Items"]);
    }

    #[tokio::test]
    async fn test_query_without_strategy_adds_no_includes() {
        let calls = Arc::new(Calls::default());
        let store = account_store(&calls);
        let includes = Arc::clone(&store.includes);
        let repository = account_repository(store, RepositoryConfig::new());

        repository.query(None).unwrap();
        repository.query(Some(&FetchStrategy::new())).unwrap();

        assert!(includes.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_include_path_is_a_backend_error() {
        let calls = Arc::new(Calls::default());
        let repository = account_repository(account_store(&calls), RepositoryConfig::new());
        let strategy = FetchStrategy::new().include("");

        let err = repository.query(Some(&strategy)).unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Backend(StoreError::InvalidIncludePath { .. })
        ));
    }

    // Insert path

    #[tokio::test]
    async fn test_add_leaves_numeric_keys_to_the_store() {
        let calls = Arc::new(Calls::default());
        let mut repository = account_repository(account_store(&calls), RepositoryConfig::new());
        let mut entity = account(0, "ada");

        repository.add(&mut entity).await.unwrap();

        assert_eq!(entity.id, 1);
        assert_eq!(count(&calls.add), 1);
        assert_eq!(count(&calls.commit), 1);
    }

    #[tokio::test]
    async fn test_add_keeps_explicit_numeric_key() {
        let calls = Arc::new(Calls::default());
        let mut repository = account_repository(account_store(&calls), RepositoryConfig::new());
        let mut entity = account(42, "ada");

        repository.add(&mut entity).await.unwrap();

        assert_eq!(entity.id, 42);
    }

    #[tokio::test]
    async fn test_add_generates_uuid_key() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, None);
        let mut entity = customer("Ada");

        repository.add(&mut entity).await.unwrap();

        assert!(!entity.id.is_nil());
        assert_eq!(database.row(&entity.id).await, Some(entity));
    }

    #[tokio::test]
    async fn test_add_keeps_assigned_uuid_key() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, None);
        let id = Uuid::new_v4();
        let mut entity = Customer {
            id,
            ..customer("Ada")
        };

        repository.add(&mut entity).await.unwrap();

        assert_eq!(entity.id, id);
    }

    #[tokio::test]
    async fn test_add_generates_string_key_by_convention() {
        let database = InMemoryDatabase::<Ticket, String>::new();
        let mut repository =
            Repository::with_config(database.open().unwrap(), RepositoryConfig::new()).unwrap();
        let mut ticket = Ticket {
            title: "Broken build".to_string(),
            ..Default::default()
        };

        repository.add(&mut ticket).await.unwrap();

        assert_eq!(ticket.ticket_id.len(), 36);
        assert!(Uuid::parse_str(&ticket.ticket_id).is_ok());
        assert_eq!(database.row(&ticket.ticket_id).await, Some(ticket));
    }

    #[tokio::test]
    async fn test_add_caches_detached_copy() {
        let calls = Arc::new(Calls::default());
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let caching = memory_caching::<Account, i64>();
        let mut repository = account_repository(account_store(&calls), RepositoryConfig::new())
            .with_caching(caching.clone());
        let mut entity = Account {
            notes: Related::deferred(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(vec!["vip".to_string()])
            }),
            ..account(0, "ada")
        };

        repository.add(&mut entity).await.unwrap();
        let cached = repository.get(&entity.id).await.unwrap().unwrap();

        assert_eq!(count(&loads), 0);
        assert_eq!(count(&calls.find), 0);
        assert_eq!(cached.notes, Related::Unloaded);
        assert!(!cached.notes.is_attached());
        assert_eq!(cached.owner, "ada");
    }

    #[tokio::test]
    async fn test_materialize_policy_loads_before_caching() {
        let calls = Arc::new(Calls::default());
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&loads);
        let config = RepositoryConfig::new().with_deferred_policy(DeferredPolicy::Materialize);
        let mut repository = account_repository(account_store(&calls), config)
            .with_caching(memory_caching::<Account, i64>());
        let mut entity = Account {
            notes: Related::deferred(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StoreError>(vec!["vip".to_string()])
            }),
            ..account(0, "ada")
        };

        repository.add(&mut entity).await.unwrap();
        let cached = repository.get(&entity.id).await.unwrap().unwrap();

        assert_eq!(count(&loads), 1);
        assert_eq!(cached.notes, Related::Loaded(vec!["vip".to_string()]));
    }

    #[tokio::test]
    async fn test_failed_commit_discards_staged_changes() {
        let calls = Arc::new(Calls::default());
        let mut store = account_store(&calls);
        store.fail_commit = true;
        let mut repository = account_repository(store, RepositoryConfig::new());

        let err = repository.add(&mut account(0, "ada")).await.unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Backend(StoreError::ConnectionFailed(_))
        ));
        assert_eq!(count(&calls.discard), 1);
    }

    // Update path

    #[tokio::test]
    async fn test_update_suppresses_tracking_conflict_by_default() {
        let calls = Arc::new(Calls::default());
        let mut store = account_store(&calls);
        store.conflict = true;
        let mut repository = account_repository(store, RepositoryConfig::new());

        repository.update(&account(7, "ada")).await.unwrap();

        assert_eq!(count(&calls.mark_modified), 1);
        assert_eq!(count(&calls.commit), 1);
    }

    #[tokio::test]
    async fn test_update_propagates_tracking_conflict_when_configured() {
        let calls = Arc::new(Calls::default());
        let mut store = account_store(&calls);
        store.conflict = true;
        let config =
            RepositoryConfig::new().with_tracking_conflicts(TrackingConflictPolicy::Propagate);
        let mut repository = account_repository(store, config);

        let err = repository.update(&account(7, "ada")).await.unwrap_err();

        assert!(matches!(err, RepositoryError::TrackingConflict(_)));
        assert_eq!(count(&calls.commit), 0);
        assert_eq!(count(&calls.discard), 1);
    }

    #[tokio::test]
    async fn test_update_of_never_fetched_entity() {
        let database = InMemoryDatabase::new();
        let mut writer = customer_repository(&database, None);
        let mut original = customer("Ada");
        writer.add(&mut original).await.unwrap();

        let mut repository = customer_repository(&database, None);
        let renamed = Customer {
            id: original.id,
            ..customer("Ada Lovelace")
        };
        repository.update(&renamed).await.unwrap();

        assert_eq!(database.row(&original.id).await, Some(renamed));
    }

    #[tokio::test]
    async fn test_update_of_missing_entity_fails_on_commit() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, None);
        let ghost = Customer {
            id: Uuid::new_v4(),
            ..customer("Nobody")
        };

        let err = repository.update(&ghost).await.unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Backend(StoreError::NotFound { .. })
        ));
        assert!(database.is_empty().await);
    }

    #[tokio::test]
    async fn test_update_invalidates_cached_copy() {
        let database = InMemoryDatabase::new();
        let caching = memory_caching();
        let mut repository = customer_repository(&database, Some(caching.clone()));
        let mut entity = customer("Ada");
        repository.add(&mut entity).await.unwrap();
        assert!(caching.contains(&entity.id).await.unwrap());

        entity.name = "Ada Lovelace".to_string();
        repository.update(&entity).await.unwrap();

        assert!(!caching.contains(&entity.id).await.unwrap());
        let reloaded = repository.get(&entity.id).await.unwrap().unwrap();
        assert_eq!(reloaded.name, "Ada Lovelace");
    }

    // Reads and cache

    #[tokio::test]
    async fn test_get_hit_avoids_store_io() {
        let calls = Arc::new(Calls::default());
        let mut store = account_store(&calls);
        store.rows.push(account(3, "ada"));
        let mut repository = account_repository(store, RepositoryConfig::new())
            .with_caching(memory_caching::<Account, i64>());

        let first = repository.get(&3).await.unwrap();
        let second = repository.get(&3).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(count(&calls.find), 1);
    }

    #[tokio::test]
    async fn test_get_missing_is_none_and_not_cached() {
        let calls = Arc::new(Calls::default());
        let caching = memory_caching::<Account, i64>();
        let mut repository = account_repository(account_store(&calls), RepositoryConfig::new())
            .with_caching(caching.clone());

        assert_eq!(repository.get(&9).await.unwrap(), None);
        assert!(caching.is_empty().await);
    }

    #[tokio::test]
    async fn test_cache_failure_is_treated_as_miss() {
        let calls = Arc::new(Calls::default());
        let mut store = account_store(&calls);
        store.rows.push(account(3, "ada"));
        let mut repository = account_repository(store, RepositoryConfig::new())
            .with_caching(Arc::new(UnreachableCache));

        let found = repository.get(&3).await.unwrap();
        repository.add(&mut account(0, "grace")).await.unwrap();
        let all = repository.get_all(None).await.unwrap();

        assert_eq!(found, Some(account(3, "ada")));
        assert_eq!(count(&calls.find), 1);
        assert_eq!(all.len(), 2);
        assert!(repository.exists(&3).await.unwrap());
    }

    #[tokio::test]
    async fn test_exists() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, Some(memory_caching()));
        let mut entity = customer("Ada");
        repository.add(&mut entity).await.unwrap();

        assert!(repository.exists(&entity.id).await.unwrap());
        assert!(!repository.exists(&Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn test_get_all_caches_result_until_next_write() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, Some(memory_caching()));
        repository
            .add_many(&mut [customer("Ada"), customer("Grace")])
            .await
            .unwrap();
        assert_eq!(repository.get_all(None).await.unwrap().len(), 2);

        // A write through another session is not seen until this repository writes.
        let mut other = customer_repository(&database, None);
        other.add(&mut customer("Edsger")).await.unwrap();
        assert_eq!(repository.get_all(None).await.unwrap().len(), 2);

        repository.add(&mut customer("Barbara")).await.unwrap();
        let names: Vec<String> = repository
            .get_all(None)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, vec!["Ada", "Grace", "Edsger", "Barbara"]);
    }

    #[tokio::test]
    async fn test_get_all_with_fetch_strategy() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, Some(memory_caching()));
        let mut entity = Customer {
            orders: Related::Loaded(vec![Order { number: 1 }]),
            ..customer("Ada")
        };
        repository.add(&mut entity).await.unwrap();
        let strategy = FetchStrategy::new().include("orders");

        let all = repository.get_all(Some(&strategy)).await.unwrap();

        assert_eq!(all, vec![entity]);
    }

    #[tokio::test]
    async fn test_get_all_rejects_unknown_include() {
        let database = InMemoryDatabase::new();
        let repository = customer_repository(&database, None);
        let strategy = FetchStrategy::new().include("invoices");

        let err = repository.get_all(Some(&strategy)).await.unwrap_err();

        assert!(matches!(
            err,
            RepositoryError::Backend(StoreError::InvalidIncludePath { entity_type: "Customer", .. })
        ));
    }

    // Delete path

    #[tokio::test]
    async fn test_delete_invalidates_cached_copy() {
        let database = InMemoryDatabase::new();
        let caching = memory_caching();
        let mut repository = customer_repository(&database, Some(caching.clone()));
        let mut entity = customer("Ada");
        repository.add(&mut entity).await.unwrap();
        repository.get(&entity.id).await.unwrap();

        repository.delete(&entity).await.unwrap();

        assert!(!caching.contains(&entity.id).await.unwrap());
        assert_eq!(repository.get(&entity.id).await.unwrap(), None);
        assert!(database.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_by_key() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, None);
        let mut entity = customer("Ada");
        repository.add(&mut entity).await.unwrap();

        repository.delete_by_key(&entity.id).await.unwrap();

        assert!(database.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_by_missing_key_is_not_found() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, None);
        let key = Uuid::new_v4();

        let err = repository.delete_by_key(&key).await.unwrap_err();

        match err {
            RepositoryError::NotFound { entity_type, id } => {
                assert_eq!(entity_type, "Customer");
                assert_eq!(id, key.to_string());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    // Lifecycle

    #[tokio::test]
    async fn test_lifecycle_without_cache() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, None);
        let mut entity = Customer {
            id: Uuid::new_v4(),
            ..customer("Ada")
        };
        let key = entity.id;
        assert_eq!(repository.lifecycle(&key).await.unwrap(), Lifecycle::Transient);

        repository.add(&mut entity).await.unwrap();
        assert_eq!(repository.lifecycle(&key).await.unwrap(), Lifecycle::Persisted);

        repository.delete(&entity).await.unwrap();
        assert_eq!(repository.lifecycle(&key).await.unwrap(), Lifecycle::Removed);

        repository.add(&mut entity).await.unwrap();
        assert_eq!(repository.lifecycle(&key).await.unwrap(), Lifecycle::Persisted);
    }

    #[tokio::test]
    async fn test_forget_removed_reports_transient() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, None);
        let mut entity = customer("Ada");
        repository.add(&mut entity).await.unwrap();
        repository.delete(&entity).await.unwrap();

        repository.forget_removed();

        assert_eq!(
            repository.lifecycle(&entity.id).await.unwrap(),
            Lifecycle::Transient
        );
    }

    #[tokio::test]
    async fn test_lifecycle_with_cache() {
        let database = InMemoryDatabase::new();
        let mut repository = customer_repository(&database, Some(memory_caching()));
        let mut entity = customer("Ada");

        repository.add(&mut entity).await.unwrap();
        assert_eq!(repository.lifecycle(&entity.id).await.unwrap(), Lifecycle::Cached);

        repository.update(&entity).await.unwrap();
        assert_eq!(repository.lifecycle(&entity.id).await.unwrap(), Lifecycle::Persisted);

        repository.get(&entity.id).await.unwrap();
        assert_eq!(repository.lifecycle(&entity.id).await.unwrap(), Lifecycle::Cached);
    }

    // Construction and disposal

    #[tokio::test]
    async fn test_entity_without_key_fails_construction() {
        let calls = Arc::new(Calls::default());
        let store = SpyStore::<Memo>::new(&calls, |_| 0, |_, _| {});

        let err = Repository::<Memo, i64, _>::with_config(store, RepositoryConfig::new())
            .unwrap_err();

        assert!(matches!(err, RepositoryError::Configuration(_)));
        assert_eq!(count(&calls.release), 1);
    }

    #[tokio::test]
    async fn test_dispose_releases_store_once() {
        let calls = Arc::new(Calls::default());
        let mut repository = account_repository(account_store(&calls), RepositoryConfig::new());

        repository.dispose();
        repository.dispose();
        assert!(repository.is_disposed());
        drop(repository);

        assert_eq!(count(&calls.release), 1);
    }

    #[tokio::test]
    async fn test_drop_releases_store() {
        let calls = Arc::new(Calls::default());
        let repository = account_repository(account_store(&calls), RepositoryConfig::new());

        drop(repository);

        assert_eq!(count(&calls.release), 1);
    }

    #[tokio::test]
    async fn test_operations_after_dispose_fail() {
        let calls = Arc::new(Calls::default());
        let mut repository = account_repository(account_store(&calls), RepositoryConfig::new());
        repository.dispose();

        assert!(matches!(
            repository.get(&1).await,
            Err(RepositoryError::Disposed("Account"))
        ));
        assert!(matches!(
            repository.add(&mut account(0, "ada")).await,
            Err(RepositoryError::Disposed(_))
        ));
        assert!(matches!(
            repository.query(None),
            Err(RepositoryError::Disposed(_))
        ));
        assert!(matches!(
            repository.batch(),
            Err(RepositoryError::Disposed(_))
        ));
        assert_eq!(count(&calls.add), 0);
    }
}
