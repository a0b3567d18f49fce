use async_trait::async_trait;

use super::{Result, TrackingConflict};

/// Where an entity stands from the store's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// The store knows nothing about the key.
    Detached,
    /// A change for the key is staged but not yet committed.
    Pending,
    /// The key is committed and nothing is staged for it.
    Persisted,
}

/// A composable query over one entity set, produced by a store adapter.
#[async_trait]
pub trait StoreQuery<T: Send>: Sized + Send {
    /// Adds an eager-load directive for a dot-separated navigation path.
    ///
    /// Adapters reject paths they cannot resolve with
    /// [`StoreError::InvalidIncludePath`](super::StoreError::InvalidIncludePath).
    fn include(self, path: &str) -> Result<Self>;

    /// Runs the query.
    async fn fetch(self) -> Result<Vec<T>>;
}

/// The persistence backend behind a repository.
///
/// One adapter value is one store-connection handle: it stages changes until
/// [`commit`](StoreAdapter::commit) and is released exactly once by the
/// owning repository.
#[async_trait]
pub trait StoreAdapter<T: Send + Sync, K: Send + Sync>: Send + Sync {
    type Query: StoreQuery<T>;

    /// Stages a new entity. The adapter may assign store-generated keys on
    /// `entity`.
    async fn add(&mut self, entity: &mut T) -> Result<()>;

    /// Stages removal of an entity.
    async fn remove(&mut self, entity: &T) -> Result<()>;

    /// Marks an entity as modified, attaching it first if it was never loaded
    /// through this handle.
    async fn mark_modified(&mut self, entity: &T) -> std::result::Result<(), TrackingConflict>;

    /// Looks an entity up by key, including staged changes.
    async fn find_by_key(&mut self, key: &K) -> Result<Option<T>>;

    /// Starts a query over the full entity set.
    fn query(&self) -> Result<Self::Query>;

    /// Applies all staged changes.
    async fn commit(&mut self) -> Result<()>;

    /// Drops all staged changes.
    fn discard(&mut self);

    async fn entry_state(&self, key: &K) -> Result<EntryState>;

    /// Releases the underlying connection handle.
    fn release(&mut self);
}
