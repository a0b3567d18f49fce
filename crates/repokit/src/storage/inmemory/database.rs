use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use repokit_core::entity::{resolve_key, ConfigurationError, Entity, RepositoryKey};

use super::InMemoryStore;

/// A committed row, with its insertion position.
#[derive(Debug, Clone)]
pub(super) struct Row<T> {
    pub(super) position: u64,
    pub(super) value: T,
}

#[derive(Debug)]
pub(super) struct Table<T, K> {
    pub(super) rows: HashMap<K, Row<T>>,
    /// Last store-assigned key sequence number.
    pub(super) sequence: u64,
    /// Last row insertion position.
    pub(super) position: u64,
}

impl<T, K> Table<T, K> {
    fn new() -> Self {
        Self {
            rows: HashMap::new(),
            sequence: 0,
            position: 0,
        }
    }

    pub(super) fn next_position(&mut self) -> u64 {
        self.position += 1;
        self.position
    }
}

/// In-memory table shared by every session opened on it.
///
/// Uses a HashMap wrapped in `Arc<RwLock<_>>` for thread-safe access.
/// Data is not persisted and will be lost when the last handle is dropped.
#[derive(Debug)]
pub struct InMemoryDatabase<T, K> {
    pub(super) table: Arc<RwLock<Table<T, K>>>,
}

impl<T, K> Clone for InMemoryDatabase<T, K> {
    fn clone(&self) -> Self {
        Self {
            table: Arc::clone(&self.table),
        }
    }
}

impl<T, K> Default for InMemoryDatabase<T, K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, K> InMemoryDatabase<T, K> {
    /// Creates a new empty database.
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(Table::new())),
        }
    }

    /// Number of committed rows.
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl<T, K> InMemoryDatabase<T, K>
where
    T: Entity + Clone,
    K: RepositoryKey,
{
    /// Opens a new session on this database.
    pub fn open(&self) -> Result<InMemoryStore<T, K>, ConfigurationError> {
        Ok(InMemoryStore::new(self.clone(), resolve_key::<T, K>()?))
    }

    /// Committed row for `key`, bypassing any session.
    pub async fn row(&self, key: &K) -> Option<T> {
        self.table
            .read()
            .await
            .rows
            .get(key)
            .map(|row| row.value.clone())
    }

    /// All committed rows in insertion order.
    pub async fn rows(&self) -> Vec<T> {
        let table = self.table.read().await;
        let mut rows: Vec<&Row<T>> = table.rows.values().collect();
        rows.sort_by_key(|row| row.position);
        rows.into_iter().map(|row| row.value.clone()).collect()
    }
}
