use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use repokit_core::entity::{
    normalize_name, Entity, EntityShape, KeyDescriptor, KeyGeneration, RepositoryKey,
};
use repokit_core::storage::{EntryState, Result, StoreAdapter, StoreError, TrackingConflict};

use super::database::Row;
use super::{InMemoryDatabase, InMemoryQuery};

#[derive(Debug)]
enum Staged<T> {
    Insert(T),
    Update(T),
    Delete,
}

/// A staged change and the order it was first staged in.
#[derive(Debug)]
struct Pending<T> {
    order: u64,
    change: Staged<T>,
}

/// One session on an [`InMemoryDatabase`].
///
/// Changes are staged per key and applied atomically on commit: either every
/// staged change is valid against the committed rows, or none is applied.
/// Integer keys are assigned from the database sequence when an entity with
/// an unassigned key is added.
#[derive(Debug)]
pub struct InMemoryStore<T, K> {
    database: InMemoryDatabase<T, K>,
    key: KeyDescriptor<T, K>,
    members: Arc<[String]>,
    staged: HashMap<K, Pending<T>>,
    staged_count: u64,
    released: bool,
}

impl<T, K> InMemoryStore<T, K>
where
    T: Entity + Clone,
    K: RepositoryKey,
{
    pub(super) fn new(database: InMemoryDatabase<T, K>, key: KeyDescriptor<T, K>) -> Self {
        let members = EntityShape::<T>::of()
            .members()
            .iter()
            .map(|member| normalize_name(member.name()))
            .collect();
        Self {
            database,
            key,
            members,
            staged: HashMap::new(),
            staged_count: 0,
            released: false,
        }
    }

    /// Number of keys with staged changes.
    pub fn staged(&self) -> usize {
        self.staged.len()
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    fn ensure_open(&self) -> Result<()> {
        if self.released {
            return Err(StoreError::Released);
        }
        Ok(())
    }

    fn stage(&mut self, key: K, change: Staged<T>) {
        self.staged_count += 1;
        let order = self.staged_count;
        self.staged.insert(key, Pending { order, change });
    }

    fn staged_change(&self, key: &K) -> Option<&Staged<T>> {
        self.staged.get(key).map(|pending| &pending.change)
    }

    fn conflict(&self, key: &K, reason: &str) -> TrackingConflict {
        TrackingConflict {
            entity_type: T::entity_name(),
            id: key.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl<T, K> StoreAdapter<T, K> for InMemoryStore<T, K>
where
    T: Entity + Clone,
    K: RepositoryKey,
{
    type Query = InMemoryQuery<T, K>;

    async fn add(&mut self, entity: &mut T) -> Result<()> {
        self.ensure_open()?;
        let entity_type = T::entity_name();
        let mut table = self.database.table.write().await;

        let sequenced = K::GENERATION == KeyGeneration::Store;
        let assigned = if sequenced && self.key.get_ref(entity).is_unassigned() {
            let next = table.sequence + 1;
            let key = K::from_sequence(next).ok_or_else(|| {
                StoreError::InvalidData(format!(
                    "{} key sequence exhausted at {}",
                    entity_type, table.sequence
                ))
            })?;
            Some(key)
        } else {
            None
        };

        let key = match &assigned {
            Some(key) => key.clone(),
            None => self.key.get(entity),
        };
        if key.is_unassigned() {
            return Err(StoreError::InvalidData(format!(
                "{} has no key assigned",
                entity_type
            )));
        }

        let exists = table.rows.contains_key(&key);
        let staged = match self.staged_change(&key) {
            Some(Staged::Delete) if exists => Staged::Update,
            None if !exists => Staged::Insert,
            _ => {
                return Err(StoreError::AlreadyExists {
                    entity_type,
                    id: key.to_string(),
                })
            }
        };

        // The sequence stays ahead of every key handed to the table, explicit
        // ones included.
        if sequenced {
            if let Some(value) = key.to_sequence() {
                table.sequence = table.sequence.max(value);
            }
        }
        drop(table);

        if assigned.is_some() {
            self.key.set(entity, key.clone());
        }

        tracing::trace!(entity = entity_type, key = %key, "Staged insert");
        self.stage(key, staged(entity.clone()));
        Ok(())
    }

    async fn remove(&mut self, entity: &T) -> Result<()> {
        self.ensure_open()?;
        let key = self.key.get(entity);

        if let Some(Staged::Insert(_)) = self.staged_change(&key) {
            self.staged.remove(&key);
            return Ok(());
        }

        let exists = self.database.table.read().await.rows.contains_key(&key);
        if !exists || matches!(self.staged_change(&key), Some(Staged::Delete)) {
            return Err(StoreError::NotFound {
                entity_type: T::entity_name(),
                id: key.to_string(),
            });
        }

        tracing::trace!(entity = T::entity_name(), key = %key, "Staged delete");
        self.stage(key, Staged::Delete);
        Ok(())
    }

    async fn mark_modified(&mut self, entity: &T) -> std::result::Result<(), TrackingConflict> {
        let key = self.key.get(entity);
        if self.released {
            return Err(self.conflict(&key, "store handle has been released"));
        }
        if key.is_unassigned() {
            return Err(self.conflict(&key, "key is unassigned"));
        }

        match self.staged.get_mut(&key).map(|pending| &mut pending.change) {
            Some(Staged::Delete) => Err(self.conflict(&key, "entity is staged for removal")),
            Some(Staged::Insert(value)) | Some(Staged::Update(value)) => {
                *value = entity.clone();
                Ok(())
            }
            None => {
                tracing::trace!(entity = T::entity_name(), key = %key, "Staged update");
                self.stage(key, Staged::Update(entity.clone()));
                Ok(())
            }
        }
    }

    async fn find_by_key(&mut self, key: &K) -> Result<Option<T>> {
        self.ensure_open()?;
        match self.staged_change(key) {
            Some(Staged::Insert(value)) | Some(Staged::Update(value)) => Ok(Some(value.clone())),
            Some(Staged::Delete) => Ok(None),
            None => Ok(self.database.row(key).await),
        }
    }

    fn query(&self) -> Result<Self::Query> {
        self.ensure_open()?;
        Ok(InMemoryQuery::new(
            self.database.clone(),
            T::entity_name(),
            Arc::clone(&self.members),
        ))
    }

    async fn commit(&mut self) -> Result<()> {
        self.ensure_open()?;
        if self.staged.is_empty() {
            return Ok(());
        }

        let entity_type = T::entity_name();
        let mut table = self.database.table.write().await;

        for (key, pending) in &self.staged {
            let exists = table.rows.contains_key(key);
            match pending.change {
                Staged::Insert(_) if exists => {
                    return Err(StoreError::AlreadyExists {
                        entity_type,
                        id: key.to_string(),
                    })
                }
                Staged::Update(_) | Staged::Delete if !exists => {
                    return Err(StoreError::NotFound {
                        entity_type,
                        id: key.to_string(),
                    })
                }
                _ => {}
            }
        }

        let mut changes: Vec<(K, Pending<T>)> = self.staged.drain().collect();
        changes.sort_by_key(|(_, pending)| pending.order);
        let count = changes.len();
        for (key, pending) in changes {
            match pending.change {
                Staged::Insert(value) => {
                    let position = table.next_position();
                    table.rows.insert(key, Row { position, value });
                }
                Staged::Update(value) => {
                    if let Some(row) = table.rows.get_mut(&key) {
                        row.value = value;
                    }
                }
                Staged::Delete => {
                    table.rows.remove(&key);
                }
            }
        }

        tracing::debug!(entity = entity_type, changes = count, "Committed staged changes");
        Ok(())
    }

    fn discard(&mut self) {
        if !self.staged.is_empty() {
            tracing::debug!(
                entity = T::entity_name(),
                changes = self.staged.len(),
                "Discarded staged changes"
            );
            self.staged.clear();
        }
    }

    async fn entry_state(&self, key: &K) -> Result<EntryState> {
        self.ensure_open()?;
        if self.staged.contains_key(key) {
            return Ok(EntryState::Pending);
        }
        if self.database.table.read().await.rows.contains_key(key) {
            return Ok(EntryState::Persisted);
        }
        Ok(EntryState::Detached)
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.staged.clear();
            tracing::debug!(entity = T::entity_name(), "Released in-memory session");
        }
    }
}
