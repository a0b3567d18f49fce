use repokit_core::entity::{Entity, RepositoryKey};
use repokit_core::sanitize::Sanitize;
use repokit_core::storage::StoreAdapter;

use super::{Change, Lifecycle, Repository};
use crate::Result;

/// A group of writes committed to the store at once.
///
/// Each write is staged in the store immediately; cache effects wait for
/// [`commit`](Batch::commit). Dropping a batch without committing discards
/// everything it staged.
pub struct Batch<'a, T, K, S>
where
    T: Entity,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    repository: &'a mut Repository<T, K, S>,
    changes: Vec<Change<T, K>>,
    committed: bool,
}

impl<'a, T, K, S> Batch<'a, T, K, S>
where
    T: Entity + Sanitize,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    pub(super) fn new(repository: &'a mut Repository<T, K, S>) -> Self {
        Self {
            repository,
            changes: Vec::new(),
            committed: false,
        }
    }

    pub async fn add(&mut self, entity: &mut T) -> Result<()> {
        let change = self.repository.stage_add(entity).await?;
        self.changes.push(change);
        Ok(())
    }

    pub async fn update(&mut self, entity: &T) -> Result<()> {
        let change = self.repository.stage_update(entity).await?;
        self.changes.push(change);
        Ok(())
    }

    pub async fn delete(&mut self, entity: &T) -> Result<()> {
        let change = self.repository.stage_delete(entity).await?;
        self.changes.push(change);
        Ok(())
    }

    /// Number of writes staged so far.
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub async fn lifecycle(&self, key: &K) -> Result<Lifecycle> {
        self.repository.lifecycle(key).await
    }

    /// Commits every staged write, then applies their cache effects.
    pub async fn commit(mut self) -> Result<()> {
        self.repository.commit_staged().await?;
        self.committed = true;

        let changes = std::mem::take(&mut self.changes);
        tracing::debug!(
            entity = T::entity_name(),
            changes = changes.len(),
            "Batch committed"
        );
        self.repository.settle(changes).await;
        Ok(())
    }
}

impl<T, K, S> Drop for Batch<'_, T, K, S>
where
    T: Entity,
    K: RepositoryKey,
    S: StoreAdapter<T, K>,
{
    fn drop(&mut self) {
        if !self.committed {
            if !self.changes.is_empty() {
                tracing::debug!(
                    entity = T::entity_name(),
                    changes = self.changes.len(),
                    "Discarding uncommitted batch"
                );
            }
            self.repository.discard_staged();
        }
    }
}
