use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use repokit_core::entity::{normalize_name, Entity, RepositoryKey};
use repokit_core::storage::{Result, StoreError, StoreQuery};

use super::InMemoryDatabase;

type Predicate<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

/// Query over the committed rows of an [`InMemoryDatabase`].
///
/// Rows are returned in insertion order. Every navigation is already held in
/// memory, so includes are only validated: the first segment of a path must
/// name a declared member of the entity.
pub struct InMemoryQuery<T, K> {
    database: InMemoryDatabase<T, K>,
    entity_type: &'static str,
    members: Arc<[String]>,
    includes: Vec<String>,
    predicate: Option<Predicate<T>>,
    limit: Option<usize>,
}

impl<T: 'static, K> InMemoryQuery<T, K> {
    pub(super) fn new(
        database: InMemoryDatabase<T, K>,
        entity_type: &'static str,
        members: Arc<[String]>,
    ) -> Self {
        Self {
            database,
            entity_type,
            members,
            includes: Vec::new(),
            predicate: None,
            limit: None,
        }
    }

    /// Keeps only rows matching `predicate`, in addition to earlier filters.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.predicate = Some(match self.predicate.take() {
            Some(previous) => Arc::new(move |row: &T| previous(row) && predicate(row)),
            None => Arc::new(predicate),
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Include paths accepted so far, in the order they were added.
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    fn resolves(&self, path: &str) -> bool {
        let mut segments = path.split('.');
        let Some(first) = segments.next() else {
            return false;
        };
        !first.is_empty()
            && segments.all(|segment| !segment.is_empty())
            && self.members.contains(&normalize_name(first))
    }
}

impl<T, K> fmt::Debug for InMemoryQuery<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryQuery")
            .field("entity_type", &self.entity_type)
            .field("includes", &self.includes)
            .field("filtered", &self.predicate.is_some())
            .field("limit", &self.limit)
            .finish()
    }
}

#[async_trait]
impl<T, K> StoreQuery<T> for InMemoryQuery<T, K>
where
    T: Entity + Clone,
    K: RepositoryKey,
{
    fn include(mut self, path: &str) -> Result<Self> {
        if !self.resolves(path) {
            return Err(StoreError::InvalidIncludePath {
                entity_type: self.entity_type,
                path: path.to_string(),
            });
        }
        self.includes.push(path.to_string());
        Ok(self)
    }

    async fn fetch(self) -> Result<Vec<T>> {
        let table = self.database.table.read().await;
        let mut rows: Vec<_> = table.rows.values().collect();
        rows.sort_by_key(|row| row.position);

        let predicate = self.predicate.as_deref();
        let rows: Vec<T> = rows
            .into_iter()
            .map(|row| &row.value)
            .filter(|value| predicate.is_none_or(|keep| keep(*value)))
            .take(self.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect();

        tracing::trace!(
            entity = self.entity_type,
            includes = ?self.includes,
            count = rows.len(),
            "Fetched rows"
        );
        Ok(rows)
    }
}
