//! Two-phase primary key discovery.
//!
//! Phase one looks for members annotated with [`EntityShape::key`]; phase two
//! falls back to the naming convention (`id`, then `<entity>_id`). Both phases
//! only consider members whose declared type is the requested key type.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use parking_lot::RwLock;

use super::shape::Accessor;
use super::{normalize_name, ConfigurationError, Entity, EntityShape, Member, RepositoryKey};

/// Resolved accessors for the key member of `T`.
pub struct KeyDescriptor<T, K> {
    member: &'static str,
    get: fn(&T) -> &K,
    get_mut: fn(&mut T) -> &mut K,
}

impl<T, K> Clone for KeyDescriptor<T, K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T, K> Copy for KeyDescriptor<T, K> {}

impl<T, K> fmt::Debug for KeyDescriptor<T, K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyDescriptor")
            .field("member", &self.member)
            .field("key_type", &type_name::<K>())
            .finish()
    }
}

impl<T, K> KeyDescriptor<T, K> {
    fn from_accessor(member: &'static str, accessor: Accessor<T, K>) -> Self {
        Self {
            member,
            get: accessor.get,
            get_mut: accessor.get_mut,
        }
    }

    /// Name of the key member.
    pub fn member(&self) -> &'static str {
        self.member
    }

    pub fn get_ref<'a>(&self, entity: &'a T) -> &'a K {
        (self.get)(entity)
    }

    pub fn set(&self, entity: &mut T, key: K) {
        *(self.get_mut)(entity) = key;
    }
}

impl<T, K: Clone> KeyDescriptor<T, K> {
    pub fn get(&self, entity: &T) -> K {
        (self.get)(entity).clone()
    }
}

/// Phase one: the single member annotated as key with type `K`.
///
/// Returns `Ok(None)` when no annotated member of type `K` exists and
/// [`ConfigurationError::AmbiguousKey`] when more than one does.
pub fn find_annotated_key<T: 'static, K: Any>(
    shape: &EntityShape<T>,
) -> Result<Option<&Member<T>>, ConfigurationError> {
    let mut candidates = shape
        .members()
        .iter()
        .filter(|member| member.is_key() && member.is_of::<K>());

    let Some(first) = candidates.next() else {
        return Ok(None);
    };
    if candidates.next().is_none() {
        return Ok(Some(first));
    }

    Err(ConfigurationError::AmbiguousKey {
        entity: shape.entity_name(),
        key_type: type_name::<K>(),
        candidates: shape
            .members()
            .iter()
            .filter(|member| member.is_key() && member.is_of::<K>())
            .map(Member::name)
            .collect(),
    })
}

/// Phase two: a member of type `K` named `id`, else `<entity>_id`.
pub fn find_conventional_key<T: 'static, K: Any>(shape: &EntityShape<T>) -> Option<&Member<T>> {
    let entity_id = format!("{}id", normalize_name(shape.entity_name()));
    let typed = || shape.members().iter().filter(|member| member.is_of::<K>());

    typed()
        .find(|member| normalize_name(member.name()) == "id")
        .or_else(|| typed().find(|member| normalize_name(member.name()) == entity_id))
}

/// Runs both phases against `shape` without touching the process-wide registry.
pub fn describe_key<T: 'static, K: RepositoryKey>(
    shape: &EntityShape<T>,
) -> Result<KeyDescriptor<T, K>, ConfigurationError> {
    let no_key = || ConfigurationError::NoKey {
        entity: shape.entity_name(),
        key_type: type_name::<K>(),
    };

    let member = match find_annotated_key::<T, K>(shape)? {
        Some(member) => member,
        None => find_conventional_key::<T, K>(shape).ok_or_else(no_key)?,
    };

    member
        .accessor::<K>()
        .map(|accessor| KeyDescriptor::from_accessor(member.name(), accessor))
        .ok_or_else(no_key)
}

type Resolution<T, K> = Result<KeyDescriptor<T, K>, ConfigurationError>;

// Keyed by (entity type, key type). Entries are never removed: resolution is a
// pure function of the two types.
static REGISTRY: OnceLock<RwLock<HashMap<(TypeId, TypeId), Arc<dyn Any + Send + Sync>>>> =
    OnceLock::new();

/// Resolves the key of `T`, memoized for the lifetime of the process.
///
/// Concurrent first use may compute the descriptor more than once; the first
/// stored result wins and every caller observes the same outcome.
pub fn resolve_key<T: Entity, K: RepositoryKey>() -> Resolution<T, K> {
    let registry = REGISTRY.get_or_init(|| RwLock::new(HashMap::new()));
    let slot = (TypeId::of::<T>(), TypeId::of::<K>());

    let cached = registry
        .read()
        .get(&slot)
        .and_then(|resolved| resolved.downcast_ref::<Resolution<T, K>>().cloned());
    if let Some(resolution) = cached {
        return resolution;
    }

    let resolution = describe_key::<T, K>(&EntityShape::of());
    match &resolution {
        Ok(descriptor) => tracing::debug!(
            entity = T::entity_name(),
            member = descriptor.member(),
            "Resolved primary key"
        ),
        Err(err) => tracing::debug!(entity = T::entity_name(), error = %err, "Key resolution failed"),
    }

    let stored = Arc::clone(
        registry
            .write()
            .entry(slot)
            .or_insert_with(|| Arc::new(resolution.clone()) as Arc<dyn Any + Send + Sync>),
    );
    stored
        .downcast_ref::<Resolution<T, K>>()
        .cloned()
        .unwrap_or(resolution)
}
