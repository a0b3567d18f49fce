use std::fmt;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::storage::StoreError;

use super::{DeferredPolicy, Sanitize, SanitizeContext};

/// Loads the value behind a deferred navigation from a live store session.
pub trait Loader<T>: Send + Sync {
    fn load(&self) -> Result<T, StoreError>;
}

impl<T, F> Loader<T> for F
where
    F: Fn() -> Result<T, StoreError> + Send + Sync,
{
    fn load(&self) -> Result<T, StoreError> {
        self()
    }
}

/// A navigation value still attached to the store that produced it.
///
/// The value is fetched on first access and kept afterwards.
pub struct Deferred<T> {
    loader: Arc<dyn Loader<T>>,
    slot: OnceLock<T>,
}

impl<T> Deferred<T> {
    pub fn new(loader: Arc<dyn Loader<T>>) -> Self {
        Self {
            loader,
            slot: OnceLock::new(),
        }
    }

    /// The value, if it has already been loaded. Never performs I/O.
    pub fn loaded(&self) -> Option<&T> {
        self.slot.get()
    }

    /// The value, loading it on first call.
    pub fn load(&self) -> Result<&T, StoreError> {
        if let Some(value) = self.slot.get() {
            return Ok(value);
        }
        let value = self.loader.load()?;
        Ok(self.slot.get_or_init(|| value))
    }
}

impl<T: Clone> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            loader: Arc::clone(&self.loader),
            slot: self.slot.clone(),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Deferred")
            .field("loaded", &self.slot.get())
            .finish_non_exhaustive()
    }
}

/// A navigation member: related data that may or may not be present.
#[derive(Debug, Clone)]
pub enum Related<T> {
    /// Nothing loaded. Reading it never touches the store.
    Unloaded,
    /// Plain, detached data.
    Loaded(T),
    /// Attached to a live store session.
    Deferred(Deferred<T>),
}

impl<T> Related<T> {
    pub fn deferred(loader: impl Loader<T> + 'static) -> Self {
        Self::Deferred(Deferred::new(Arc::new(loader)))
    }

    /// The value if present, without any I/O.
    pub fn peek(&self) -> Option<&T> {
        match self {
            Self::Unloaded => None,
            Self::Loaded(value) => Some(value),
            Self::Deferred(deferred) => deferred.loaded(),
        }
    }

    /// The value, loading a deferred navigation if needed.
    pub fn get(&self) -> Result<Option<&T>, StoreError> {
        match self {
            Self::Deferred(deferred) => deferred.load().map(Some),
            _ => Ok(self.peek()),
        }
    }

    /// Returns true if this value still holds a live store handle.
    pub fn is_attached(&self) -> bool {
        matches!(self, Self::Deferred(_))
    }
}

impl<T> Default for Related<T> {
    fn default() -> Self {
        Self::Unloaded
    }
}

impl<T: PartialEq> PartialEq for Related<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Unloaded, Self::Unloaded) => true,
            (Self::Loaded(a), Self::Loaded(b)) => a == b,
            (Self::Deferred(a), Self::Deferred(b)) => {
                Arc::ptr_eq(&a.loader, &b.loader) && a.loaded() == b.loaded()
            }
            _ => false,
        }
    }
}

impl<T: Sanitize> Sanitize for Related<T> {
    fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
        if cx.is_shallow() {
            return Self::Unloaded;
        }

        let value = match self {
            Self::Unloaded => None,
            Self::Loaded(value) => Some(value),
            Self::Deferred(deferred) => match (deferred.loaded(), cx.policy()) {
                (Some(value), _) => Some(value),
                (None, DeferredPolicy::Detach) => None,
                (None, DeferredPolicy::Materialize) => match deferred.load() {
                    Ok(value) => Some(value),
                    Err(err) => {
                        tracing::warn!(error = %err, "Deferred navigation failed to load, caching it unloaded");
                        None
                    }
                },
            },
        };

        // A navigation leading back to a node still being copied closes a
        // strong cycle; the copy keeps it unloaded.
        value
            .and_then(|value| cx.unless_cycle(|cx| value.sanitize(cx)))
            .map_or(Self::Unloaded, Self::Loaded)
    }
}

impl<T: Serialize> Serialize for Related<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.peek().serialize(serializer)
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Related<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<T>::deserialize(deserializer)? {
            Some(value) => Self::Loaded(value),
            None => Self::Unloaded,
        })
    }
}
