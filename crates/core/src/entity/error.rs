use std::any::type_name;

use thiserror::Error;

/// Errors raised while resolving the key member of an entity type.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("No key member of type {key_type} found on {entity}")]
    NoKey {
        entity: &'static str,
        key_type: &'static str,
    },
    #[error("Ambiguous key on {entity}: {candidates:?} are all annotated as {key_type} keys")]
    AmbiguousKey {
        entity: &'static str,
        key_type: &'static str,
        candidates: Vec<&'static str>,
    },
}

/// Raised when a key value is requested for a key type the client cannot
/// generate (e.g. integer keys, which the store assigns).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Primary key could not be generated: {key_type} keys are assigned by the store")]
pub struct UnsupportedKeyTypeError {
    pub key_type: &'static str,
}

impl UnsupportedKeyTypeError {
    pub fn new<K>() -> Self {
        Self {
            key_type: type_name::<K>(),
        }
    }
}
