use thiserror::Error;

use repokit_core::entity::{ConfigurationError, UnsupportedKeyTypeError};
use repokit_core::storage::{StoreError, TrackingConflict};

/// Errors surfaced by [`Repository`](crate::Repository) operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// The entity type has no usable primary key.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A key had to be generated for a type that cannot generate one.
    #[error(transparent)]
    UnsupportedKeyType(#[from] UnsupportedKeyTypeError),
    /// The store adapter failed; the error is passed through unchanged.
    #[error(transparent)]
    Backend(#[from] StoreError),
    /// Only raised under [`TrackingConflictPolicy::Propagate`](crate::TrackingConflictPolicy::Propagate).
    #[error(transparent)]
    TrackingConflict(#[from] TrackingConflict),
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("Repository for {0} has been disposed")]
    Disposed(&'static str),
}

/// Result type for repository operations.
pub type Result<T> = std::result::Result<T, RepositoryError>;
