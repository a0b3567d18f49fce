use thiserror::Error;

/// Errors reported by a store adapter.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{entity_type} not found: {id}")]
    NotFound {
        entity_type: &'static str,
        id: String,
    },
    #[error("{entity_type} already exists: {id}")]
    AlreadyExists {
        entity_type: &'static str,
        id: String,
    },
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),
    #[error("Query failed: {0}")]
    QueryFailed(String),
    #[error("Invalid include path for {entity_type}: {path}")]
    InvalidIncludePath {
        entity_type: &'static str,
        path: String,
    },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Store handle has been released")]
    Released,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// The store refused to track an entity as modified, typically because a
/// different instance with the same key is already tracked.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Cannot track {entity_type} {id} as modified: {reason}")]
pub struct TrackingConflict {
    pub entity_type: &'static str,
    pub id: String,
    pub reason: String,
}
