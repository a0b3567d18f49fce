//! Cache key layout.
//!
//! Every key is namespaced by the entity name, so one byte cache can be
//! shared by several repositories:
//!
//! - `{entity}:item:{key}` for a single entity
//! - `{entity}:query:{fingerprint}` for the result of a query, where the
//!   fingerprint identifies the fetch strategy it was run with

use std::fmt::Display;

/// Returns the cache key for a single entity.
pub fn entity_key(entity: &str, key: &impl Display) -> String {
    format!("{}:item:{}", entity, key)
}

/// Returns the pattern matching every cached value of an entity type.
pub fn entity_pattern(entity: &str) -> String {
    format!("{}:*", entity)
}

/// Returns the cache key for a query result.
pub fn query_key(entity: &str, fingerprint: &str) -> String {
    format!("{}:query:{}", entity, fingerprint)
}

/// Returns the pattern matching every cached query result of an entity type.
pub fn query_pattern(entity: &str) -> String {
    format!("{}:query:*", entity)
}
