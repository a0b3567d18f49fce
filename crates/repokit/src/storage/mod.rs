//! Store adapter implementations.
//!
//! This module provides concrete implementations of the store traits
//! defined in `repokit_core::storage`, selected via feature flags.
//!
//! # Feature Flags
//!
//! - `inmemory` (default): process-local tables, for tests and prototypes

#[cfg(feature = "inmemory")]
pub mod inmemory;

#[cfg(feature = "inmemory")]
pub use inmemory::{InMemoryDatabase, InMemoryQuery, InMemoryStore};
