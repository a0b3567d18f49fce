//! In-memory cache backend implementation.
//!
//! Provides a thread-safe in-memory cache with TTL support and LRU eviction
//! for single-process deployments.

mod cache;
mod entry;

pub use cache::MemoryCache;
pub(crate) use entry::{capacity, CacheEntry};
