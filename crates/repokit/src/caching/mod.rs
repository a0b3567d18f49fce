//! Typed caching strategies a [`Repository`](crate::Repository) can consult.
//!
//! - [`MemoryCachingStrategy`]: keeps detached values in process memory
//! - [`SerializedCachingStrategy`]: stores JSON in any byte [`Cache`](repokit_core::cache::Cache)

#[cfg(feature = "memory")]
mod memory;
mod serialized;

#[cfg(feature = "memory")]
pub use memory::MemoryCachingStrategy;
pub use serialized::SerializedCachingStrategy;
