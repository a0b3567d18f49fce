//! Byte cache backends.
//!
//! This module provides concrete implementations of the `Cache` trait
//! defined in `repokit_core::cache`, selected via feature flags.
//!
//! # Feature Flags
//!
//! - `memory` (default): In-memory cache using tokio synchronization primitives

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "memory")]
pub use memory::MemoryCache;
