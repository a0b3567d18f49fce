//! Storage-agnostic building blocks for repositories.
//!
//! This crate holds the pure parts: how an entity's key is found and
//! generated, how eager loading is requested, how values are detached before
//! caching, and the traits a store or cache backend implements. The
//! `repokit` crate wires them into a working repository.

pub mod cache;
pub mod entity;
pub mod fetch;
pub mod sanitize;
pub mod storage;
