//! Generic, storage-agnostic repositories.
//!
//! A [`Repository`] wraps one store session ([`StoreAdapter`]) and an
//! optional [`CachingStrategy`]. It finds the entity's key by declaration or
//! naming convention, generates client-side keys on insert, folds fetch
//! strategies into queries, and only ever caches detached copies of
//! entities.
//!
//! ```
//! use std::sync::Arc;
//!
//! use repokit::caching::MemoryCachingStrategy;
//! use repokit::storage::InMemoryDatabase;
//! use repokit::{Repository, RepositoryConfig};
//! use repokit_core::entity::{Entity, EntityShape};
//! use repokit_core::sanitize::{Sanitize, SanitizeContext};
//!
//! #[derive(Debug, Clone, Default, PartialEq)]
//! struct Customer {
//!     id: String,
//!     name: String,
//! }
//!
//! impl Entity for Customer {
//!     fn describe(shape: &mut EntityShape<Self>) {
//!         shape
//!             .field("id", |c| &c.id, |c| &mut c.id)
//!             .field("name", |c| &c.name, |c| &mut c.name);
//!     }
//! }
//!
//! impl Sanitize for Customer {
//!     fn sanitize(&self, cx: &mut SanitizeContext) -> Self {
//!         Self {
//!             id: self.id.sanitize(cx),
//!             name: self.name.sanitize(cx),
//!         }
//!     }
//! }
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let database = InMemoryDatabase::<Customer, String>::new();
//! let config = RepositoryConfig::new();
//! let caching = Arc::new(MemoryCachingStrategy::<Customer, String>::from_config(&config));
//! let mut customers: Repository<Customer, String, _> =
//!     Repository::with_config(database.open()?, config)?.with_caching(caching);
//!
//! let mut ada = Customer { name: "Ada".to_string(), ..Default::default() };
//! customers.add(&mut ada).await?;
//!
//! assert!(!ada.id.is_empty());
//! assert_eq!(customers.get(&ada.id).await?, Some(ada));
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # }).unwrap();
//! ```
//!
//! [`StoreAdapter`]: repokit_core::storage::StoreAdapter
//! [`CachingStrategy`]: repokit_core::cache::CachingStrategy

pub mod cache;
pub mod caching;
mod config;
mod error;
pub mod repository;
pub mod storage;

pub use config::{RepositoryConfig, TrackingConflictPolicy};
pub use error::{RepositoryError, Result};
pub use repository::{Batch, Lifecycle, Repository};
