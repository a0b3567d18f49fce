//! In-memory store adapter.
//!
//! An [`InMemoryDatabase`] is the shared backing table; each
//! [`InMemoryStore`] opened on it is one session that stages changes until
//! it commits.

mod database;
mod query;
mod store;

pub use database::InMemoryDatabase;
pub use query::InMemoryQuery;
pub use store::InMemoryStore;
