//! Repository orchestration over a store adapter and an optional cache.

mod base;
mod batch;
mod lifecycle;

pub use base::Repository;
pub use batch::Batch;
pub use lifecycle::Lifecycle;

/// A staged write whose cache effects are applied once the store commits.
#[derive(Debug)]
enum Change<T, K> {
    Added { key: K, copy: Option<T> },
    Updated(K),
    Deleted(K),
}
