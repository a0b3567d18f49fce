mod error;
mod traits;

pub use error::{Result, StoreError, TrackingConflict};
pub use traits::{EntryState, StoreAdapter, StoreQuery};
