use repokit_core::storage::EntryState;

/// Where an entity stands from the repository's point of view.
///
/// `Transient → Pending → Persisted → Cached → Removed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Unknown to the store and never removed through this repository.
    Transient,
    /// A change is staged in the store but not committed.
    Pending,
    /// Committed, with no cached copy.
    Persisted,
    /// Committed, and a detached copy is cached.
    Cached,
    /// Deleted through this repository.
    Removed,
}

impl Lifecycle {
    pub(crate) fn from_parts(state: EntryState, removed: bool, cached: bool) -> Self {
        match state {
            EntryState::Pending => Self::Pending,
            EntryState::Persisted if cached => Self::Cached,
            EntryState::Persisted => Self::Persisted,
            EntryState::Detached if removed => Self::Removed,
            EntryState::Detached => Self::Transient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_is_transient_unless_removed() {
        assert_eq!(
            Lifecycle::from_parts(EntryState::Detached, false, false),
            Lifecycle::Transient
        );
        assert_eq!(
            Lifecycle::from_parts(EntryState::Detached, true, false),
            Lifecycle::Removed
        );
    }

    #[test]
    fn test_pending_wins_over_cache() {
        assert_eq!(
            Lifecycle::from_parts(EntryState::Pending, false, true),
            Lifecycle::Pending
        );
    }

    #[test]
    fn test_persisted_with_and_without_cache() {
        assert_eq!(
            Lifecycle::from_parts(EntryState::Persisted, false, false),
            Lifecycle::Persisted
        );
        assert_eq!(
            Lifecycle::from_parts(EntryState::Persisted, false, true),
            Lifecycle::Cached
        );
    }
}
