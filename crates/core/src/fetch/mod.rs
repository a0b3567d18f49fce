//! Eager-loading requests.
//!
//! A [`FetchStrategy`] names the related data a caller wants loaded together
//! with an entity, as dot-separated navigation paths such as `orders.lines`.
//! Paths are opaque at this layer; the store adapter interprets and validates
//! them.

use std::fmt;
use std::marker::PhantomData;

use crate::storage::{Result, StoreQuery};

/// Ordered include paths for entity type `T`.
pub struct FetchStrategy<T> {
    paths: Vec<String>,
    _entity: PhantomData<fn() -> T>,
}

impl<T> FetchStrategy<T> {
    /// Creates an empty strategy (no eager loading).
    pub fn new() -> Self {
        Self {
            paths: Vec::new(),
            _entity: PhantomData,
        }
    }

    /// Appends an include path.
    pub fn include(mut self, path: impl Into<String>) -> Self {
        self.paths.push(path.into());
        self
    }

    /// Include paths in declaration order.
    pub fn include_paths(&self) -> impl Iterator<Item = &str> {
        self.paths.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// Stable textual identity of the strategy, used to key cached query
    /// results. Each path is length-prefixed, so distinct path lists never
    /// share a fingerprint whatever characters the paths contain.
    pub fn fingerprint(&self) -> String {
        self.paths
            .iter()
            .map(|path| format!("{}:{}", path.len(), path))
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Folds every include path into `query`, in declaration order.
    pub fn apply<Q>(&self, query: Q) -> Result<Q>
    where
        T: Send,
        Q: StoreQuery<T>,
    {
        self.paths
            .iter()
            .try_fold(query, |query, path| query.include(path))
    }
}

/// Applies an optional strategy; `None` leaves the query untouched.
pub fn apply_fetch_strategy<T, Q>(query: Q, strategy: Option<&FetchStrategy<T>>) -> Result<Q>
where
    T: Send,
    Q: StoreQuery<T>,
{
    match strategy {
        Some(strategy) => strategy.apply(query),
        None => Ok(query),
    }
}

impl<T> Default for FetchStrategy<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for FetchStrategy<T> {
    fn clone(&self) -> Self {
        Self {
            paths: self.paths.clone(),
            _entity: PhantomData,
        }
    }
}

impl<T> PartialEq for FetchStrategy<T> {
    fn eq(&self, other: &Self) -> bool {
        self.paths == other.paths
    }
}

impl<T> Eq for FetchStrategy<T> {}

impl<T> fmt::Debug for FetchStrategy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("FetchStrategy").field(&self.paths).finish()
    }
}

impl<T, S: Into<String>> FromIterator<S> for FetchStrategy<T> {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            paths: iter.into_iter().map(Into::into).collect(),
            _entity: PhantomData,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreError;
    use async_trait::async_trait;

    struct Customer;

    #[derive(Debug, Default)]
    struct RecordingQuery {
        includes: Vec<String>,
    }

    #[async_trait]
    impl StoreQuery<Customer> for RecordingQuery {
        fn include(mut self, path: &str) -> Result<Self> {
            if path.is_empty() {
                return Err(StoreError::InvalidIncludePath {
                    entity_type: "Customer",
                    path: path.to_string(),
                });
            }
            self.includes.push(path.to_string());
            Ok(self)
        }

        async fn fetch(self) -> Result<Vec<Customer>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_empty_strategy() {
        let strategy = FetchStrategy::<Customer>::new();

        assert!(strategy.is_empty());
        assert_eq!(strategy.fingerprint(), "");
        assert_eq!(strategy.include_paths().count(), 0);
    }

    #[test]
    fn test_include_preserves_order_and_duplicates() {
        let strategy = FetchStrategy::<Customer>::new()
            .include("orders")
            .include("orders.lines")
            .include("orders");

        let paths: Vec<_> = strategy.include_paths().collect();
        assert_eq!(paths, vec!["orders", "orders.lines", "orders"]);
        assert_eq!(strategy.len(), 3);
    }

    #[test]
    fn test_from_iterator() {
        let strategy: FetchStrategy<Customer> = ["orders", "orders.lines"].into_iter().collect();

        assert_eq!(strategy.fingerprint(), "6:orders|12:orders.lines");
        assert_eq!(
            strategy,
            FetchStrategy::new().include("orders").include("orders.lines")
        );
    }

    #[test]
    fn test_fingerprint_distinguishes_separator_in_path() {
        let joined = FetchStrategy::<Customer>::new().include("a|b");
        let split = FetchStrategy::<Customer>::new().include("a").include("b");
        let empty_path = FetchStrategy::<Customer>::new().include("");

        assert_ne!(joined.fingerprint(), split.fingerprint());
        assert_ne!(empty_path.fingerprint(), FetchStrategy::<Customer>::new().fingerprint());
    }

    #[test]
    fn test_apply_folds_paths_in_order() {
        let strategy: FetchStrategy<Customer> = ["Orders", "Orders.Items"].into_iter().collect();

        let query = strategy.apply(RecordingQuery::default()).unwrap();

        assert_eq!(query.includes, vec!["Orders", "Orders.Items"]);
    }

    #[test]
    fn test_apply_propagates_adapter_rejection() {
        let strategy: FetchStrategy<Customer> = ["orders", ""].into_iter().collect();

        let result = strategy.apply(RecordingQuery::default());

        assert!(matches!(
            result,
            Err(StoreError::InvalidIncludePath { .. })
        ));
    }

    #[test]
    fn test_apply_without_strategy_is_noop() {
        let query = apply_fetch_strategy::<Customer, _>(RecordingQuery::default(), None).unwrap();

        assert!(query.includes.is_empty());
    }
}
