use std::{env, str::FromStr, time::Duration};

use repokit_core::sanitize::DeferredPolicy;

/// What a repository does when the store refuses to track an updated entity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrackingConflictPolicy {
    /// Log at debug level and carry on.
    #[default]
    Suppress,
    /// Fail the update with [`RepositoryError::TrackingConflict`](crate::RepositoryError::TrackingConflict).
    Propagate,
}

impl FromStr for TrackingConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "suppress" => Ok(Self::Suppress),
            "propagate" => Ok(Self::Propagate),
            other => Err(format!("unknown tracking conflict policy: {other}")),
        }
    }
}

fn parse_deferred_policy(value: &str) -> Option<DeferredPolicy> {
    match value.trim().to_ascii_lowercase().as_str() {
        "detach" => Some(DeferredPolicy::Detach),
        "materialize" => Some(DeferredPolicy::Materialize),
        _ => None,
    }
}

/// Repository configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    /// Cache TTL in seconds (default: 300)
    pub cache_ttl_seconds: u64,
    /// Maximum number of cache entries (default: 10,000)
    pub cache_max_entries: usize,
    /// Handling of tracking conflicts on update (default: suppress)
    pub tracking_conflicts: TrackingConflictPolicy,
    /// Handling of unloaded deferred navigations when caching (default: detach)
    pub deferred_policy: DeferredPolicy,
}

impl RepositoryConfig {
    /// Built-in defaults, ignoring the environment.
    pub fn new() -> Self {
        Self {
            cache_ttl_seconds: 300,
            cache_max_entries: 10_000,
            tracking_conflicts: TrackingConflictPolicy::default(),
            deferred_policy: DeferredPolicy::default(),
        }
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `REPOKIT_CACHE_TTL_SECONDS` - Cache TTL in seconds (default: 300)
    /// - `REPOKIT_CACHE_MAX_ENTRIES` - Maximum cache entries (default: 10,000)
    /// - `REPOKIT_TRACKING_CONFLICTS` - `suppress` or `propagate` (default: suppress)
    /// - `REPOKIT_DEFERRED_POLICY` - `detach` or `materialize` (default: detach)
    ///
    /// Unparsable values fall back to the default.
    pub fn from_env() -> Self {
        Self::from_vars(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading variables through `lookup`.
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::new();
        Self {
            cache_ttl_seconds: lookup("REPOKIT_CACHE_TTL_SECONDS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.cache_ttl_seconds),
            cache_max_entries: lookup("REPOKIT_CACHE_MAX_ENTRIES")
                .and_then(|v| v.parse().ok())
                .filter(|n| *n > 0)
                .unwrap_or(defaults.cache_max_entries),
            tracking_conflicts: lookup("REPOKIT_TRACKING_CONFLICTS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.tracking_conflicts),
            deferred_policy: lookup("REPOKIT_DEFERRED_POLICY")
                .and_then(|v| parse_deferred_policy(&v))
                .unwrap_or(defaults.deferred_policy),
        }
    }

    pub fn with_tracking_conflicts(mut self, policy: TrackingConflictPolicy) -> Self {
        self.tracking_conflicts = policy;
        self
    }

    pub fn with_deferred_policy(mut self, policy: DeferredPolicy) -> Self {
        self.deferred_policy = policy;
        self
    }

    /// Get cache TTL as a Duration.
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_seconds)
    }
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self::from_env()
    }
}
