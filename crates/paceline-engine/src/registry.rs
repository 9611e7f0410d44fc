//! Process-wide limiter registry
//!
//! One [`AdaptiveLimiter`] per `(host, api-class)`, shared by every caller
//! that matches the key, so unrelated connectors hitting the same provider
//! contend on the same quota budget. The registry replaces the ad-hoc
//! per-connector singletons this pattern tends to grow: it is owned by the
//! process composition root and injected into connectors.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use paceline_core::domain::newtypes::ApiClass;

use crate::adaptive::AdaptiveLimiter;

/// Key identifying one shared quota budget
///
/// Host names are normalized to lowercase so `API.github.com` and
/// `api.github.com` share a limiter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LimiterKey {
    host: String,
    api_class: ApiClass,
}

impl LimiterKey {
    /// Creates a key, normalizing the host.
    pub fn new(host: impl AsRef<str>, api_class: ApiClass) -> Self {
        Self {
            host: host.as_ref().to_ascii_lowercase(),
            api_class,
        }
    }

    /// The normalized host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// The API class.
    pub fn api_class(&self) -> &ApiClass {
        &self.api_class
    }
}

/// Registry of shared adaptive limiters, keyed by `(host, api-class)`
///
/// The first caller for a key constructs the limiter; every subsequent
/// caller receives the same `Arc`. Construction is race-free under a
/// concurrent first-access stampede (the map's shard lock serializes the
/// `or_insert_with`), so at most one instance ever exists per key.
/// Entries live for the process lifetime and are never evicted.
#[derive(Debug, Default)]
pub struct LimiterRegistry {
    limiters: DashMap<LimiterKey, Arc<AdaptiveLimiter>>,
}

impl LimiterRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the limiter for `(host, api_class)`, constructing it with
    /// `init` on first access.
    ///
    /// `init` runs at most once per key; losers of a first-access race
    /// never invoke it.
    pub fn get_or_create<F>(&self, host: &str, api_class: ApiClass, init: F) -> Arc<AdaptiveLimiter>
    where
        F: FnOnce() -> AdaptiveLimiter,
    {
        let key = LimiterKey::new(host, api_class);
        self.limiters
            .entry(key.clone())
            .or_insert_with(|| {
                debug!(host = key.host(), api_class = %key.api_class(), "Creating limiter");
                Arc::new(init())
            })
            .clone()
    }

    /// Looks up an existing limiter without creating one.
    pub fn get(&self, host: &str, api_class: ApiClass) -> Option<Arc<AdaptiveLimiter>> {
        self.limiters
            .get(&LimiterKey::new(host, api_class))
            .map(|entry| entry.clone())
    }

    /// Number of registered limiters.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    /// True if no limiter has been created yet.
    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================
