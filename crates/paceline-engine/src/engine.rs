//! Engine composition root
//!
//! [`FetchEngine`] is the single process-wide object connectors are handed.
//! It owns the limiter registry and a parallel gate table so that every
//! connector hitting the same `(host, api-class)` shares one quota budget
//! *and* one concurrency cap, instead of each connector growing its own
//! hidden singleton.
//!
//! A connector calls [`context`](FetchEngine::context) once with its
//! configuration and gets a [`FetchContext`] that hands out pre-wired
//! paginators, coalescers, and retry policies.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! use paceline_core::config::{FetchConfig, QuotaHeaderNames};
//! use paceline_core::domain::newtypes::ApiClass;
//! use paceline_engine::engine::FetchEngine;
//!
//! # async fn example<S: paceline_engine::paginate::PageSource<Item = u32>>(source: Arc<S>) {
//! let engine = FetchEngine::new();
//!
//! let config = FetchConfig {
//!     headers: QuotaHeaderNames::github(),
//!     ..Default::default()
//! };
//! let ctx = engine.context("api.github.com", ApiClass::Rest, &config);
//!
//! let mut paginator = ctx.paginator("repos/acme", source);
//! while let Some(page) = paginator.next_page().await {
//!     // ...
//! }
//! # }
//! ```

use std::fmt;
use std::hash::Hash;
use std::sync::Arc;

use dashmap::DashMap;

use paceline_core::config::{FetchConfig, IgnorePolicy, RetryConfig};
use paceline_core::domain::newtypes::ApiClass;

use crate::adaptive::AdaptiveLimiter;
use crate::coalesce::FetchCoalescer;
use crate::gate::ConcurrencyGate;
use crate::paginate::{CursorPaginator, PageSource};
use crate::registry::{LimiterKey, LimiterRegistry};
use crate::retry::RetryPolicy;

/// Process-wide fetch engine
///
/// Construct one at startup and inject it into every connector. The first
/// context created for a `(host, api-class)` fixes that key's limiter and
/// gate parameters; later contexts reuse the shared instances regardless
/// of the configuration they pass (quota budgets are a property of the
/// provider, not of any single caller).
#[derive(Debug, Default)]
pub struct FetchEngine {
    limiters: LimiterRegistry,
    gates: DashMap<LimiterKey, Arc<ConcurrencyGate>>,
}

impl FetchEngine {
    /// Creates an engine with empty registries.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fetch context for one provider surface.
    pub fn context(&self, host: &str, api_class: ApiClass, config: &FetchConfig) -> FetchContext {
        let limiter = self
            .limiters
            .get_or_create(host, api_class.clone(), || {
                AdaptiveLimiter::new(&config.limiter, config.headers.clone())
            });

        let gate = self
            .gates
            .entry(LimiterKey::new(host, api_class))
            .or_insert_with(|| Arc::new(ConcurrencyGate::new(config.max_concurrent)))
            .clone();

        FetchContext {
            limiter,
            gate,
            retry: config.retry.clone(),
            ignore: config.ignore.clone(),
        }
    }

    /// The underlying limiter registry (observability / tests).
    pub fn registry(&self) -> &LimiterRegistry {
        &self.limiters
    }
}

/// Pre-wired handles for one connector's fetches against one provider
/// surface
#[derive(Clone)]
pub struct FetchContext {
    limiter: Arc<AdaptiveLimiter>,
    gate: Arc<ConcurrencyGate>,
    retry: RetryConfig,
    ignore: IgnorePolicy,
}

impl FetchContext {
    /// Creates a paginator for one named resource.
    pub fn paginator<S: PageSource>(
        &self,
        resource: impl Into<String>,
        source: Arc<S>,
    ) -> CursorPaginator<S> {
        CursorPaginator::new(
            resource,
            source,
            Arc::clone(&self.gate),
            Arc::clone(&self.limiter),
            self.retry_policy(),
        )
    }

    /// Creates a batch-scoped coalescer for single-item enrichment fetches.
    ///
    /// One per synchronization pass; drop it when the pass ends.
    pub fn coalescer<K, V>(&self) -> FetchCoalescer<K, V>
    where
        K: Eq + Hash + Clone + fmt::Debug,
        V: Clone,
    {
        FetchCoalescer::new()
    }

    /// A retry policy with this context's settings, for fetches driven
    /// outside a paginator (e.g. coalesced single-item computes).
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.clone(), self.ignore.clone())
    }

    /// The shared adaptive limiter for this provider surface.
    pub fn limiter(&self) -> &Arc<AdaptiveLimiter> {
        &self.limiter
    }

    /// The shared concurrency gate for this provider surface.
    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }
}

impl fmt::Debug for FetchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchContext")
            .field("max_slots", &self.gate.max_slots())
            .field("retry", &self.retry)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
