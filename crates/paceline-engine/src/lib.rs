//! Paceline Engine - adaptive rate-limited paginated fetching
//!
//! The engine every connector shares instead of re-implementing: fetch an
//! unbounded paginated collection from a rate-limited HTTP/GraphQL API
//! without exceeding the provider's quota, with bounded local concurrency,
//! header-driven rate adaptation, in-flight deduplication, and retry with
//! quota-aware backoff.
//!
//! ## Modules
//!
//! - [`bucket`] - continuous-refill token bucket (admission primitive)
//! - [`adaptive`] - retunes the bucket from provider quota headers
//! - [`gate`] - bounded concurrency with RAII slot release
//! - [`registry`] - one shared limiter per `(host, api-class)`
//! - [`paginate`] - lazy cursor-driven page sequences
//! - [`coalesce`] - batch-scoped deduplication of identical fetches
//! - [`retry`] - failure classification, backoff, quota-reset sleeps
//! - [`engine`] - composition root wiring the above together
//!
//! ## Control flow
//!
//! A connector asks a [`paginate::CursorPaginator`] for the next page. The
//! paginator takes a [`gate::ConcurrencyGate`] slot, acquires from the
//! [`adaptive::AdaptiveLimiter`] (shared through the
//! [`registry::LimiterRegistry`]), runs the connector's `fetch_page`,
//! feeds the response headers back into the limiter, and yields the items.
//! Failures pass through [`retry::RetryPolicy`] before any of that
//! surfaces. Single-item enrichment fetches go through a
//! [`coalesce::FetchCoalescer`] so redundant concurrent requests collapse
//! into one call per batch.
//!
//! All engine state lives in process memory; a restart resets quota
//! tracking to the configured defaults.

pub mod adaptive;
pub mod bucket;
pub mod coalesce;
pub mod engine;
pub mod gate;
pub mod paginate;
pub mod registry;
pub mod retry;

pub use adaptive::AdaptiveLimiter;
pub use bucket::TokenBucketLimiter;
pub use coalesce::FetchCoalescer;
pub use engine::{FetchContext, FetchEngine};
pub use gate::{ConcurrencyGate, SlotGuard};
pub use paginate::{CursorPaginator, FetchedPage, PageSource};
pub use registry::{LimiterKey, LimiterRegistry};
pub use retry::{parse_retry_after, RetryPolicy};
