//! In-flight fetch deduplication
//!
//! [`FetchCoalescer`] collapses concurrent identical fetches into one
//! underlying call and caches the result for the scope of a batch (one
//! synchronization pass). Enrichment steps frequently request the same
//! resource - the same file, the same user record - from many places in a
//! pass; only the first request per key actually hits the provider.
//!
//! The in-flight table holds *weak* handles to the shared computation, so
//! waiter lifetime drives the fetch: detaching one waiter leaves the fetch
//! running for the rest, and dropping the last waiter drops (cancels) the
//! computation itself. Settled failures are never cached - a later call for
//! the same key retries.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use paceline_engine::coalesce::FetchCoalescer;
//!
//! # async fn example() {
//! // One coalescer per synchronization pass
//! let coalescer: FetchCoalescer<String, u64> = FetchCoalescer::new();
//!
//! let size = coalescer
//!     .get("acme/widgets/main/README.md".to_string(), || async {
//!         // ... fetch the resource ...
//!         Ok(1024)
//!     })
//!     .await;
//! # let _ = size;
//! # }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use futures_util::future::{BoxFuture, FutureExt, Shared, WeakShared};
use tracing::debug;

use paceline_core::domain::errors::FetchError;
use paceline_core::domain::newtypes::BatchId;

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;
type WeakFetch<V> = WeakShared<BoxFuture<'static, Result<V, FetchError>>>;

/// One registered in-flight fetch.
///
/// The generation guards removal: a waiter that observed generation N only
/// removes the entry if it still holds generation N, so a retry registered
/// after a failure is never evicted by a stale waiter.
struct FlightEntry<V> {
    generation: u64,
    future: WeakFetch<V>,
}

/// Batch-scoped deduplicating fetch cache
///
/// `K` is any value-equality key ([`FetchKey`](paceline_core::domain::newtypes::FetchKey)
/// or a connector's own composite); `V` must be `Clone` so one fetched
/// value can be handed to every waiter.
///
/// Create one instance per batch and drop it when the batch ends; the
/// result cache lives exactly as long as the instance.
pub struct FetchCoalescer<K, V> {
    batch: BatchId,
    in_flight: Mutex<HashMap<K, FlightEntry<V>>>,
    results: Mutex<HashMap<K, V>>,
    next_generation: AtomicU64,
}

impl<K, V> Default for FetchCoalescer<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> FetchCoalescer<K, V>
where
    K: Eq + Hash + Clone + fmt::Debug,
    V: Clone,
{
    /// Creates a coalescer for one new batch.
    pub fn new() -> Self {
        Self {
            batch: BatchId::new(),
            in_flight: Mutex::new(HashMap::new()),
            results: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(0),
        }
    }

    /// The batch this coalescer is scoped to.
    pub fn batch(&self) -> BatchId {
        self.batch
    }

    /// Fetches the value for `key`, deduplicating concurrent callers.
    ///
    /// - Cached result: returned immediately, `compute` not invoked.
    /// - Fetch already in flight: attach to it and await its outcome.
    /// - Otherwise: run `compute`, sharing its outcome with every caller
    ///   that arrives before it settles.
    ///
    /// `compute` runs at most once per key per batch. On settlement the
    /// in-flight registration is dropped and a successful value is written
    /// to the result cache, atomically from the point of view of other
    /// callers. Failures propagate to every attached waiter but are not
    /// cached.
    pub async fn get<F, Fut>(&self, key: K, compute: F) -> Result<V, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        if let Some(value) = self.results.lock().unwrap().get(&key) {
            debug!(batch = %self.batch, key = ?key, "Coalescer cache hit");
            return Ok(value.clone());
        }

        let (generation, shared, joined) = {
            let mut in_flight = self.in_flight.lock().unwrap();

            // An entry whose weak handle no longer upgrades is a leftover
            // from a fetch whose waiters all detached; replace it.
            let live = in_flight
                .get(&key)
                .and_then(|entry| Some((entry.generation, entry.future.upgrade()?)));

            match live {
                Some((generation, shared)) => (generation, shared, true),
                None => {
                    let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                    let shared: SharedFetch<V> = compute().boxed().shared();
                    let weak = shared
                        .downgrade()
                        .expect("freshly created shared future cannot be settled");
                    in_flight.insert(
                        key.clone(),
                        FlightEntry {
                            generation,
                            future: weak,
                        },
                    );
                    (generation, shared, false)
                }
            }
        };

        debug!(batch = %self.batch, key = ?key, joined, "Awaiting coalesced fetch");
        let outcome = shared.await;

        // First waiter to observe settlement does the bookkeeping: cache
        // the success, then drop the in-flight registration. Both steps
        // happen under the in-flight lock so no concurrent caller can slip
        // between them and recompute.
        {
            let mut in_flight = self.in_flight.lock().unwrap();
            let current = in_flight
                .get(&key)
                .is_some_and(|entry| entry.generation == generation);
            if current {
                if let Ok(value) = &outcome {
                    self.results
                        .lock()
                        .unwrap()
                        .entry(key.clone())
                        .or_insert_with(|| value.clone());
                }
                in_flight.remove(&key);
            }
        }

        outcome
    }

    /// True if a live fetch is currently registered for `key`.
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|entry| entry.future.upgrade().is_some())
    }

    /// Number of values in the batch result cache.
    pub fn cached_len(&self) -> usize {
        self.results.lock().unwrap().len()
    }
}

impl<K, V> fmt::Debug for FetchCoalescer<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoalescer")
            .field("batch", &self.batch)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
