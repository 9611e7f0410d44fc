//! Cursor-driven pagination
//!
//! [`CursorPaginator`] walks an unbounded paginated collection one page at
//! a time. The caller supplies a [`PageSource`] that builds the request,
//! performs the HTTP call, and parses items plus the next continuation
//! token out of the response; the paginator owns admission (concurrency
//! gate, then rate limiter), retry, header-driven retuning, and cursor
//! bookkeeping.
//!
//! The produced sequence is lazy and single-pass: no page is fetched ahead
//! of consumption, and re-iterating requires a new paginator. Page size is
//! whatever the `PageSource` bakes into its requests.
//!
//! ## Usage
//!
//! ```rust,no_run
//! # use std::sync::Arc;
//! # use paceline_core::domain::errors::FetchError;
//! # use paceline_core::domain::newtypes::Cursor;
//! # use paceline_engine::paginate::{CursorPaginator, FetchedPage, PageSource};
//! struct RepoPages { /* http client, url, page size ... */ }
//!
//! #[async_trait::async_trait]
//! impl PageSource for RepoPages {
//!     type Item = serde_json::Value;
//!
//!     async fn fetch_page(
//!         &self,
//!         cursor: Option<&Cursor>,
//!     ) -> Result<FetchedPage<Self::Item>, FetchError> {
//!         // build request (with cursor), send it, parse items + next cursor
//!         # unimplemented!()
//!     }
//! }
//!
//! # async fn example(mut paginator: CursorPaginator<RepoPages>) {
//! while let Some(page) = paginator.next_page().await {
//!     match page {
//!         Ok(items) => println!("got {} items", items.len()),
//!         Err(failure) => eprintln!("giving up on this resource: {failure}"),
//!     }
//! }
//! # }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::Stream;
use reqwest::header::HeaderMap;
use tracing::debug;

use paceline_core::domain::errors::{FetchError, FetchFailure};
use paceline_core::domain::newtypes::Cursor;

use crate::adaptive::AdaptiveLimiter;
use crate::gate::ConcurrencyGate;
use crate::retry::RetryPolicy;

// ============================================================================
// FetchedPage and PageSource
// ============================================================================

/// One page of results as parsed by a connector
#[derive(Debug)]
pub struct FetchedPage<T> {
    /// Items on this page
    pub items: Vec<T>,
    /// Continuation token for the next page; `None` means this was the
    /// terminal page
    pub next_cursor: Option<Cursor>,
    /// Response headers, handed to the adaptive limiter for quota retuning
    pub headers: HeaderMap,
}

impl<T> FetchedPage<T> {
    /// Creates a page without headers (nothing to retune from).
    pub fn new(items: Vec<T>, next_cursor: Option<Cursor>) -> Self {
        Self {
            items,
            next_cursor,
            headers: HeaderMap::new(),
        }
    }

    /// Attaches the response headers so quota information reaches the
    /// limiter.
    #[must_use]
    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }
}

/// Port implemented by connectors: fetch one page of a named collection
///
/// Implementations own request construction (including how the cursor is
/// encoded - body token, `Link` header, `skipToken` parameter), the HTTP
/// call itself, and response parsing. They should construct
/// [`FetchError`]s via [`FetchError::from_status`] or directly for
/// throttle responses carrying reset hints.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Item type produced by this source
    type Item: Send;

    /// Fetches the page identified by `cursor` (`None` for the first page).
    async fn fetch_page(
        &self,
        cursor: Option<&Cursor>,
    ) -> Result<FetchedPage<Self::Item>, FetchError>;
}

// ============================================================================
// CursorPaginator
// ============================================================================

/// Drives successive page fetches for one resource
///
/// Single-pass and lazy; see the module docs for the full contract.
pub struct CursorPaginator<S: PageSource> {
    source: Arc<S>,
    resource: String,
    gate: Arc<ConcurrencyGate>,
    limiter: Arc<AdaptiveLimiter>,
    retry: RetryPolicy,
    cursor: Option<Cursor>,
    done: bool,
    pages_yielded: u32,
}

impl<S: PageSource> CursorPaginator<S> {
    /// Creates a paginator over `source`.
    ///
    /// # Arguments
    /// * `resource` - Name used in logs and surfaced failures
    /// * `source` - The connector's page fetcher
    /// * `gate` - Concurrency gate shared with other fetches to this host
    /// * `limiter` - Adaptive limiter for this host/api-class
    /// * `retry` - Retry policy applied around every page fetch
    pub fn new(
        resource: impl Into<String>,
        source: Arc<S>,
        gate: Arc<ConcurrencyGate>,
        limiter: Arc<AdaptiveLimiter>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            source,
            resource: resource.into(),
            gate,
            limiter,
            retry,
            cursor: None,
            done: false,
            pages_yielded: 0,
        }
    }

    /// Fetches and yields the next page of items.
    ///
    /// Returns `None` once the sequence is exhausted (terminal page
    /// reached, empty page observed, or ignorable failure). A returned
    /// `Err` is terminal: the failure is yielded once and the paginator is
    /// done. Dropping the returned future mid-flight abandons the fetch
    /// and releases the concurrency slot.
    pub async fn next_page(&mut self) -> Option<Result<Vec<S::Item>, FetchFailure>> {
        if self.done {
            return None;
        }

        let source = Arc::clone(&self.source);
        let gate = Arc::clone(&self.gate);
        let limiter = Arc::clone(&self.limiter);
        let cursor = self.cursor.clone();

        let op = move || {
            let source = Arc::clone(&source);
            let gate = Arc::clone(&gate);
            let limiter = Arc::clone(&limiter);
            let cursor = cursor.clone();

            async move {
                // Admission order: concurrency slot first, then rate
                // tokens. The slot is held across the fetch and returned
                // by RAII on every exit path.
                let admitted = gate
                    .with_slot(async {
                        limiter.acquire().await;
                        let result = source.fetch_page(cursor.as_ref()).await;

                        match &result {
                            Ok(page) => limiter.observe_headers(&page.headers),
                            Err(FetchError::Throttled { .. }) => limiter.on_throttled(),
                            Err(_) => {}
                        }

                        result
                    })
                    .await;

                match admitted {
                    Ok(result) => result,
                    Err(_) => Err(FetchError::Network("concurrency gate closed".to_string())),
                }
            }
        };

        let outcome = self.retry.execute(&self.resource, op).await;

        match outcome {
            Ok(Some(page)) => {
                if page.items.is_empty() {
                    // Some providers return an empty page with a stale
                    // cursor attached; following it would loop forever.
                    debug!(
                        resource = %self.resource,
                        pages = self.pages_yielded,
                        "Empty page, terminating pagination"
                    );
                    self.done = true;
                    return None;
                }

                self.pages_yielded += 1;
                match page.next_cursor {
                    Some(next) => self.cursor = Some(next),
                    None => {
                        debug!(
                            resource = %self.resource,
                            pages = self.pages_yielded,
                            "Terminal page reached"
                        );
                        self.done = true;
                    }
                }

                Some(Ok(page.items))
            }
            Ok(None) => {
                // The failure matched the caller's ignore list: the rest
                // of the sequence is treated as empty.
                self.done = true;
                None
            }
            Err(failure) => {
                self.done = true;
                Some(Err(failure))
            }
        }
    }

    /// Adapts this paginator into a lazy [`Stream`] of pages.
    ///
    /// The stream inherits the single-pass contract; pages are fetched
    /// only as the stream is polled.
    pub fn into_stream(self) -> impl Stream<Item = Result<Vec<S::Item>, FetchFailure>> {
        futures_util::stream::unfold(self, |mut paginator| async move {
            paginator
                .next_page()
                .await
                .map(|page| (page, paginator))
        })
    }

    /// Pages yielded so far.
    pub fn pages_yielded(&self) -> u32 {
        self.pages_yielded
    }

    /// True once the sequence is exhausted.
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// The resource name this paginator reports under.
    pub fn resource(&self) -> &str {
        &self.resource
    }
}

// ============================================================================
// Tests
// ============================================================================
