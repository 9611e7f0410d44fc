//! Continuous-refill token bucket
//!
//! [`TokenBucketLimiter`] is the local admission-control primitive under
//! every adaptive limiter. Tokens refill lazily from elapsed wall-clock
//! time at acquisition - there is no background timer task.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use paceline_engine::bucket::TokenBucketLimiter;
//!
//! # async fn example() {
//! let bucket = TokenBucketLimiter::new(10.0, 2.0);
//! bucket.acquire(1.0).await;
//! // ... issue the request ...
//! # }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;
use tracing::debug;

/// Floor on a single suspension so near-zero deficits don't busy-spin
const MIN_WAIT: Duration = Duration::from_millis(10);

/// Poll interval used while the refill rate is zero; a concurrent retune
/// can raise the rate again, so waiters must wake up periodically
const STALLED_POLL: Duration = Duration::from_millis(100);

/// Mutable bucket state, protected by a Mutex.
#[derive(Debug)]
struct BucketInner {
    /// Current number of available tokens (fractional for smooth refill)
    tokens: f64,
    /// Tokens added per second; retuned at runtime by the adaptive limiter
    refill_rate: f64,
    /// Timestamp of the last refill calculation
    last_refill: Instant,
}

/// Token bucket rate limiter
///
/// Implements the classic algorithm: tokens are consumed on each request
/// and replenished at a constant rate, computed lazily from elapsed time.
/// When no tokens are available, [`acquire`](TokenBucketLimiter::acquire)
/// suspends the caller for the projected deficit and retries.
///
/// All state mutation happens under a single internal `Mutex`, so the
/// bucket is safe to share behind an `Arc` across concurrent tasks. The
/// invariant `0 <= tokens <= capacity` holds at every observable point.
#[derive(Debug)]
pub struct TokenBucketLimiter {
    /// Maximum number of tokens the bucket can hold
    capacity: f64,
    /// Mutable inner state (token count, rate, last refill time)
    inner: Mutex<BucketInner>,
}

impl TokenBucketLimiter {
    /// Creates a new bucket, starting full.
    ///
    /// # Arguments
    /// * `capacity` - Maximum number of tokens (burst size)
    /// * `refill_rate_per_sec` - Tokens added per second
    pub fn new(capacity: f64, refill_rate_per_sec: f64) -> Self {
        Self {
            capacity,
            inner: Mutex::new(BucketInner {
                tokens: capacity,
                refill_rate: refill_rate_per_sec.max(0.0),
                last_refill: Instant::now(),
            }),
        }
    }

    /// Refills the bucket from elapsed time since the last refill.
    ///
    /// Called under the lock before every read or deduction. Caps at
    /// capacity.
    fn refill(capacity: f64, inner: &mut BucketInner) {
        let now = Instant::now();
        let elapsed = now.duration_since(inner.last_refill).as_secs_f64();

        if elapsed > 0.0 {
            inner.tokens = (inner.tokens + elapsed * inner.refill_rate).min(capacity);
            inner.last_refill = now;
        }
    }

    /// Attempts to deduct `n` tokens without suspending.
    ///
    /// Returns `true` if the tokens were available and deducted, `false`
    /// otherwise (bucket state untouched beyond the refill).
    pub fn try_consume(&self, n: f64) -> bool {
        let n = self.clamp_request(n);
        let mut inner = self.inner.lock().unwrap();
        Self::refill(self.capacity, &mut inner);

        if inner.tokens >= n {
            inner.tokens -= n;
            true
        } else {
            false
        }
    }

    /// Deducts `n` tokens, suspending until they are available.
    ///
    /// Loops: refill, deduct if possible, otherwise sleep for the projected
    /// time to cover the deficit and retry. The retry matters because the
    /// refill rate can be retuned while we sleep. Suspension ordering among
    /// concurrent waiters is whatever the runtime's timer wakeups provide;
    /// no fairness guarantee beyond that.
    pub async fn acquire(&self, n: f64) {
        let n = self.clamp_request(n);

        loop {
            let wait = {
                let mut inner = self.inner.lock().unwrap();
                Self::refill(self.capacity, &mut inner);

                if inner.tokens >= n {
                    inner.tokens -= n;
                    return;
                }

                let deficit = n - inner.tokens;
                if inner.refill_rate > 0.0 {
                    Duration::from_secs_f64(deficit / inner.refill_rate).max(MIN_WAIT)
                } else {
                    STALLED_POLL
                }
            };

            debug!(wait_ms = wait.as_millis() as u64, "Bucket empty, waiting for refill");
            tokio::time::sleep(wait).await;
        }
    }

    /// Replaces the refill rate.
    ///
    /// Accrual under the old rate is credited first so a retune never
    /// retroactively rewrites history. Negative rates are clamped to zero.
    pub fn set_refill_rate(&self, rate: f64) {
        let mut inner = self.inner.lock().unwrap();
        Self::refill(self.capacity, &mut inner);
        inner.refill_rate = rate.max(0.0);
    }

    /// The current refill rate in tokens per second.
    pub fn refill_rate(&self) -> f64 {
        self.inner.lock().unwrap().refill_rate
    }

    /// The current number of available tokens (after refill).
    pub fn available(&self) -> f64 {
        let mut inner = self.inner.lock().unwrap();
        Self::refill(self.capacity, &mut inner);
        inner.tokens
    }

    /// The configured capacity.
    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    /// Requests larger than the capacity could never be satisfied and
    /// would suspend forever; clamp them and log.
    fn clamp_request(&self, n: f64) -> f64 {
        if n > self.capacity {
            debug!(
                requested = n,
                capacity = self.capacity,
                "Token request exceeds bucket capacity, clamping"
            );
            self.capacity
        } else {
            n.max(0.0)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
