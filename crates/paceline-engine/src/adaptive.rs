//! Header-driven adaptive rate control
//!
//! [`AdaptiveLimiter`] wraps a [`TokenBucketLimiter`] and retunes its refill
//! rate from the quota headers providers attach to every response. The goal
//! is a control loop that converges on the provider's observed sustainable
//! rate: throttle down proportionally when the remaining quota runs low,
//! recover gradually toward the configured baseline once it replenishes,
//! and never oscillate on noisy header sequences.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use paceline_core::config::{LimiterConfig, QuotaHeaderNames};
//! use paceline_engine::adaptive::AdaptiveLimiter;
//!
//! # async fn example(response: reqwest::Response) {
//! let limiter = AdaptiveLimiter::new(&LimiterConfig::default(), QuotaHeaderNames::github());
//! limiter.acquire().await;
//! // ... issue the request ...
//! limiter.observe_headers(response.headers());
//! # }
//! ```

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use reqwest::header::HeaderMap;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use paceline_core::config::{LimiterConfig, QuotaHeaderNames, ResetFormat};
use paceline_core::domain::budget::RateBudget;

use crate::bucket::TokenBucketLimiter;

/// Fraction of the gap to baseline recovered per retune when the quota
/// is healthy again. Half-steps converge quickly without overshooting.
const RECOVERY_STEP: f64 = 0.5;

/// Mutable control-loop state, protected by a Mutex.
#[derive(Debug)]
struct ControlState {
    /// Most recent quota snapshot; replaced wholesale per observation
    budget: Option<RateBudget>,
    /// When the refill rate was last changed (cooldown anchor)
    last_retune: Option<Instant>,
}

/// Adaptive rate limiter for one `(host, api-class)` budget
///
/// Thread-safe and designed to be shared via `Arc` by every caller that
/// talks to the same quota pool - the registry hands out exactly one
/// instance per key.
#[derive(Debug)]
pub struct AdaptiveLimiter {
    bucket: TokenBucketLimiter,
    headers: QuotaHeaderNames,
    baseline_rate: f64,
    floor_rate: f64,
    low_water: f64,
    high_water: f64,
    cooldown: Duration,
    state: Mutex<ControlState>,
}

impl AdaptiveLimiter {
    /// Creates a limiter from the connector's configuration and quota
    /// header mapping.
    pub fn new(config: &LimiterConfig, headers: QuotaHeaderNames) -> Self {
        Self {
            bucket: TokenBucketLimiter::new(config.capacity, config.refill_rate_per_sec),
            headers,
            baseline_rate: config.refill_rate_per_sec,
            floor_rate: config.floor_rate_per_sec,
            low_water: config.low_water,
            high_water: config.high_water,
            cooldown: config.adjust_cooldown,
            state: Mutex::new(ControlState {
                budget: None,
                last_retune: None,
            }),
        }
    }

    /// Acquires one admission token, suspending until available.
    pub async fn acquire(&self) {
        self.bucket.acquire(1.0).await;
    }

    /// Attempts to acquire one admission token without suspending.
    pub fn try_acquire(&self) -> bool {
        self.bucket.try_consume(1.0)
    }

    // ========================================================================
    // Header observation
    // ========================================================================

    /// Feeds one response's headers into the control loop.
    ///
    /// Derives a [`RateBudget`] via the connector's header-name mapping and
    /// retunes the refill rate. Missing or malformed values mean *no
    /// adjustment this cycle*: the prior budget and rate are kept (fail
    /// open), since a transient header glitch is not evidence the quota
    /// changed.
    pub fn observe_headers(&self, headers: &HeaderMap) {
        let Some(budget) = self.extract_budget(headers) else {
            debug!("Quota headers absent or malformed, keeping current rate");
            return;
        };

        self.retune(budget);
    }

    /// Parses the three mapped headers into a budget snapshot.
    fn extract_budget(&self, headers: &HeaderMap) -> Option<RateBudget> {
        let remaining = header_u64(headers, &self.headers.remaining)?;
        let limit = header_u64(headers, &self.headers.limit)?;
        let reset_raw = header_u64(headers, &self.headers.reset)?;

        let reset_at = match self.headers.reset_format {
            ResetFormat::EpochSeconds => parse_epoch_seconds(reset_raw)?,
            ResetFormat::RelativeSeconds => {
                Utc::now() + chrono::Duration::seconds(i64::try_from(reset_raw).ok()?)
            }
        };

        Some(RateBudget::new(limit, remaining, reset_at))
    }

    // ========================================================================
    // Control loop
    // ========================================================================

    /// Applies one observation to the refill rate.
    ///
    /// The stored budget is always replaced; the rate change itself is
    /// gated by the cooldown so bursts of headers cannot thrash it.
    fn retune(&self, budget: RateBudget) {
        let mut state = self.state.lock().unwrap();
        let ratio = budget.remaining_fraction();
        state.budget = Some(budget);

        let within_cooldown = state
            .last_retune
            .is_some_and(|at| at.elapsed() < self.cooldown);
        if within_cooldown {
            debug!(ratio, "Retune skipped, within cooldown");
            return;
        }

        let current = self.bucket.refill_rate();
        let target = if ratio < self.low_water {
            // Quota running out: slow down in proportion to what is left,
            // hitting the floor as remaining approaches zero.
            (self.baseline_rate * ratio / self.low_water).max(self.floor_rate)
        } else if ratio >= self.high_water {
            // Quota healthy: step back toward the configured baseline,
            // never above it.
            (current + (self.baseline_rate - current) * RECOVERY_STEP).min(self.baseline_rate)
        } else {
            // Hysteresis band: hold the current rate.
            return;
        };

        if (target - current).abs() < 1e-9 {
            return;
        }

        info!(
            remaining = budget.remaining(),
            limit = budget.limit(),
            old_rate = current,
            new_rate = target,
            "Retuning refill rate from quota headers"
        );
        self.bucket.set_refill_rate(target);
        state.last_retune = Some(Instant::now());
    }

    /// Records an observed throttle response (HTTP 429 or equivalent).
    ///
    /// Halves the current refill rate immediately, bypassing the cooldown:
    /// an explicit throttle is a stronger signal than any header trend.
    /// The cooldown window restarts so header-driven retunes don't undo
    /// the cut right away.
    pub fn on_throttled(&self) {
        let mut state = self.state.lock().unwrap();
        let current = self.bucket.refill_rate();
        let target = (current * 0.5).max(self.floor_rate);

        warn!(
            old_rate = current,
            new_rate = target,
            "Throttle observed, halving refill rate"
        );
        self.bucket.set_refill_rate(target);
        state.last_retune = Some(Instant::now());
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// The current refill rate in tokens per second.
    pub fn current_rate(&self) -> f64 {
        self.bucket.refill_rate()
    }

    /// The configured baseline refill rate.
    pub fn baseline_rate(&self) -> f64 {
        self.baseline_rate
    }

    /// Tokens currently available in the underlying bucket.
    pub fn available_tokens(&self) -> f64 {
        self.bucket.available()
    }

    /// The most recently observed quota snapshot, if any.
    pub fn budget(&self) -> Option<RateBudget> {
        self.state.lock().unwrap().budget
    }
}

/// Reads a header by name and parses it as `u64`.
///
/// Returns `None` for absent headers, non-UTF-8 values, and anything that
/// doesn't parse as a non-negative integer (including negative values some
/// providers emit mid-reset).
fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Converts epoch seconds into a timestamp, rejecting out-of-range values.
fn parse_epoch_seconds(secs: u64) -> Option<DateTime<Utc>> {
    Utc.timestamp_opt(i64::try_from(secs).ok()?, 0).single()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderName, HeaderValue};

    use super::*;

    fn quota_headers(remaining: &str, limit: &str, reset: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("ratelimit-remaining"),
            HeaderValue::from_str(remaining).unwrap(),
        );
        headers.insert(
            HeaderName::from_static("ratelimit-limit"),
            HeaderValue::from_str(limit).unwrap(),
        );
        headers.insert(
            HeaderName::from_static("ratelimit-reset"),
            HeaderValue::from_str(reset).unwrap(),
        );
        headers
    }

    fn limiter_with_cooldown(cooldown: Duration) -> AdaptiveLimiter {
        let config = LimiterConfig {
            capacity: 100.0,
            refill_rate_per_sec: 10.0,
            floor_rate_per_sec: 0.5,
            low_water: 0.2,
            high_water: 0.8,
            adjust_cooldown: cooldown,
        };
        AdaptiveLimiter::new(&config, QuotaHeaderNames::ietf_draft())
    }

    #[test]
    fn test_low_quota_reduces_rate() {
        let limiter = limiter_with_cooldown(Duration::ZERO);

        limiter.observe_headers(&quota_headers("5", "100", "60"));

        let rate = limiter.current_rate();
        assert!(
            rate < limiter.baseline_rate(),
            "rate {rate} should drop below baseline"
        );
        assert!(rate >= 0.5, "rate {rate} must respect the floor");
    }

    #[test]
    fn test_healthy_quota_restores_rate_toward_baseline() {
        let limiter = limiter_with_cooldown(Duration::ZERO);

        limiter.observe_headers(&quota_headers("5", "100", "60"));
        let throttled = limiter.current_rate();

        // Repeated healthy observations converge back up, capped at baseline
        for _ in 0..20 {
            limiter.observe_headers(&quota_headers("95", "100", "60"));
        }

        let recovered = limiter.current_rate();
        assert!(recovered > throttled, "rate should recover from {throttled}");
        assert!(
            recovered <= limiter.baseline_rate() + 1e-9,
            "rate {recovered} must not exceed baseline"
        );
    }

    #[test]
    fn test_hysteresis_band_holds_rate() {
        let limiter = limiter_with_cooldown(Duration::ZERO);

        limiter.observe_headers(&quota_headers("5", "100", "60"));
        let throttled = limiter.current_rate();

        // Mid-band observation: neither recovery nor further throttling
        limiter.observe_headers(&quota_headers("50", "100", "60"));
        assert_eq!(limiter.current_rate(), throttled);
    }

    #[test]
    fn test_cooldown_suppresses_thrash() {
        let limiter = limiter_with_cooldown(Duration::from_secs(3600));

        limiter.observe_headers(&quota_headers("5", "100", "60"));
        let after_first = limiter.current_rate();

        // A noisy recovery signal inside the cooldown must not move the rate
        limiter.observe_headers(&quota_headers("95", "100", "60"));
        assert_eq!(limiter.current_rate(), after_first);

        // But the budget snapshot is still replaced
        assert_eq!(limiter.budget().unwrap().remaining(), 95);
    }

    #[test]
    fn test_malformed_headers_keep_prior_state() {
        let limiter = limiter_with_cooldown(Duration::ZERO);

        limiter.observe_headers(&quota_headers("5", "100", "60"));
        let rate = limiter.current_rate();
        let budget = limiter.budget();

        // Negative remaining fails the u64 parse: no adjustment this cycle
        limiter.observe_headers(&quota_headers("-3", "100", "60"));
        assert_eq!(limiter.current_rate(), rate);
        assert_eq!(limiter.budget(), budget);
    }

    #[test]
    fn test_missing_headers_keep_prior_state() {
        let limiter = limiter_with_cooldown(Duration::ZERO);
        let baseline = limiter.current_rate();

        limiter.observe_headers(&HeaderMap::new());

        assert_eq!(limiter.current_rate(), baseline);
        assert!(limiter.budget().is_none());
    }

    #[test]
    fn test_budget_replaced_wholesale() {
        let limiter = limiter_with_cooldown(Duration::ZERO);

        limiter.observe_headers(&quota_headers("90", "100", "60"));
        limiter.observe_headers(&quota_headers("40", "100", "120"));

        let budget = limiter.budget().unwrap();
        assert_eq!(budget.remaining(), 40);
        assert_eq!(budget.limit(), 100);
    }

    #[test]
    fn test_epoch_reset_headers() {
        let config = LimiterConfig::default();
        let limiter = AdaptiveLimiter::new(&config, QuotaHeaderNames::github());

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from_static("4999"),
        );
        headers.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from_static("5000"),
        );
        // 2026-01-01T00:00:00Z
        headers.insert(
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from_static("1767225600"),
        );

        limiter.observe_headers(&headers);

        let budget = limiter.budget().unwrap();
        assert_eq!(budget.remaining(), 4999);
        assert_eq!(budget.reset_at().timestamp(), 1_767_225_600);
    }

    #[test]
    fn test_on_throttled_halves_rate_and_respects_floor() {
        let limiter = limiter_with_cooldown(Duration::from_secs(3600));

        limiter.on_throttled();
        assert!((limiter.current_rate() - 5.0).abs() < 1e-9);

        // Repeated throttles converge on the floor, never below
        for _ in 0..10 {
            limiter.on_throttled();
        }
        assert!((limiter.current_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_acquire_delegates_to_bucket() {
        let limiter = limiter_with_cooldown(Duration::ZERO);
        limiter.acquire().await;
        assert!(limiter.available_tokens() < 100.0);
    }
}
