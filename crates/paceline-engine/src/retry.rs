//! Failure classification and retry driving
//!
//! [`RetryPolicy`] wraps one fetch operation and resolves every transient
//! failure internally, so callers only ever see a success, an empty result
//! (for statuses they declared ignorable), or a terminal
//! [`FetchFailure`] carrying the classification and attempt count.
//!
//! Two separate budgets are tracked:
//! - **fast retries** for server/network failures, with exponential backoff
//! - **quota waits** for throttle responses that carry an explicit reset
//!   hint - the provider pacing us is not the operation failing, so these
//!   don't consume the fast budget
//!
//! A throttle response *without* any reset hint degrades to the fast-retry
//! path, since blind waiting needs a bound.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use tracing::{debug, info, warn};

use paceline_core::config::{IgnorePolicy, RetryConfig};
use paceline_core::domain::errors::{ErrorClass, FetchError, FetchFailure};

/// Fallback wait when a throttle response has no usable reset hint left
/// after degradation, and cap on provider-supplied reset waits. An hour is
/// far beyond any sane quota window; longer hints are treated as clock
/// skew.
const MAX_RESET_WAIT: Duration = Duration::from_secs(3600);

/// Retry driver for one connector's fetches
///
/// Cheap to clone; each [`execute`](RetryPolicy::execute) call tracks its
/// own attempt counters.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    ignore: IgnorePolicy,
}

impl RetryPolicy {
    /// Creates a policy from retry settings and the caller's ignore list.
    pub fn new(config: RetryConfig, ignore: IgnorePolicy) -> Self {
        Self { config, ignore }
    }

    /// Runs `op` until it succeeds, is ignored, or exhausts its budgets.
    ///
    /// Returns `Ok(Some(value))` on success, `Ok(None)` when the final
    /// error matched the ignore list (callers treat this as an empty
    /// result), and `Err(FetchFailure)` for fatal or exhausted failures.
    ///
    /// # Arguments
    /// * `operation` - Name used in logs and in the surfaced failure
    /// * `op` - Re-invocable fetch attempt
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        mut op: F,
    ) -> Result<Option<T>, FetchFailure>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, FetchError>>,
    {
        let mut attempts: u32 = 0;
        let mut transient_failures: u32 = 0;
        let mut quota_waits: u32 = 0;

        loop {
            attempts += 1;

            let err = match op().await {
                Ok(value) => {
                    if attempts > 1 {
                        info!(operation, attempts, "Operation succeeded after retry");
                    }
                    return Ok(Some(value));
                }
                Err(err) => err,
            };

            let class = err.class(&self.ignore);
            match class {
                ErrorClass::Ignorable => {
                    warn!(operation, error = %err, "Ignoring failure per caller policy");
                    return Ok(None);
                }

                ErrorClass::Client => {
                    return Err(FetchFailure {
                        operation: operation.to_string(),
                        class,
                        attempts,
                        source: err,
                    });
                }

                ErrorClass::Throttled => {
                    match reset_hint(&err) {
                        Some(wait) => {
                            quota_waits += 1;
                            if quota_waits > self.config.max_quota_waits {
                                warn!(operation, quota_waits, "Quota wait budget exhausted");
                                return Err(FetchFailure {
                                    operation: operation.to_string(),
                                    class,
                                    attempts,
                                    source: err,
                                });
                            }

                            let wait = self.jittered(wait.min(MAX_RESET_WAIT));
                            info!(
                                operation,
                                wait_ms = wait.as_millis() as u64,
                                quota_waits,
                                "Throttled, sleeping until provider reset"
                            );
                            tokio::time::sleep(wait).await;
                        }
                        None => {
                            // No reset hint: bounded backoff like any other
                            // transient failure.
                            transient_failures += 1;
                            if transient_failures >= self.config.max_attempts {
                                return Err(FetchFailure {
                                    operation: operation.to_string(),
                                    class,
                                    attempts,
                                    source: err,
                                });
                            }
                            self.backoff_sleep(operation, transient_failures).await;
                        }
                    }
                }

                ErrorClass::Server | ErrorClass::Network => {
                    transient_failures += 1;
                    if transient_failures >= self.config.max_attempts {
                        warn!(operation, attempts, error = %err, "Retry budget exhausted");
                        return Err(FetchFailure {
                            operation: operation.to_string(),
                            class,
                            attempts,
                            source: err,
                        });
                    }

                    debug!(operation, attempt = attempts, error = %err, "Transient failure, backing off");
                    self.backoff_sleep(operation, transient_failures).await;
                }
            }
        }
    }

    /// Sleeps the exponential backoff for the given failure ordinal.
    async fn backoff_sleep(&self, operation: &str, failure_count: u32) {
        let exp = failure_count.saturating_sub(1).min(16);
        let base = self
            .config
            .base_backoff
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.config.max_backoff);
        let wait = self.jittered(base);

        debug!(
            operation,
            wait_ms = wait.as_millis() as u64,
            "Backoff sleep"
        );
        tokio::time::sleep(wait).await;
    }

    /// Adds the configured jitter fraction on top of a wait.
    fn jittered(&self, wait: Duration) -> Duration {
        if self.config.jitter <= 0.0 {
            return wait;
        }
        let factor = 1.0 + rand::thread_rng().gen_range(0.0..self.config.jitter);
        wait.mul_f64(factor)
    }
}

/// Extracts the wait implied by a throttle error's reset hints, if any.
///
/// An absolute reset timestamp wins over a relative `Retry-After`; a reset
/// already in the past means "retry now".
fn reset_hint(err: &FetchError) -> Option<Duration> {
    let FetchError::Throttled {
        retry_after,
        reset_at,
    } = err
    else {
        return None;
    };

    if let Some(reset_at) = reset_at {
        let wait = (*reset_at - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        return Some(wait);
    }

    *retry_after
}

/// Parses a `Retry-After` header value into a Duration.
///
/// The header can be either an integer number of seconds (e.g. `"30"`) or
/// an HTTP-date, parsed as seconds from now. Falls back to `default` if
/// parsing fails or the date is unreasonably far out.
pub fn parse_retry_after(value: &str, default: Duration) -> Duration {
    if let Ok(seconds) = value.trim().parse::<u64>() {
        return Duration::from_secs(seconds);
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value.trim()) {
        let now = Utc::now();
        let target = date.with_timezone(&Utc);
        if target > now {
            let diff = target - now;
            if let Some(secs) = diff
                .num_seconds()
                .try_into()
                .ok()
                .filter(|&s: &u64| s <= MAX_RESET_WAIT.as_secs())
            {
                return Duration::from_secs(secs);
            }
        }
    }

    warn!(value, "Could not parse Retry-After header, using default");
    default
}

// ============================================================================
// Tests
// ============================================================================
