//! Engine configuration
//!
//! Typed configuration structs supplied programmatically by connector code.
//! There is no file loading or CLI parsing here - connectors own their
//! configuration surface and pass the relevant values in. All structs
//! derive serde so callers can embed them in their own config formats.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainError;

// ---------------------------------------------------------------------------
// LimiterConfig
// ---------------------------------------------------------------------------

/// Token bucket and adaptive-control settings for one `(host, api-class)`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    /// Maximum number of tokens the bucket can hold (burst size)
    pub capacity: f64,
    /// Baseline refill rate in tokens per second
    pub refill_rate_per_sec: f64,
    /// Lower bound the adaptive controller will never throttle below
    pub floor_rate_per_sec: f64,
    /// Remaining-quota fraction below which the refill rate is reduced
    pub low_water: f64,
    /// Remaining-quota fraction above which the refill rate recovers
    pub high_water: f64,
    /// Minimum interval between adaptive rate adjustments
    pub adjust_cooldown: Duration,
}

impl Default for LimiterConfig {
    /// Conservative defaults suitable for a typical per-host REST quota.
    ///
    /// A burst of 60 with 5 req/sec sustained stays comfortably inside the
    /// common "few thousand requests per hour" quotas; the adaptive
    /// controller takes over once real headers are observed.
    fn default() -> Self {
        Self {
            capacity: 60.0,
            refill_rate_per_sec: 5.0,
            floor_rate_per_sec: 0.1,
            low_water: 0.2,
            high_water: 0.8,
            adjust_cooldown: Duration::from_secs(10),
        }
    }
}

impl LimiterConfig {
    /// Validate invariants between the configured values
    ///
    /// # Errors
    /// Returns `DomainError::InvalidConfig` describing the first violation
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.capacity <= 0.0 {
            return Err(DomainError::InvalidConfig(
                "capacity must be positive".to_string(),
            ));
        }
        if self.refill_rate_per_sec <= 0.0 {
            return Err(DomainError::InvalidConfig(
                "refill_rate_per_sec must be positive".to_string(),
            ));
        }
        if self.floor_rate_per_sec <= 0.0 || self.floor_rate_per_sec > self.refill_rate_per_sec {
            return Err(DomainError::InvalidConfig(
                "floor_rate_per_sec must be positive and no greater than the baseline rate"
                    .to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.low_water)
            || !(0.0..=1.0).contains(&self.high_water)
            || self.low_water >= self.high_water
        {
            return Err(DomainError::InvalidConfig(
                "water marks must satisfy 0 <= low_water < high_water <= 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// RetryConfig
// ---------------------------------------------------------------------------

/// Retry and backoff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum attempts for transient (server/network) failures
    pub max_attempts: u32,
    /// First backoff interval; doubles on each subsequent transient failure
    pub base_backoff: Duration,
    /// Upper bound on a single backoff interval
    pub max_backoff: Duration,
    /// Maximum quota-reset waits per operation. These are budgeted
    /// separately from `max_attempts`: a provider that tells us exactly
    /// when its window resets is not "failing", just pacing us.
    pub max_quota_waits: u32,
    /// Jitter fraction in `[0, 1]` added on top of each computed wait
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            max_quota_waits: 3,
            jitter: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Quota header mapping
// ---------------------------------------------------------------------------

/// How a provider encodes its quota-reset header value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetFormat {
    /// Absolute Unix timestamp in seconds (GitHub style)
    EpochSeconds,
    /// Seconds from now (IETF RateLimit draft style)
    RelativeSeconds,
}

/// Per-connector mapping of quota header names
///
/// Providers disagree on header spelling (`X-RateLimit-Remaining` vs
/// `RateLimit-Remaining` vs `ratelimit-remaining`); each connector resolves
/// the mapping once here instead of branching on literals at call sites.
/// Lookups are case-insensitive, as HTTP header names are.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuotaHeaderNames {
    /// Header carrying the remaining-quota count
    pub remaining: String,
    /// Header carrying the total window limit
    pub limit: String,
    /// Header carrying the window reset time
    pub reset: String,
    /// How the reset header value is encoded
    pub reset_format: ResetFormat,
}

impl QuotaHeaderNames {
    /// Custom mapping for providers not covered by a preset
    pub fn new(
        remaining: impl Into<String>,
        limit: impl Into<String>,
        reset: impl Into<String>,
        reset_format: ResetFormat,
    ) -> Self {
        Self {
            remaining: remaining.into(),
            limit: limit.into(),
            reset: reset.into(),
            reset_format,
        }
    }

    /// `X-RateLimit-*` headers with an epoch-seconds reset (GitHub, Harbor)
    #[must_use]
    pub fn github() -> Self {
        Self::new(
            "x-ratelimit-remaining",
            "x-ratelimit-limit",
            "x-ratelimit-reset",
            ResetFormat::EpochSeconds,
        )
    }

    /// `RateLimit-*` headers with an epoch-seconds reset (GitLab)
    #[must_use]
    pub fn gitlab() -> Self {
        Self::new(
            "ratelimit-remaining",
            "ratelimit-limit",
            "ratelimit-reset",
            ResetFormat::EpochSeconds,
        )
    }

    /// `RateLimit-*` headers with a relative-seconds reset, per the IETF
    /// RateLimit header fields draft
    #[must_use]
    pub fn ietf_draft() -> Self {
        Self::new(
            "ratelimit-remaining",
            "ratelimit-limit",
            "ratelimit-reset",
            ResetFormat::RelativeSeconds,
        )
    }
}

// ---------------------------------------------------------------------------
// IgnorePolicy
// ---------------------------------------------------------------------------

/// Caller-declared HTTP statuses to treat as an empty result
///
/// Typical use: a connector enumerating repositories declares 403/404
/// ignorable so one revoked or deleted repository doesn't abort a whole
/// synchronization pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IgnorePolicy {
    statuses: BTreeSet<u16>,
}

impl IgnorePolicy {
    /// Ignore nothing (every error keeps its structural class)
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Ignore the given statuses
    #[must_use]
    pub fn of(statuses: impl IntoIterator<Item = u16>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    /// True if `status` is in the ignore list
    #[must_use]
    pub fn is_ignored(&self, status: u16) -> bool {
        self.statuses.contains(&status)
    }
}

// ---------------------------------------------------------------------------
// FetchConfig
// ---------------------------------------------------------------------------

/// Everything a connector passes when creating a fetch context
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Token bucket / adaptive control settings
    pub limiter: LimiterConfig,
    /// Retry and backoff settings
    pub retry: RetryConfig,
    /// Quota header mapping for this provider
    pub headers: QuotaHeaderNames,
    /// Statuses to treat as empty results instead of errors
    pub ignore: IgnorePolicy,
    /// Maximum simultaneously in-flight requests for this host/api-class
    pub max_concurrent: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            limiter: LimiterConfig::default(),
            retry: RetryConfig::default(),
            headers: QuotaHeaderNames::ietf_draft(),
            ignore: IgnorePolicy::none(),
            max_concurrent: 4,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limiter_defaults_valid() {
        LimiterConfig::default().validate().unwrap();
    }

    #[test]
    fn test_limiter_rejects_zero_capacity() {
        let config = LimiterConfig {
            capacity: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limiter_rejects_floor_above_baseline() {
        let config = LimiterConfig {
            refill_rate_per_sec: 1.0,
            floor_rate_per_sec: 2.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_limiter_rejects_inverted_water_marks() {
        let config = LimiterConfig {
            low_water: 0.9,
            high_water: 0.5,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_retry_defaults() {
        let config = RetryConfig::default();
        assert_eq!(config.max_attempts, 4);
        assert!(config.jitter <= 1.0);
    }

    #[test]
    fn test_header_presets() {
        let github = QuotaHeaderNames::github();
        assert_eq!(github.remaining, "x-ratelimit-remaining");
        assert_eq!(github.reset_format, ResetFormat::EpochSeconds);

        let ietf = QuotaHeaderNames::ietf_draft();
        assert_eq!(ietf.remaining, "ratelimit-remaining");
        assert_eq!(ietf.reset_format, ResetFormat::RelativeSeconds);
    }

    #[test]
    fn test_ignore_policy() {
        let policy = IgnorePolicy::of([403, 404]);
        assert!(policy.is_ignored(404));
        assert!(!policy.is_ignored(500));
        assert!(!IgnorePolicy::none().is_ignored(404));
    }

    #[test]
    fn test_fetch_config_serde_roundtrip() {
        let config = FetchConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: FetchConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_concurrent, config.max_concurrent);
        assert_eq!(parsed.headers.remaining, config.headers.remaining);
    }
}
