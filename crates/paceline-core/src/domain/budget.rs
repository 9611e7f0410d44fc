//! Quota window accounting
//!
//! [`RateBudget`] is the pure value type tracking what a provider last told
//! us about its quota window. It is created from response headers by the
//! engine and replaced wholesale whenever a fresher header set arrives -
//! never merged field-by-field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Snapshot of a provider quota window
///
/// Invariant: `remaining <= limit` (enforced by clamping at construction).
/// `reset_at` is the provider-reported instant at which `remaining` returns
/// to `limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateBudget {
    limit: u64,
    remaining: u64,
    reset_at: DateTime<Utc>,
}

impl RateBudget {
    /// Create a new budget snapshot
    ///
    /// `remaining` is clamped into `[0, limit]` so malformed provider
    /// values can never produce an inconsistent budget.
    #[must_use]
    pub fn new(limit: u64, remaining: u64, reset_at: DateTime<Utc>) -> Self {
        Self {
            limit,
            remaining: remaining.min(limit),
            reset_at,
        }
    }

    /// Total requests allowed in the window
    #[must_use]
    pub fn limit(&self) -> u64 {
        self.limit
    }

    /// Requests still available in the window
    #[must_use]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// When the window resets
    #[must_use]
    pub fn reset_at(&self) -> DateTime<Utc> {
        self.reset_at
    }

    /// Fraction of the quota still available, in `[0.0, 1.0]`
    ///
    /// A zero `limit` reports `0.0` - an empty window has nothing left.
    #[must_use]
    pub fn remaining_fraction(&self) -> f64 {
        if self.limit == 0 {
            return 0.0;
        }
        self.remaining as f64 / self.limit as f64
    }

    /// True when no requests remain in the window
    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.remaining == 0
    }
}
