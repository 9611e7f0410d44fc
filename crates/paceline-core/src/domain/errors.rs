//! Fetch error taxonomy
//!
//! Every failure a connector's fetch can produce is classified into one of
//! five [`ErrorClass`]es, which drive the retry policy:
//!
//! - `Throttled` - retryable, wait until the provider's reset time
//! - `Server` - retryable with exponential backoff
//! - `Network` - retryable with exponential backoff, bounded attempts
//! - `Ignorable` - caller-declared statuses treated as an empty result
//! - `Client` - fatal, never retried
//!
//! Transient failures are resolved inside the retry policy; only `Client`
//! errors and exhausted retries reach connector code, as a [`FetchFailure`]
//! carrying the classification, the attempt count, and the last underlying
//! error - enough for the connector to skip one resource and continue the
//! batch, or abort the pass.

use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::IgnorePolicy;

// ============================================================================
// DomainError
// ============================================================================

/// Errors from domain value construction and validation
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid pagination cursor
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Invalid fetch deduplication key
    #[error("Invalid fetch key: {0}")]
    InvalidFetchKey(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),

    /// Invalid configuration values
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

// ============================================================================
// ErrorClass
// ============================================================================

/// Retry-relevant classification of a fetch error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    /// Provider signalled quota exhaustion (HTTP 429 or equivalent)
    Throttled,
    /// Provider-side failure (5xx)
    Server,
    /// Transport-level failure (connect, TLS, timeout, body read)
    Network,
    /// Status the caller declared ignorable; treated as an empty result
    Ignorable,
    /// Any other client error (4xx); not retried
    Client,
}

impl std::fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Throttled => "throttled",
            Self::Server => "server",
            Self::Network => "network",
            Self::Ignorable => "ignorable",
            Self::Client => "client",
        };
        write!(f, "{name}")
    }
}

// ============================================================================
// FetchError
// ============================================================================

/// An error produced by one fetch attempt
///
/// Constructed by connector `PageSource`/compute implementations (usually
/// via [`FetchError::from_status`]) and consumed by the engine's retry
/// policy. `Clone` so in-flight deduplication can hand the same failure to
/// every attached waiter.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    /// Quota exceeded; carries whatever reset hints the provider supplied
    #[error("throttled by provider")]
    Throttled {
        /// Relative wait from a `Retry-After`-style header, if present
        retry_after: Option<Duration>,
        /// Absolute reset instant from a quota-reset header, if present
        reset_at: Option<DateTime<Utc>>,
    },

    /// Server-side error (5xx)
    #[error("server error {status}: {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response detail, if any
        message: String,
    },

    /// Client error (4xx other than throttling)
    #[error("client error {status}: {message}")]
    Client {
        /// HTTP status code
        status: u16,
        /// Response detail, if any
        message: String,
    },

    /// The continuation token was rejected as no longer valid (e.g. HTTP
    /// 410); the caller must restart pagination from the beginning
    #[error("continuation token no longer valid: {0}")]
    CursorExpired(String),

    /// Transport-level failure
    #[error("network error: {0}")]
    Network(String),
}

impl FetchError {
    /// Classify an HTTP error status into a `FetchError`
    ///
    /// 429 becomes `Throttled` (without reset hints - callers that have the
    /// response headers should construct `Throttled` directly), 410 becomes
    /// `CursorExpired`, 5xx becomes `Server`, and any other status becomes
    /// `Client`.
    #[must_use]
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            429 => Self::Throttled {
                retry_after: None,
                reset_at: None,
            },
            410 => Self::CursorExpired(message),
            500..=599 => Self::Server { status, message },
            _ => Self::Client { status, message },
        }
    }

    /// The HTTP status associated with this error, if any
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Throttled { .. } => Some(429),
            Self::Server { status, .. } | Self::Client { status, .. } => Some(*status),
            Self::CursorExpired(_) => Some(410),
            Self::Network(_) => None,
        }
    }

    /// Classify this error under the caller's ignore policy
    ///
    /// The ignore list wins over the structural classification so a
    /// connector can declare e.g. 403/404 as "skip this resource".
    #[must_use]
    pub fn class(&self, ignore: &IgnorePolicy) -> ErrorClass {
        if let Some(status) = self.status() {
            if ignore.is_ignored(status) {
                return ErrorClass::Ignorable;
            }
        }

        match self {
            Self::Throttled { .. } => ErrorClass::Throttled,
            Self::Server { .. } => ErrorClass::Server,
            Self::Network(_) => ErrorClass::Network,
            Self::Client { .. } | Self::CursorExpired(_) => ErrorClass::Client,
        }
    }
}

// ============================================================================
// FetchFailure
// ============================================================================

/// Terminal failure surfaced to the connector after retries are exhausted
/// (or immediately, for errors that are never retried)
#[derive(Debug, Clone, Error)]
#[error("{operation} failed after {attempts} attempt(s) ({class}): {source}")]
pub struct FetchFailure {
    /// Name of the operation or resource being fetched
    pub operation: String,
    /// Final classification of the failure
    pub class: ErrorClass,
    /// Total number of attempts made, including the failing one
    pub attempts: u32,
    /// The last underlying error
    #[source]
    pub source: FetchError,
}

// ============================================================================
// Tests
// ============================================================================
