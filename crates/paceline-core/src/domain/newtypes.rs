//! Domain newtypes with validation
//!
//! Strongly-typed wrappers for the identifiers the engine passes around.
//! Each newtype ensures data validity at construction time; none of them
//! carry provider-specific meaning.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::DomainError;

// ============================================================================
// Cursor
// ============================================================================

/// Opaque pagination continuation token
///
/// Providers hand these back in many shapes (JSON body fields, `Link`
/// headers, `skipToken` query parameters); the engine only ever tests
/// presence vs. absence. The token is opaque - we don't validate its
/// contents beyond being non-empty, and we never parse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Cursor(String);

impl Cursor {
    /// Create a new Cursor
    ///
    /// # Errors
    /// Returns error if the token is empty
    pub fn new(token: String) -> Result<Self, DomainError> {
        if token.is_empty() {
            return Err(DomainError::InvalidCursor(
                "Cursor token cannot be empty".to_string(),
            ));
        }

        Ok(Self(token))
    }

    /// Get the inner string reference
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Cursor {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Cursor {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

impl TryFrom<String> for Cursor {
    type Error = DomainError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl From<Cursor> for String {
    fn from(cursor: Cursor) -> Self {
        cursor.0
    }
}

// ============================================================================
// FetchKey
// ============================================================================

/// Value-equality composite key identifying one logically distinct fetch
///
/// Built from ordered string segments (e.g. organization, repository,
/// branch, path). Used only as a map key for in-flight deduplication;
/// the engine never dereferences the segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FetchKey(Vec<String>);

impl FetchKey {
    /// Create a FetchKey from ordered segments
    ///
    /// # Errors
    /// Returns error if no segments are given or any segment is empty
    pub fn new<I, S>(segments: I) -> Result<Self, DomainError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();

        if segments.is_empty() {
            return Err(DomainError::InvalidFetchKey(
                "FetchKey requires at least one segment".to_string(),
            ));
        }

        if segments.iter().any(String::is_empty) {
            return Err(DomainError::InvalidFetchKey(
                "FetchKey segments cannot be empty".to_string(),
            ));
        }

        Ok(Self(segments))
    }

    /// The ordered segments this key is composed of
    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl Display for FetchKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("/"))
    }
}

// ============================================================================
// BatchId
// ============================================================================

/// Identifier for one logical batch (a single synchronization pass)
///
/// Carried by the batch-scoped fetch coalescer so every log line of one
/// pass can be correlated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

impl BatchId {
    /// Create a new random BatchId
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a BatchId from an existing UUID
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID value
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for BatchId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BatchId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| DomainError::InvalidId(format!("Invalid BatchId: {e}")))
    }
}

// ============================================================================
// ApiClass
// ============================================================================

/// Coarse classification of a provider API surface
///
/// Together with the host name this keys the limiter registry, so that for
/// example a provider's REST and GraphQL endpoints (which typically carry
/// separate quotas) get separate budgets while all callers of the same
/// surface share one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiClass {
    /// REST-style resource endpoints
    Rest,
    /// GraphQL endpoint (usually a distinct quota pool)
    GraphQl,
    /// Search endpoints, which several providers meter separately
    Search,
    /// Any other provider-specific quota pool
    Custom(String),
}

impl Display for ApiClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rest => write!(f, "rest"),
            Self::GraphQl => write!(f, "graphql"),
            Self::Search => write!(f, "search"),
            Self::Custom(name) => write!(f, "{name}"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
