//! Paceline Core - Domain types for the adaptive fetch engine
//!
//! This crate contains the pure, I/O-free layer shared by the engine and by
//! connector code:
//! - **Domain value types** - `Cursor`, `FetchKey`, `BatchId`, `RateBudget`
//! - **Error taxonomy** - `FetchError` classification and the typed
//!   `FetchFailure` surfaced to connectors
//! - **Configuration** - limiter, retry, and quota-header settings passed in
//!   programmatically by connectors
//!
//! # Architecture
//!
//! Connectors construct requests and parse responses; the engine crate
//! coordinates admission, pagination, retries, and deduplication. Everything
//! both sides need to agree on - identifiers, budgets, error classes, and
//! configuration shapes - lives here, with no HTTP or runtime dependencies.

pub mod config;
pub mod domain;
