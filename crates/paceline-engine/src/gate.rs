//! Bounded concurrency gate
//!
//! [`ConcurrencyGate`] caps the number of simultaneously in-flight fetches
//! behind a counting semaphore. Permits are scoped: they are released on
//! every exit path, including errors, panics that unwind, and cancellation
//! (dropping the future mid-await).

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::warn;

/// Errors from gate admission
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GateError {
    /// The underlying semaphore was closed; no further slots will open
    #[error("concurrency gate closed")]
    Closed,
}

/// Bounds the number of concurrently executing operations.
///
/// Cheap to share: clone the `Arc` it typically lives behind. No ordering
/// guarantee among waiters beyond what the tokio semaphore provides.
#[derive(Debug)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    max_slots: usize,
}

impl ConcurrencyGate {
    /// Creates a gate with `max_slots` concurrent slots.
    ///
    /// A zero-slot gate would block every caller forever, so the count is
    /// clamped to at least one.
    pub fn new(max_slots: usize) -> Self {
        let max_slots = if max_slots == 0 {
            warn!("Concurrency gate configured with 0 slots, clamping to 1");
            1
        } else {
            max_slots
        };

        Self {
            semaphore: Arc::new(Semaphore::new(max_slots)),
            max_slots,
        }
    }

    /// Runs `fut` inside a slot.
    ///
    /// Suspends until a permit is available, polls `fut` to completion, and
    /// releases the permit when the returned future completes or is
    /// dropped. The wrapped future is not polled until admission succeeds.
    pub async fn with_slot<F, T>(&self, fut: F) -> Result<T, GateError>
    where
        F: std::future::Future<Output = T>,
    {
        let _permit = self.semaphore.acquire().await.map_err(|_| GateError::Closed)?;
        Ok(fut.await)
    }

    /// Acquires an owned slot guard for callers that spawn work.
    ///
    /// The slot is held until the guard is dropped.
    pub async fn slot(&self) -> Result<SlotGuard, GateError> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| GateError::Closed)?;
        Ok(SlotGuard { _permit: permit })
    }

    /// Slots currently free.
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// The configured maximum.
    pub fn max_slots(&self) -> usize {
        self.max_slots
    }
}

/// RAII guard for one concurrency slot
///
/// Ownership is exclusive; the slot is returned exactly once, when the
/// guard drops.
#[derive(Debug)]
pub struct SlotGuard {
    _permit: OwnedSemaphorePermit,
}

// ============================================================================
// Tests
// ============================================================================
