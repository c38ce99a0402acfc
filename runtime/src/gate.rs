//! Concurrency gate
//!
//! Bounds the number of exchanges in flight at once. Excess callers queue
//! in arrival order: tokio's `Semaphore` hands permits out FIFO, so the
//! longest-waiting caller is always the next one admitted.
//!
//! Slots are RAII: a [`GatePermit`] returns its slot when dropped, which
//! covers early returns, errors, panics unwinding through the holder, and
//! callers that abandon the future.
//!
//! ## Usage
//!
//! ```ignore
//! let gate = ConcurrencyGate::new(6);
//!
//! let result = gate.run(async {
//!     transport.exchange(&request).await
//! }).await?;
//! ```

use crate::metrics::RequestMetrics;
use hearth_core::error::RequestError;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

/// Bounded, FIFO-fair gate over in-flight exchanges
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    limit: usize,
    queued: Arc<AtomicUsize>,
}

/// A held concurrency slot, returned on drop
#[must_use = "the slot is released as soon as the permit is dropped"]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        RequestMetrics::slot_released();
    }
}

/// Counts a caller as queued until it is admitted or gives up
struct QueuedGuard(Arc<AtomicUsize>);

impl QueuedGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for QueuedGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `limit` concurrent holders
    ///
    /// A limit of zero would deadlock every caller and is raised to one.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
            queued: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wait for a free slot and reserve it
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error if the gate has been closed.
    pub async fn acquire(&self) -> Result<GatePermit, RequestError> {
        let queued = QueuedGuard::enter(&self.queued);
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| RequestError::internal(format!("concurrency gate closed: {e}")))?;
        drop(queued);

        RequestMetrics::slot_acquired();
        debug!(in_flight = self.in_flight(), limit = self.limit, "Acquired concurrency slot");

        Ok(GatePermit { _permit: permit })
    }

    /// Run `f` while holding a slot
    ///
    /// # Errors
    ///
    /// Returns an `Internal` error if the gate has been closed.
    pub async fn run<F, T>(&self, f: F) -> Result<T, RequestError>
    where
        F: Future<Output = T>,
    {
        let permit = self.acquire().await?;
        let result = f.await;
        drop(permit);
        Ok(result)
    }

    /// Slots free right now
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Slots currently held
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.limit.saturating_sub(self.semaphore.available_permits())
    }

    /// Callers waiting for a slot
    #[must_use]
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    /// Configured limit
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}
