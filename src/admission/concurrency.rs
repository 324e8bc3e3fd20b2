//! Global in-flight gate with a bounded FIFO wait queue

use super::Rejection;
use crate::config::ConcurrencyConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// Held for the lifetime of an admitted request. Dropping it frees the slot
/// for the oldest waiter.
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

/// Bounded concurrency with a FIFO queue in front of it.
///
/// `tokio::sync::Semaphore` is fair: released permits go to queued waiters
/// in arrival order before any new caller can take them.
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    queued: Arc<AtomicUsize>,
    permit_limit: usize,
    queue_limit: usize,
}

/// Keeps the queue-depth counter in step with waiters, including waiters
/// whose future is dropped before a permit arrives.
struct QueueSlot<'a> {
    queued: &'a AtomicUsize,
}

impl Drop for QueueSlot<'_> {
    fn drop(&mut self) {
        let depth = self.queued.fetch_sub(1, Ordering::AcqRel) - 1;
        metrics::gauge!("gatekeeper_admission_queue_depth").set(depth as f64);
    }
}

impl ConcurrencyGate {
    /// Permit limits above `Semaphore::MAX_PERMITS` are clamped to it.
    pub fn new(config: ConcurrencyConfig) -> Self {
        let permit_limit = config.permit_limit.min(Semaphore::MAX_PERMITS);
        Self {
            semaphore: Arc::new(Semaphore::new(permit_limit)),
            queued: Arc::new(AtomicUsize::new(0)),
            permit_limit,
            queue_limit: config.queue_limit,
        }
    }

    /// Take a slot, waiting in line if all are busy.
    ///
    /// Fails with [`Rejection::Overloaded`] without waiting for a slot when
    /// the queue is full. A waiter that has been handed a permit leaves the
    /// queue count only once its task is polled, so a full queue yields once
    /// and re-checks before rejecting. On a multi-threaded runtime a woken
    /// waiter that is still not polled after that yield keeps counting.
    pub async fn admit(&self) -> Result<GatePermit, Rejection> {
        if let Some(permit) = self.try_take() {
            return Ok(permit);
        }

        let _slot = match self.enqueue() {
            Ok(slot) => slot,
            Err(_) => {
                tokio::task::yield_now().await;
                if let Some(permit) = self.try_take() {
                    return Ok(permit);
                }
                self.enqueue()?
            }
        };
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Rejection::Overloaded)?;
        Ok(GatePermit { _permit: permit })
    }

    fn try_take(&self) -> Option<GatePermit> {
        self.semaphore
            .clone()
            .try_acquire_owned()
            .ok()
            .map(|permit| GatePermit { _permit: permit })
    }

    fn enqueue(&self) -> Result<QueueSlot<'_>, Rejection> {
        let limit = self.queue_limit;
        let previous = self
            .queued
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |depth| {
                (depth < limit).then_some(depth + 1)
            })
            .map_err(|_| Rejection::Overloaded)?;
        metrics::gauge!("gatekeeper_admission_queue_depth").set((previous + 1) as f64);
        Ok(QueueSlot {
            queued: &self.queued,
        })
    }

    /// Slots not currently held
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Requests currently waiting for a slot
    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    pub fn permit_limit(&self) -> usize {
        self.permit_limit
    }

    pub fn queue_limit(&self) -> usize {
        self.queue_limit
    }
}
