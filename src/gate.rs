//! One-slot gate bounding the pipeline to a single capture cycle at a time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

#[derive(Debug, Default)]
struct GateCounters {
    acquired: AtomicU64,
    released: AtomicU64,
    rejected: AtomicU64,
}

/// Capacity-one mutual exclusion that never waits.
///
/// A caller that finds the slot taken is turned away immediately; nothing is
/// queued behind the current holder.
#[derive(Debug)]
pub struct CaptureGate {
    slot: Arc<Semaphore>,
    counters: Arc<GateCounters>,
}

impl Default for CaptureGate {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureGate {
    /// Create a free gate
    #[must_use]
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Semaphore::new(1)),
            counters: Arc::new(GateCounters::default()),
        }
    }

    /// Take the slot if it is free.
    ///
    /// The slot is released when the returned permit is dropped, which makes
    /// release happen exactly once per acquisition even on early return or
    /// unwinding.
    pub fn try_acquire(&self) -> Option<GatePermit> {
        match Arc::clone(&self.slot).try_acquire_owned() {
            Ok(permit) => {
                self.counters.acquired.fetch_add(1, Ordering::Relaxed);
                Some(GatePermit {
                    _permit: permit,
                    counters: Arc::clone(&self.counters),
                })
            }
            Err(_) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Whether a cycle currently holds the slot
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.slot.available_permits() == 0
    }

    /// Successful acquisitions so far
    #[must_use]
    pub fn acquisitions(&self) -> u64 {
        self.counters.acquired.load(Ordering::Relaxed)
    }

    /// Releases so far
    #[must_use]
    pub fn releases(&self) -> u64 {
        self.counters.released.load(Ordering::Relaxed)
    }

    /// Acquisition attempts turned away because the slot was held
    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.counters.rejected.load(Ordering::Relaxed)
    }
}

/// Proof of holding the gate; dropping it frees the slot
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
    counters: Arc<GateCounters>,
}

impl Drop for GatePermit {
    fn drop(&mut self) {
        self.counters.released.fetch_add(1, Ordering::Relaxed);
    }
}
