use std::sync::atomic::{AtomicU64, Ordering};

/// Outcome counters for one ring slot.
///
/// Counters are atomic so recording can happen after the ring mutex is
/// released; which slot to write is always decided under the lock.
#[derive(Debug, Default)]
pub(super) struct Bucket {
    success: AtomicU64,
    failure: AtomicU64,
    timeout: AtomicU64,
}

impl Bucket {
    pub(super) fn succeed(&self) {
        self.success.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn fail(&self) {
        self.failure.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn timeout(&self) {
        self.timeout.fetch_add(1, Ordering::Relaxed);
    }

    pub(super) fn successes(&self) -> u64 {
        self.success.load(Ordering::Relaxed)
    }

    pub(super) fn failures(&self) -> u64 {
        self.failure.load(Ordering::Relaxed)
    }

    pub(super) fn timeouts(&self) -> u64 {
        self.timeout.load(Ordering::Relaxed)
    }

    /// Zero all counters. Called under the ring mutex when a slot is
    /// reclaimed for a new time span.
    pub(super) fn clear(&self) {
        self.success.store(0, Ordering::Relaxed);
        self.failure.store(0, Ordering::Relaxed);
        self.timeout.store(0, Ordering::Relaxed);
    }
}
