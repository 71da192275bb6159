//! Rolling-window outcome statistics.
//!
//! The window is a fixed ring of buckets, each covering `bucket_time` of
//! wall time. Writes land in the latest bucket, advancing the ring by one
//! slot when that bucket's span has elapsed; reads prune buckets older
//! than the whole window before aggregating. Aging is entirely lazy and
//! driven by reads and writes - no background sweeper runs, so a window
//! has no lifecycle to manage.

mod bucket;


use bucket::Bucket;

use crate::clock::{system_clock, NowFn};
use crate::error::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Default duration covered by one bucket.
pub const DEFAULT_BUCKET_TIME: Duration = Duration::from_millis(100);

/// Default number of buckets; together with the default bucket time this
/// gives a 10 second window.
pub const DEFAULT_BUCKET_COUNT: usize = 100;

/// Windows with fewer buckets than this are rejected at construction.
/// Coarser rings alias too much traffic into a single slot.
pub const MIN_BUCKET_COUNT: usize = 100;

/// Aggregated outcome counts over the live window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub successes: u64,
    pub failures: u64,
    pub timeouts: u64,
}

impl Counts {
    /// Sum of all three counters.
    pub fn total(&self) -> u64 {
        self.successes + self.failures + self.timeouts
    }
}

/// Read-only view of window statistics, as consumed by trip predicates
/// and state-change handlers.
pub trait Metrics {
    /// Success / failure / timeout totals over the live window.
    fn counts(&self) -> Counts;
    /// Successes in the live window.
    fn successes(&self) -> u64;
    /// Failures in the live window.
    fn failures(&self) -> u64;
    /// Timeouts in the live window.
    fn timeouts(&self) -> u64;
    /// Length of the current trailing run of non-successes.
    fn consecutive_errors(&self) -> u64;
    /// `(failures + timeouts) / samples`, or `0.0` with no samples.
    fn error_rate(&self) -> f64;
    /// Total outcomes in the live window.
    fn samples(&self) -> u64;
}

/// Ring position state, guarded by the window mutex.
///
/// `stamps[i]` is when slot `i` was last (re)initialized; restamping only
/// ever happens while this struct is locked.
struct Ring {
    oldest: usize,
    latest: usize,
    in_window: usize,
    conse_err: u64,
    stamps: Box<[Instant]>,
}

/// Rolling window of success / failure / timeout counts plus a
/// consecutive-error streak.
pub struct Window {
    ring: Mutex<Ring>,
    buckets: Box<[Bucket]>,
    bucket_time: Duration,
    expire_time: Duration,
    now: NowFn,
}

impl Window {
    /// Create a window with the given bucket granularity, using the
    /// system clock.
    ///
    /// A zero `bucket_time` falls back to [`DEFAULT_BUCKET_TIME`];
    /// a `bucket_count` below [`MIN_BUCKET_COUNT`] is rejected.
    pub fn with_options(bucket_time: Duration, bucket_count: usize) -> Result<Self> {
        Self::with_clock(bucket_time, bucket_count, system_clock())
    }

    pub(crate) fn with_clock(
        bucket_time: Duration,
        bucket_count: usize,
        now: NowFn,
    ) -> Result<Self> {
        if bucket_count < MIN_BUCKET_COUNT {
            return Err(Error::Config {
                field: "bucket_count",
                message: format!("must be at least {MIN_BUCKET_COUNT}, got {bucket_count}"),
            });
        }
        let bucket_time = if bucket_time.is_zero() {
            DEFAULT_BUCKET_TIME
        } else {
            bucket_time
        };

        let buckets: Box<[Bucket]> = (0..bucket_count).map(|_| Bucket::default()).collect();
        let start = now();
        let stamps = vec![start; bucket_count].into_boxed_slice();

        Ok(Self {
            ring: Mutex::new(Ring {
                oldest: 0,
                latest: 0,
                in_window: 1,
                conse_err: 0,
                stamps,
            }),
            buckets,
            bucket_time,
            expire_time: bucket_time.saturating_mul(bucket_count as u32),
            now,
        })
    }

    /// Record a success in the current bucket and clear the error streak.
    pub fn succeed(&self) {
        let slot = {
            let mut ring = self.ring.lock();
            ring.conse_err = 0;
            self.writable_slot(&mut ring)
        };
        self.buckets[slot].succeed();
    }

    /// Record a failure in the current bucket and extend the error streak.
    pub fn fail(&self) {
        let slot = {
            let mut ring = self.ring.lock();
            ring.conse_err += 1;
            self.writable_slot(&mut ring)
        };
        self.buckets[slot].fail();
    }

    /// Record a timeout in the current bucket and extend the error streak.
    pub fn timeout(&self) {
        let slot = {
            let mut ring = self.ring.lock();
            ring.conse_err += 1;
            self.writable_slot(&mut ring)
        };
        self.buckets[slot].timeout();
    }

    /// Prune expired buckets, then sum the counters of the live range.
    ///
    /// The live range is snapshotted under the ring lock; the counter
    /// reads themselves are lock-free atomic loads.
    pub fn counts(&self) -> Counts {
        let (mut slot, mut remain) = {
            let mut ring = self.ring.lock();
            self.expire(&mut ring);
            (ring.oldest, ring.in_window)
        };

        let mut counts = Counts {
            successes: 0,
            failures: 0,
            timeouts: 0,
        };
        while remain > 0 {
            let bucket = &self.buckets[slot];
            counts.successes += bucket.successes();
            counts.failures += bucket.failures();
            counts.timeouts += bucket.timeouts();
            slot = (slot + 1) % self.buckets.len();
            remain -= 1;
        }
        counts
    }

    /// Successes in the live window.
    pub fn successes(&self) -> u64 {
        self.counts().successes
    }

    /// Failures in the live window.
    pub fn failures(&self) -> u64 {
        self.counts().failures
    }

    /// Timeouts in the live window.
    pub fn timeouts(&self) -> u64 {
        self.counts().timeouts
    }

    /// Total outcomes in the live window.
    pub fn samples(&self) -> u64 {
        self.counts().total()
    }

    /// `(failures + timeouts) / samples`, or `0.0` with no samples.
    pub fn error_rate(&self) -> f64 {
        let counts = self.counts();
        let samples = counts.total();
        if samples == 0 {
            return 0.0;
        }
        (counts.failures + counts.timeouts) as f64 / samples as f64
    }

    /// Length of the current trailing run of non-successes.
    pub fn consecutive_errors(&self) -> u64 {
        self.ring.lock().conse_err
    }

    /// Invalidate the whole window: the ring collapses to a single
    /// freshly stamped bucket, so `samples()` reads 0 afterwards. Slots
    /// left behind fall outside the live range and are cleared when the
    /// ring advances back into them.
    pub fn reset(&self) {
        let mut ring = self.ring.lock();
        ring.oldest = 0;
        ring.latest = 0;
        ring.in_window = 1;
        ring.conse_err = 0;
        self.buckets[0].clear();
        ring.stamps[0] = (self.now)();
    }

    /// Locate the writable bucket, advancing the ring by exactly one slot
    /// when the latest bucket's span has elapsed. Idle gaps longer than
    /// one span leave stale stamps behind; those are filtered out by the
    /// expiry check on the aggregate side.
    fn writable_slot(&self, ring: &mut Ring) -> usize {
        let now = (self.now)();
        if now.saturating_duration_since(ring.stamps[ring.latest]) < self.bucket_time {
            return ring.latest;
        }

        let len = self.buckets.len();
        ring.latest = (ring.latest + 1) % len;
        if ring.in_window == len {
            // The ring is full; the new latest reclaims the oldest slot.
            ring.oldest = (ring.oldest + 1) % len;
        } else {
            ring.in_window += 1;
        }
        self.buckets[ring.latest].clear();
        ring.stamps[ring.latest] = now;
        ring.latest
    }

    /// Drop buckets whose whole span has aged out of the window.
    fn expire(&self, ring: &mut Ring) {
        let now = (self.now)();
        let len = self.buckets.len();
        while ring.in_window > 0 {
            let age = now.saturating_duration_since(ring.stamps[ring.oldest]);
            if age < self.expire_time {
                break;
            }
            ring.oldest = (ring.oldest + 1) % len;
            ring.in_window -= 1;
        }
    }
}

impl Metrics for Window {
    fn counts(&self) -> Counts {
        Window::counts(self)
    }

    fn successes(&self) -> u64 {
        Window::successes(self)
    }

    fn failures(&self) -> u64 {
        Window::failures(self)
    }

    fn timeouts(&self) -> u64 {
        Window::timeouts(self)
    }

    fn consecutive_errors(&self) -> u64 {
        Window::consecutive_errors(self)
    }

    fn error_rate(&self) -> f64 {
        Window::error_rate(self)
    }

    fn samples(&self) -> u64 {
        Window::samples(self)
    }
}

impl fmt::Debug for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Window")
            .field("bucket_count", &self.buckets.len())
            .field("bucket_time", &self.bucket_time)
            .field("expire_time", &self.expire_time)
            .finish_non_exhaustive()
    }
}
