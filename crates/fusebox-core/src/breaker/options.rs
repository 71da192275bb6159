//! Breaker configuration.

use super::trip::TripFn;
use super::StateChangeHandler;
use crate::clock::NowFn;
use crate::window::{DEFAULT_BUCKET_COUNT, DEFAULT_BUCKET_TIME};
use std::fmt;
use std::time::Duration;

/// Time a breaker stays OPEN before the first recovery probe is admitted.
pub const DEFAULT_COOLING_TIMEOUT: Duration = Duration::from_secs(5);

/// Minimum spacing between recovery probes while HALFOPEN.
pub const DEFAULT_DETECT_TIMEOUT: Duration = Duration::from_millis(200);

/// Consecutive probe successes required to close a HALFOPEN breaker.
pub const DEFAULT_HALFOPEN_SUCCESSES: u32 = 2;

/// Error-rate threshold of the default trip predicate.
pub const DEFAULT_BREAKER_RATE: f64 = 0.5;

/// Minimum window samples before the default trip predicate may fire.
pub const DEFAULT_BREAKER_MIN_SAMPLES: u64 = 200;

/// Baseline per-command QPS consumed by registry recalibration.
pub const DEFAULT_BREAKER_MIN_QPS: u64 = 200;

/// Breaker configuration.
///
/// Zeroed fields fall back to the defaults above; the one hard constraint
/// is the minimum bucket count, enforced at construction. Options are
/// captured by value when a breaker is built, so later mutation of the
/// caller's copy has no effect on a live breaker.
#[derive(Clone)]
pub struct Options {
    /// Duration covered by one window bucket.
    pub bucket_time: Duration,
    /// Number of window buckets; at least `MIN_BUCKET_COUNT`.
    pub bucket_count: usize,
    /// How long OPEN denies all traffic before probing.
    pub cooling_timeout: Duration,
    /// Minimum spacing between HALFOPEN probes.
    pub detect_timeout: Duration,
    /// Consecutive probe successes needed to close.
    pub half_open_successes: u32,
    /// Error-rate threshold for the default predicate, in `[0, 1]`.
    pub breaker_rate: f64,
    /// Minimum samples before the default predicate may fire.
    pub breaker_min_samples: u64,
    /// Per-instance QPS baseline; only registry recalibration reads it.
    pub breaker_min_qps: u64,
    /// Trip predicate; `None` installs the rate predicate built from
    /// `breaker_rate` and `breaker_min_samples`.
    pub should_trip: Option<TripFn>,
    /// Invoked on CLOSED->OPEN, HALFOPEN->OPEN and HALFOPEN->CLOSED.
    pub on_state_change: Option<StateChangeHandler>,
    /// Clock override; `None` uses the system clock.
    pub now: Option<NowFn>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            bucket_time: DEFAULT_BUCKET_TIME,
            bucket_count: DEFAULT_BUCKET_COUNT,
            cooling_timeout: DEFAULT_COOLING_TIMEOUT,
            detect_timeout: DEFAULT_DETECT_TIMEOUT,
            half_open_successes: DEFAULT_HALFOPEN_SUCCESSES,
            breaker_rate: DEFAULT_BREAKER_RATE,
            breaker_min_samples: DEFAULT_BREAKER_MIN_SAMPLES,
            breaker_min_qps: DEFAULT_BREAKER_MIN_QPS,
            should_trip: None,
            on_state_change: None,
            now: None,
        }
    }
}

impl Options {
    /// Resolve zeroed fields to their defaults. Construction does this
    /// implicitly; the registry calls it to compute window arithmetic on
    /// the same values a built breaker would use.
    pub fn normalized(mut self) -> Self {
        if self.bucket_time.is_zero() {
            self.bucket_time = DEFAULT_BUCKET_TIME;
        }
        if self.bucket_count == 0 {
            self.bucket_count = DEFAULT_BUCKET_COUNT;
        }
        if self.cooling_timeout.is_zero() {
            self.cooling_timeout = DEFAULT_COOLING_TIMEOUT;
        }
        if self.detect_timeout.is_zero() {
            self.detect_timeout = DEFAULT_DETECT_TIMEOUT;
        }
        if self.half_open_successes == 0 {
            self.half_open_successes = DEFAULT_HALFOPEN_SUCCESSES;
        }
        if self.breaker_rate <= 0.0 {
            self.breaker_rate = DEFAULT_BREAKER_RATE;
        }
        if self.breaker_min_samples == 0 {
            self.breaker_min_samples = DEFAULT_BREAKER_MIN_SAMPLES;
        }
        if self.breaker_min_qps == 0 {
            self.breaker_min_qps = DEFAULT_BREAKER_MIN_QPS;
        }
        self
    }

    /// Length of the rolling window described by these options.
    pub fn window_length(&self) -> Duration {
        self.bucket_time.saturating_mul(self.bucket_count as u32)
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("bucket_time", &self.bucket_time)
            .field("bucket_count", &self.bucket_count)
            .field("cooling_timeout", &self.cooling_timeout)
            .field("detect_timeout", &self.detect_timeout)
            .field("half_open_successes", &self.half_open_successes)
            .field("breaker_rate", &self.breaker_rate)
            .field("breaker_min_samples", &self.breaker_min_samples)
            .field("breaker_min_qps", &self.breaker_min_qps)
            .field("should_trip", &self.should_trip.as_ref().map(|_| "..."))
            .field(
                "on_state_change",
                &self.on_state_change.as_ref().map(|_| "..."),
            )
            .finish_non_exhaustive()
    }
}
