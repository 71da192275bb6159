//! Three-state admission controller over a rolling window.
//!
//! ```text
//! [CLOSED] >--- trip predicate fires ---> [OPEN] <-----------+
//!     ^                                     |                ^
//!     |                              cooling timeout         |
//!     |                                     v          probe fails
//!     +--<--- probes succeed ---<-- [HALFOPEN] -->-----------+
//! ```
//!
//! The machine is entirely event-driven: the first admission check after
//! the cooling timeout is what moves an OPEN breaker to HALFOPEN, and
//! probe spacing is enforced on the admission path. No background task
//! runs, so a process can hold thousands of breakers without per-breaker
//! threads.

mod options;
mod trip;

#[cfg(test)]
mod tests;

pub use options::{
    Options, DEFAULT_BREAKER_MIN_QPS, DEFAULT_BREAKER_MIN_SAMPLES, DEFAULT_BREAKER_RATE,
    DEFAULT_COOLING_TIMEOUT, DEFAULT_DETECT_TIMEOUT, DEFAULT_HALFOPEN_SUCCESSES,
};
pub use trip::{consecutive_trip, rate_trip, threshold_trip, TripFn};

use crate::clock::{system_clock, NowFn};
use crate::error::Result;
use crate::window::{Metrics, Window};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Breaker admission state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum State {
    /// Normal operation - calls pass through and outcomes feed the window.
    Closed,
    /// Tripped - calls are denied until the cooling timeout elapses.
    Open,
    /// Probing recovery - spaced single calls are admitted.
    HalfOpen,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            State::Closed => "CLOSED",
            State::Open => "OPEN",
            State::HalfOpen => "HALFOPEN",
        })
    }
}

/// Invoked on state transitions with `(old, new, window view)`.
///
/// Handlers run while the breaker lock is held: they must not call back
/// into the same breaker (including indirectly, e.g. logging through a
/// path that is itself protected by this breaker) and must not panic.
pub type StateChangeHandler = Arc<dyn Fn(State, State, &dyn Metrics) + Send + Sync>;

/// Timer and counter state, guarded by the breaker mutex.
#[derive(Debug)]
struct Inner {
    state: State,
    /// When the breaker last became OPEN; meaningful in OPEN and HALFOPEN.
    open_time: Option<Instant>,
    /// When the last probe was admitted; meaningful in HALFOPEN.
    last_retry_time: Option<Instant>,
    /// Consecutive probe successes; reset on every HALFOPEN entry.
    halfopen_success: u32,
}

/// Client-side circuit breaker over a rolling statistics window.
///
/// The breaker exclusively owns its [`Window`]; callers report outcomes
/// through the breaker and predicates/handlers see the window only as a
/// read-only [`Metrics`] view.
///
/// Lock order is always breaker, then window; the window never calls
/// back up, so the ordering is acyclic.
pub struct Breaker {
    window: Window,
    inner: Mutex<Inner>,
    cooling_timeout: Duration,
    detect_timeout: Duration,
    half_open_successes: u32,
    should_trip: TripFn,
    on_state_change: Option<StateChangeHandler>,
    total_trips: AtomicU64,
    now: NowFn,
}

impl Breaker {
    /// Build a breaker from `options`.
    ///
    /// Zeroed option fields fall back to their defaults; a non-zero
    /// bucket count below the minimum is rejected with a config error.
    /// A new breaker starts CLOSED with an empty window.
    pub fn new(options: Options) -> Result<Self> {
        let options = options.normalized();
        let now = options.now.clone().unwrap_or_else(system_clock);
        let window =
            Window::with_clock(options.bucket_time, options.bucket_count, Arc::clone(&now))?;
        let should_trip = options
            .should_trip
            .clone()
            .unwrap_or_else(|| rate_trip(options.breaker_rate, options.breaker_min_samples));

        Ok(Self {
            window,
            inner: Mutex::new(Inner {
                state: State::Closed,
                open_time: None,
                last_retry_time: None,
                halfopen_success: 0,
            }),
            cooling_timeout: options.cooling_timeout,
            detect_timeout: options.detect_timeout,
            half_open_successes: options.half_open_successes,
            should_trip,
            on_state_change: options.on_state_change,
            total_trips: AtomicU64::new(0),
            now,
        })
    }

    /// Admission check: may the caller attempt the protected operation?
    ///
    /// The first admission after the cooling timeout expires is the
    /// OPEN -> HALFOPEN transition; while HALFOPEN, admissions are spaced
    /// by the detect timeout. A `false` return is the normal fast-fail
    /// signal, not an error.
    pub fn is_allowed(&self) -> bool {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => true,
            State::Open => {
                let now = (self.now)();
                let cooled = inner
                    .open_time
                    .is_some_and(|t| now.saturating_duration_since(t) >= self.cooling_timeout);
                if !cooled {
                    return false;
                }
                debug!("circuit breaker transitioning to half-open");
                inner.state = State::HalfOpen;
                inner.halfopen_success = 0;
                inner.last_retry_time = Some(now);
                true
            }
            State::HalfOpen => {
                let now = (self.now)();
                let due = inner
                    .last_retry_time
                    .map_or(true, |t| now.saturating_duration_since(t) >= self.detect_timeout);
                if !due {
                    return false;
                }
                inner.last_retry_time = Some(now);
                true
            }
        }
    }

    /// Report a successful call.
    ///
    /// CLOSED records into the window; HALFOPEN counts the probe and
    /// closes the breaker once enough probes succeed in a row; OPEN
    /// ignores the report so the window reflects only admitted traffic.
    pub fn succeed(&self) {
        let mut inner = self.inner.lock();
        match inner.state {
            State::Closed => self.window.succeed(),
            State::HalfOpen => {
                inner.halfopen_success += 1;
                if inner.halfopen_success >= self.half_open_successes {
                    info!(
                        probes = inner.halfopen_success,
                        "circuit breaker closing - dependency recovered"
                    );
                    self.notify(State::HalfOpen, State::Closed);
                    self.window.reset();
                    inner.state = State::Closed;
                    inner.open_time = None;
                    inner.last_retry_time = None;
                    inner.halfopen_success = 0;
                }
            }
            State::Open => {}
        }
    }

    /// Report a failed call, evaluating the configured trip predicate.
    pub fn fail(&self) {
        self.record_error(false, &self.should_trip);
    }

    /// Report a failed call, evaluating `trip` instead of the configured
    /// predicate for this one report.
    pub fn fail_with_trip(&self, trip: &TripFn) {
        self.record_error(false, trip);
    }

    /// Report a timed-out call. Timeouts count as errors for tripping but
    /// are tracked in their own window counter.
    pub fn timeout(&self) {
        self.record_error(true, &self.should_trip);
    }

    /// Report a timed-out call, evaluating `trip` instead of the
    /// configured predicate for this one report.
    pub fn timeout_with_trip(&self, trip: &TripFn) {
        self.record_error(true, trip);
    }

    /// Current admission state.
    pub fn state(&self) -> State {
        self.inner.lock().state
    }

    /// Number of CLOSED/HALFOPEN -> OPEN transitions since construction.
    pub fn total_trips(&self) -> u64 {
        self.total_trips.load(Ordering::Relaxed)
    }

    /// Read-only view of the rolling window.
    pub fn metrics(&self) -> &dyn Metrics {
        &self.window
    }

    /// Return to CLOSED with an empty window, from any state.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        self.window.reset();
        inner.state = State::Closed;
        inner.open_time = None;
        inner.last_retry_time = None;
        inner.halfopen_success = 0;
    }

    fn record_error(&self, is_timeout: bool, trip: &TripFn) {
        let mut inner = self.inner.lock();
        match inner.state {
            // Reports on a tripped breaker are dropped entirely so the
            // window reflects only traffic that actually left the caller.
            State::Open => {}
            State::HalfOpen => {
                self.record_outcome(is_timeout);
                warn!(
                    timeout = is_timeout,
                    "circuit breaker re-opening - probe failed"
                );
                self.notify(State::HalfOpen, State::Open);
                self.trip_open(&mut inner);
            }
            State::Closed => {
                self.record_outcome(is_timeout);
                if trip(&self.window) {
                    let counts = self.window.counts();
                    warn!(
                        failures = counts.failures,
                        timeouts = counts.timeouts,
                        error_rate = self.window.error_rate(),
                        "circuit breaker opening - trip predicate fired"
                    );
                    self.notify(State::Closed, State::Open);
                    self.trip_open(&mut inner);
                }
            }
        }
    }

    fn record_outcome(&self, is_timeout: bool) {
        if is_timeout {
            self.window.timeout();
        } else {
            self.window.fail();
        }
    }

    /// Enter OPEN. The handler has already been notified; only now are
    /// the timers touched.
    fn trip_open(&self, inner: &mut Inner) {
        inner.state = State::Open;
        inner.open_time = Some((self.now)());
        self.total_trips.fetch_add(1, Ordering::Relaxed);
    }

    fn notify(&self, old: State, new: State) {
        if let Some(handler) = &self.on_state_change {
            handler(old, new, &self.window);
        }
    }
}

impl fmt::Debug for Breaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Breaker")
            .field("state", &self.inner.lock().state)
            .field("cooling_timeout", &self.cooling_timeout)
            .field("detect_timeout", &self.detect_timeout)
            .field("half_open_successes", &self.half_open_successes)
            .finish_non_exhaustive()
    }
}
