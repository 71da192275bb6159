//! Trip predicates.
//!
//! A trip predicate is a pure function of the window's read-only view
//! deciding whether a CLOSED breaker should open. Predicates are
//! evaluated only when an error is reported in CLOSED; a HALFOPEN breaker
//! re-opens on the first error regardless of predicate.

use crate::window::Metrics;
use std::sync::Arc;

/// Decides, on an error in CLOSED, whether the breaker should trip.
pub type TripFn = Arc<dyn Fn(&dyn Metrics) -> bool + Send + Sync>;

/// Trip once total errors (failures + timeouts) reach `threshold`.
pub fn threshold_trip(threshold: u64) -> TripFn {
    Arc::new(move |metrics| {
        let counts = metrics.counts();
        counts.failures + counts.timeouts >= threshold
    })
}

/// Trip once the consecutive-error streak reaches `threshold`.
pub fn consecutive_trip(threshold: u64) -> TripFn {
    Arc::new(move |metrics| metrics.consecutive_errors() >= threshold)
}

/// Trip once the window holds at least `min_samples` outcomes and the
/// error rate reaches `rate`. This is the predicate installed when
/// options carry none.
pub fn rate_trip(rate: f64, min_samples: u64) -> TripFn {
    Arc::new(move |metrics| metrics.samples() >= min_samples && metrics.error_rate() >= rate)
}
