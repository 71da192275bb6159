//! Clock injection.
//!
//! Every cooling, detect and bucket-aging decision reads the same "now"
//! source, fixed at construction. Production breakers use the system
//! clock; tests supply a manually advanced one so timer behavior can be
//! driven tick by tick.

use std::sync::Arc;
use std::time::Instant;

/// Source of "now" shared by all timers of a window or breaker.
pub type NowFn = Arc<dyn Fn() -> Instant + Send + Sync>;

pub(crate) fn system_clock() -> NowFn {
    Arc::new(Instant::now)
}
