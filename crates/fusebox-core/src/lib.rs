//! # Fusebox Core
//!
//! Client-side circuit breaker: a rolling-window statistics container
//! plus a three-state admission controller.
//!
//! A [`Breaker`] sits in front of a remote dependency (RPC, database,
//! external service) and decides, per call, whether the caller may
//! attempt the operation. Callers ask [`Breaker::is_allowed`] before the
//! call and report [`Breaker::succeed`], [`Breaker::fail`] or
//! [`Breaker::timeout`] after it. Outcomes aggregate in a [`Window`] of
//! time buckets; when the configured [trip predicate](TripFn) fires on an
//! error, the breaker opens and fast-fails traffic until a cooling
//! timeout elapses, then probes recovery with spaced single calls.
//!
//! ## Example
//!
//! ```
//! use fusebox_core::{threshold_trip, Breaker, Options, State};
//!
//! # fn main() -> fusebox_core::Result<()> {
//! let breaker = Breaker::new(Options {
//!     should_trip: Some(threshold_trip(5)),
//!     ..Options::default()
//! })?;
//!
//! if breaker.is_allowed() {
//!     // ... attempt the protected call ...
//!     breaker.succeed();
//! }
//! assert_eq!(breaker.state(), State::Closed);
//! # Ok(())
//! # }
//! ```
//!
//! ## Concurrency
//!
//! Any number of threads may share a breaker. The window mutex guards
//! ring positions and the error streak while the counters themselves are
//! atomic; the breaker mutex guards state and timers and is always taken
//! before the window's. All operations are bounded: admission checks and
//! outcome reports are O(1), aggregate reads are O(buckets). Nothing
//! blocks on I/O and no background task runs.

pub mod breaker;
pub mod clock;
pub mod error;
pub mod window;

// Re-export commonly used types
pub use breaker::{
    consecutive_trip, rate_trip, threshold_trip, Breaker, Options, State, StateChangeHandler,
    TripFn,
};
pub use clock::NowFn;
pub use error::{Error, Result};
pub use window::{Counts, Metrics, Window, MIN_BUCKET_COUNT};
