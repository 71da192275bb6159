use super::*;
use crate::clock::testing::ManualClock;
use crate::error::Error;
use std::sync::atomic::AtomicUsize;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

/// Options for the rate-trip scenarios: 10 s window, rate 0.5 over at
/// least 10 samples, default 5 s cooling and 200 ms detect spacing.
fn rate_options(clock: &ManualClock) -> Options {
    Options {
        breaker_rate: 0.5,
        breaker_min_samples: 10,
        now: Some(clock.now_fn()),
        ..Options::default()
    }
}

/// A breaker that opens on the first error.
fn touchy_breaker(clock: &ManualClock) -> Breaker {
    Breaker::new(Options {
        should_trip: Some(threshold_trip(1)),
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options")
}

#[test]
fn test_bucket_count_below_minimum_is_rejected() {
    let err = Breaker::new(Options {
        bucket_count: 10,
        ..Options::default()
    })
    .unwrap_err();
    assert!(matches!(
        err,
        Error::Config {
            field: "bucket_count",
            ..
        }
    ));
}

#[test]
fn test_new_breaker_starts_closed() {
    let breaker = Breaker::new(Options::default()).expect("valid breaker options");
    assert_eq!(breaker.state(), State::Closed);
    assert!(breaker.is_allowed());
    assert_eq!(breaker.metrics().samples(), 0);
    assert_eq!(breaker.total_trips(), 0);
}

#[test]
fn test_rate_trip_opens_breaker() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(rate_options(&clock)).expect("valid breaker options");

    for _ in 0..5 {
        breaker.succeed();
    }
    for _ in 0..10 {
        breaker.fail();
    }
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.total_trips(), 1);

    // Cooling has not elapsed yet.
    clock.set_ms(1_000);
    assert!(!breaker.is_allowed());
    assert_eq!(breaker.state(), State::Open);

    // First admission after cooling is the transition to half-open.
    clock.set_ms(5_001);
    assert!(breaker.is_allowed());
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[test]
fn test_rate_trip_needs_min_samples() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(rate_options(&clock)).expect("valid breaker options");

    // 100% errors but below the 10-sample floor.
    for _ in 0..9 {
        breaker.fail();
    }
    assert_eq!(breaker.state(), State::Closed);

    breaker.fail();
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_probe_recovery_closes_breaker() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(rate_options(&clock)).expect("valid breaker options");

    for _ in 0..5 {
        breaker.succeed();
    }
    for _ in 0..10 {
        breaker.fail();
    }
    assert_eq!(breaker.state(), State::Open);

    clock.set_ms(5_001);
    assert!(breaker.is_allowed());
    breaker.succeed();
    assert_eq!(breaker.state(), State::HalfOpen);

    clock.set_ms(5_201);
    assert!(breaker.is_allowed());
    breaker.succeed();

    // Two consecutive probe successes close the breaker and clear the
    // window.
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().samples(), 0);
}

#[test]
fn test_probe_failure_reopens_breaker() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(rate_options(&clock)).expect("valid breaker options");

    for _ in 0..10 {
        breaker.fail();
    }
    assert_eq!(breaker.state(), State::Open);

    clock.set_ms(5_001);
    assert!(breaker.is_allowed());
    breaker.fail();
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.total_trips(), 2);

    // Cooling restarts from the probe failure at t=5001.
    clock.set_ms(10_000);
    assert!(!breaker.is_allowed());
    clock.set_ms(10_001);
    assert!(breaker.is_allowed());
    assert_eq!(breaker.state(), State::HalfOpen);
}

#[test]
fn test_detect_timeout_spaces_probes() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(rate_options(&clock)).expect("valid breaker options");

    for _ in 0..10 {
        breaker.fail();
    }
    clock.set_ms(5_001);
    assert!(breaker.is_allowed());

    // 50 ms later is inside the 200 ms detect spacing.
    clock.set_ms(5_051);
    assert!(!breaker.is_allowed());
    assert_eq!(breaker.state(), State::HalfOpen);

    clock.set_ms(5_201);
    assert!(breaker.is_allowed());
}

#[test]
fn test_consecutive_trip_predicate() {
    let clock = ManualClock::new();
    let options = Options {
        should_trip: Some(consecutive_trip(3)),
        now: Some(clock.now_fn()),
        ..Options::default()
    };

    let breaker = Breaker::new(options.clone()).expect("valid breaker options");
    breaker.fail();
    breaker.fail();
    assert_eq!(breaker.state(), State::Closed);
    breaker.fail();
    assert_eq!(breaker.state(), State::Open);

    // An interleaved success restarts the streak.
    let breaker = Breaker::new(options).expect("valid breaker options");
    breaker.fail();
    breaker.fail();
    breaker.succeed();
    breaker.fail();
    breaker.fail();
    assert_eq!(breaker.state(), State::Closed);
}

#[test]
fn test_threshold_trip_counts_timeouts() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(Options {
        should_trip: Some(threshold_trip(3)),
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");

    breaker.fail();
    breaker.timeout();
    assert_eq!(breaker.state(), State::Closed);
    breaker.timeout();
    assert_eq!(breaker.state(), State::Open);

    let counts = breaker.metrics().counts();
    assert_eq!(counts.failures, 1);
    assert_eq!(counts.timeouts, 2);
}

#[test]
fn test_with_trip_overrides_configured_predicate() {
    let clock = ManualClock::new();
    // The default rate predicate needs 200 samples; the override does not.
    let breaker = Breaker::new(Options {
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");

    let immediate = threshold_trip(1);
    breaker.fail_with_trip(&immediate);
    assert_eq!(breaker.state(), State::Open);

    let breaker = Breaker::new(Options {
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");
    breaker.timeout_with_trip(&immediate);
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_open_ignores_outcome_reports() {
    let clock = ManualClock::new();
    let breaker = touchy_breaker(&clock);

    breaker.fail();
    assert_eq!(breaker.state(), State::Open);
    let before = breaker.metrics().counts();

    breaker.succeed();
    breaker.fail();
    breaker.timeout();

    assert_eq!(breaker.metrics().counts(), before);
    assert_eq!(breaker.state(), State::Open);
    assert_eq!(breaker.total_trips(), 1);
}

#[test]
fn test_halfopen_error_reopens_regardless_of_predicate() {
    let clock = ManualClock::new();
    // A predicate that never fires; half-open regression must not consult it.
    let breaker = Breaker::new(Options {
        should_trip: Some(Arc::new(|_| false)),
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");

    breaker.fail_with_trip(&threshold_trip(1));
    clock.set_ms(5_001);
    assert!(breaker.is_allowed());
    assert_eq!(breaker.state(), State::HalfOpen);

    breaker.timeout();
    assert_eq!(breaker.state(), State::Open);
}

#[test]
fn test_reset_from_any_state() {
    let clock = ManualClock::new();

    // CLOSED with recorded traffic.
    let breaker = touchy_breaker(&clock);
    breaker.succeed();
    breaker.reset();
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().samples(), 0);

    // OPEN.
    let breaker = touchy_breaker(&clock);
    breaker.fail();
    assert_eq!(breaker.state(), State::Open);
    breaker.reset();
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().samples(), 0);
    assert_eq!(breaker.metrics().consecutive_errors(), 0);
    assert!(breaker.is_allowed());

    // HALFOPEN.
    let breaker = touchy_breaker(&clock);
    breaker.fail();
    clock.advance_ms(5_001);
    assert!(breaker.is_allowed());
    assert_eq!(breaker.state(), State::HalfOpen);
    breaker.reset();
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().samples(), 0);
}

#[test]
fn test_state_change_handler_sees_transitions_in_order() {
    let clock = ManualClock::new();
    let seen: Arc<StdMutex<Vec<(State, State, u64)>>> = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: StateChangeHandler = Arc::new(move |old, new, metrics| {
        sink.lock()
            .expect("handler sink")
            .push((old, new, metrics.samples()));
    });

    let breaker = Breaker::new(Options {
        should_trip: Some(threshold_trip(2)),
        half_open_successes: 1,
        on_state_change: Some(handler),
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");

    breaker.fail();
    breaker.fail();
    assert_eq!(breaker.state(), State::Open);

    clock.set_ms(5_001);
    // The admission-path transition to half-open is not notified.
    assert!(breaker.is_allowed());
    breaker.succeed();
    assert_eq!(breaker.state(), State::Closed);

    let seen = seen.lock().expect("events");
    assert_eq!(seen.len(), 2);
    // The tripping outcome is recorded before the handler runs.
    assert_eq!(seen[0], (State::Closed, State::Open, 2));
    // On close, the handler observes the window before it is reset.
    assert_eq!(seen[1], (State::HalfOpen, State::Closed, 2));
    assert_eq!(breaker.metrics().samples(), 0);
}

#[test]
fn test_handler_fires_on_probe_regression() {
    let clock = ManualClock::new();
    let seen: Arc<StdMutex<Vec<(State, State)>>> = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let handler: StateChangeHandler = Arc::new(move |old, new, _| {
        sink.lock().expect("handler sink").push((old, new));
    });

    let breaker = Breaker::new(Options {
        should_trip: Some(threshold_trip(1)),
        on_state_change: Some(handler),
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");

    breaker.fail();
    clock.set_ms(5_001);
    assert!(breaker.is_allowed());
    breaker.fail();

    let seen = seen.lock().expect("events");
    assert_eq!(
        *seen,
        vec![
            (State::Closed, State::Open),
            (State::HalfOpen, State::Open),
        ]
    );
}

#[test]
fn test_zeroed_options_fall_back_to_defaults() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(Options {
        bucket_time: Duration::ZERO,
        bucket_count: 0,
        cooling_timeout: Duration::ZERO,
        detect_timeout: Duration::ZERO,
        half_open_successes: 0,
        breaker_rate: 0.0,
        breaker_min_samples: 0,
        breaker_min_qps: 0,
        should_trip: Some(threshold_trip(1)),
        on_state_change: None,
        now: Some(clock.now_fn()),
    })
    .expect("valid breaker options");

    breaker.fail();
    assert_eq!(breaker.state(), State::Open);

    // The default 5 s cooling applies.
    clock.set_ms(4_999);
    assert!(!breaker.is_allowed());
    clock.set_ms(5_000);
    assert!(breaker.is_allowed());
}

#[test]
fn test_window_expiry_prevents_stale_trip() {
    let clock = ManualClock::new();
    // Rate predicate over an expired window sees zero samples again.
    let breaker = Breaker::new(Options {
        bucket_time: Duration::from_millis(10),
        breaker_rate: 0.5,
        breaker_min_samples: 10,
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");

    for _ in 0..9 {
        breaker.fail();
    }
    assert_eq!(breaker.state(), State::Closed);

    // Everything ages out of the 1 s window; one fresh failure is not
    // enough samples to trip.
    clock.set_ms(2_000);
    breaker.fail();
    assert_eq!(breaker.state(), State::Closed);
    assert_eq!(breaker.metrics().samples(), 1);
}

#[test]
fn test_concurrent_callers_do_not_deadlock() {
    let breaker = Arc::new(Breaker::new(Options::default()).expect("valid breaker options"));
    let admitted = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for worker in 0..8usize {
        let breaker = Arc::clone(&breaker);
        let admitted = Arc::clone(&admitted);
        handles.push(std::thread::spawn(move || {
            for i in 0..500 {
                if breaker.is_allowed() {
                    admitted.fetch_add(1, Ordering::Relaxed);
                    match (worker + i) % 3 {
                        0 => breaker.fail(),
                        1 => breaker.timeout(),
                        _ => breaker.succeed(),
                    }
                }
                let _ = breaker.state();
                let _ = breaker.metrics().counts();
            }
        }));
    }
    for handle in handles {
        handle.join().expect("caller thread");
    }

    assert!(admitted.load(Ordering::Relaxed) > 0);
    let counts = breaker.metrics().counts();
    assert!(counts.total() <= 8 * 500);
}

#[test]
fn test_state_serializes_as_variant_name() {
    assert_eq!(
        serde_json::to_string(&State::HalfOpen).expect("serialize"),
        "\"HalfOpen\""
    );
    assert_eq!(State::Open.to_string(), "OPEN");
}

#[test]
fn test_consecutive_errors_span_bucket_boundaries() {
    let clock = ManualClock::new();
    let breaker = Breaker::new(Options {
        should_trip: Some(consecutive_trip(3)),
        now: Some(clock.now_fn()),
        ..Options::default()
    })
    .expect("valid breaker options");

    // The streak is about trailing outcomes, not window contents: errors
    // in different buckets still accumulate.
    breaker.fail();
    clock.advance_ms(150);
    breaker.fail();
    clock.advance_ms(150);
    assert_eq!(breaker.state(), State::Closed);
    breaker.fail();
    assert_eq!(breaker.state(), State::Open);
}
