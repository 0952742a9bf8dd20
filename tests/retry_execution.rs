use holdfast::{Backoff, InstantSleeper, Jitter, PolicyStack, RetryPolicy, TrackingSleeper};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestError(&'static str);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestError: {}", self.0)
    }
}

impl std::error::Error for TestError {}

/// Yields two failures, then `false` twice, then `true`.
fn flaky_connect(calls: Arc<AtomicUsize>) -> impl FnMut() -> Result<bool, TestError> {
    move || match calls.fetch_add(1, Ordering::SeqCst) {
        0 | 1 => Err(TestError("connect reset")),
        2 | 3 => Ok(false),
        _ => Ok(true),
    }
}

#[test]
fn listener_counts_for_successful_completion() {
    let calls = Arc::new(AtomicUsize::new(0));
    let retry: RetryPolicy<bool, TestError> =
        RetryPolicy::builder().unbounded_attempts().retry_when(false).build();

    let builder = PolicyStack::builder().retry(retry).unwrap().with_sleeper(InstantSleeper);

    let failed_attempts = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let completes = Arc::new(AtomicUsize::new(0));

    let counter = failed_attempts.clone();
    builder.listeners().on_failed_attempt(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = successes.clone();
    builder.listeners().on_success(move |value| {
        assert!(*value);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = failures.clone();
    builder.listeners().on_failure(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = completes.clone();
    builder.listeners().on_complete(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let stack = builder.build();
    let result = stack.execute(flaky_connect(calls.clone()));

    assert_eq!(result.unwrap(), true);
    assert_eq!(calls.load(Ordering::SeqCst), 5, "two throws, two falses, one true");
    assert_eq!(failed_attempts.load(Ordering::SeqCst), 4);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
    assert_eq!(completes.load(Ordering::SeqCst), 1);
}

#[test]
fn listener_counts_for_failure_completion() {
    let calls = Arc::new(AtomicUsize::new(0));
    let retry: RetryPolicy<bool, TestError> =
        RetryPolicy::builder().max_attempts(3).unwrap().retry_when(false).build();

    let builder = PolicyStack::builder().retry(retry).unwrap().with_sleeper(InstantSleeper);

    let failed_attempts = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));
    let completes = Arc::new(AtomicUsize::new(0));

    let counter = failed_attempts.clone();
    builder.listeners().on_failed_attempt(move |_, _, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = successes.clone();
    builder.listeners().on_success(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = failures.clone();
    builder.listeners().on_failure(move |result, failure| {
        // Terminal outcome is the unmet `false`, not an error.
        assert_eq!(result, Some(&false));
        assert!(failure.is_none());
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = completes.clone();
    builder.listeners().on_complete(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let stack = builder.build();
    let result = stack.execute(flaky_connect(calls.clone()));

    // The value comes back even though listeners classified it a failure.
    assert_eq!(result.unwrap(), false);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(failed_attempts.load(Ordering::SeqCst), 3);
    assert_eq!(successes.load(Ordering::SeqCst), 0);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert_eq!(completes.load(Ordering::SeqCst), 1);
}

#[test]
fn max_attempts_bounds_invocations() {
    for max in [1u32, 2, 5] {
        let retry: RetryPolicy<u32, TestError> =
            RetryPolicy::builder().max_attempts(max).unwrap().build();
        let stack = PolicyStack::builder().retry(retry).unwrap().with_sleeper(InstantSleeper).build();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let result = stack.execute(move || {
            calls_clone.fetch_add(1, Ordering::SeqCst);
            Err::<u32, _>(TestError("always"))
        });

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), max as usize);
    }
}

#[test]
fn attempt_counter_increases_by_one_per_invocation() {
    let retry: RetryPolicy<u32, TestError> =
        RetryPolicy::builder().max_attempts(4).unwrap().build();
    let stack = PolicyStack::builder().retry(retry).unwrap().with_sleeper(InstantSleeper).build();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let _ = stack.execute_with_context(move |ctx| {
        seen_clone.lock().unwrap().push(ctx.attempts());
        Err::<u32, _>(TestError("always"))
    });

    assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
}

#[test]
fn abort_preempts_retry_on_the_same_outcome() {
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .unbounded_attempts()
        .retry_on(|e: &TestError| e.0 == "poisoned")
        .abort_on(|e: &TestError| e.0 == "poisoned")
        .build();
    let stack = PolicyStack::builder().retry(retry).unwrap().with_sleeper(InstantSleeper).build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let result = stack.execute(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Err::<u32, _>(TestError("poisoned"))
    });

    assert_eq!(result.unwrap_err().into_operation().unwrap().0, "poisoned");
    assert_eq!(calls.load(Ordering::SeqCst), 1, "abort wins over retry");
}

#[test]
fn exponential_backoff_schedule_is_honored() {
    let sleeper = TrackingSleeper::new();
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .max_attempts(7)
        .unwrap()
        .backoff(
            Backoff::exponential(Duration::from_millis(10))
                .with_max(Duration::from_millis(100))
                .unwrap(),
        )
        .jitter(Jitter::None)
        .build();
    let stack =
        PolicyStack::builder().retry(retry).unwrap().with_sleeper(sleeper.clone()).build();

    let _ = stack.execute(|| Err::<u32, _>(TestError("always")));

    assert_eq!(
        sleeper.calls(),
        vec![
            Duration::from_millis(10),
            Duration::from_millis(20),
            Duration::from_millis(40),
            Duration::from_millis(80),
            Duration::from_millis(100),
            Duration::from_millis(100),
        ]
    );
}

#[test]
fn jittered_delays_stay_within_the_band() {
    let sleeper = TrackingSleeper::new();
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .max_attempts(20)
        .unwrap()
        .backoff(Backoff::fixed(Duration::from_millis(100)))
        .jitter(Jitter::absolute(Duration::from_millis(30)))
        .build();
    let stack =
        PolicyStack::builder().retry(retry).unwrap().with_sleeper(sleeper.clone()).build();

    let _ = stack.execute(|| Err::<u32, _>(TestError("always")));

    let calls = sleeper.calls();
    assert_eq!(calls.len(), 19);
    for delay in calls {
        assert!(delay >= Duration::from_millis(70));
        assert!(delay <= Duration::from_millis(130));
    }
}

#[test]
fn wall_clock_gap_between_attempts_is_at_least_the_delay() {
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .max_attempts(3)
        .unwrap()
        .backoff(Backoff::fixed(Duration::from_millis(40)))
        .build();
    // Real blocking sleeper: the default.
    let stack = PolicyStack::builder().retry(retry).unwrap().build();

    let stamps = Arc::new(Mutex::new(Vec::new()));
    let stamps_clone = stamps.clone();
    let _ = stack.execute(move || {
        stamps_clone.lock().unwrap().push(Instant::now());
        Err::<u32, _>(TestError("always"))
    });

    let stamps = stamps.lock().unwrap();
    assert_eq!(stamps.len(), 3);
    for pair in stamps.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(35));
    }
}

#[test]
fn max_duration_stops_retrying() {
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .unbounded_attempts()
        .backoff(Backoff::fixed(Duration::from_millis(20)))
        .max_duration(Duration::from_millis(120))
        .build();
    let stack = PolicyStack::builder().retry(retry).unwrap().build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let start = Instant::now();
    let result = stack.execute(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Err::<u32, _>(TestError("always"))
    });

    assert!(result.is_err());
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(calls.load(Ordering::SeqCst) >= 2, "budget allows several attempts");
}

#[test]
fn retry_listener_fires_between_attempts() {
    let retry: RetryPolicy<u32, TestError> =
        RetryPolicy::builder().max_attempts(3).unwrap().build();
    let builder = PolicyStack::builder().retry(retry).unwrap().with_sleeper(InstantSleeper);

    let retries = Arc::new(AtomicU32::new(0));
    let counter = retries.clone();
    builder.listeners().on_retry(move |_, failure, attempts| {
        assert!(failure.is_some());
        counter.fetch_add(attempts, Ordering::SeqCst);
    });

    let stack = builder.build();
    let _ = stack.execute(|| Err::<u32, _>(TestError("always")));

    // Fired after attempts 1 and 2; never after the terminal third.
    assert_eq!(retries.load(Ordering::SeqCst), 1 + 2);
}
