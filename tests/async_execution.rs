use holdfast::{
    Backoff, Fallback, ImmediateScheduler, Jitter, PolicyStack, RetryPolicy, Scheduler,
    ThreadScheduler, TokioScheduler,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, PartialEq, Eq)]
struct TestError(&'static str);

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TestError: {}", self.0)
    }
}

impl std::error::Error for TestError {}

fn thread_scheduler() -> Arc<dyn Scheduler> {
    Arc::new(ThreadScheduler)
}

#[test]
fn handle_resolves_with_the_operation_result() {
    let stack: PolicyStack<u32, TestError> = PolicyStack::builder().build();
    let handle = stack.execute_async(thread_scheduler(), || Ok(21));
    assert_eq!(handle.get().unwrap(), 21);
    assert!(handle.is_done());
}

#[test]
fn get_timeout_fails_without_terminating_the_execution() {
    let stack: PolicyStack<u32, TestError> = PolicyStack::builder().build();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let handle = stack.execute_async(thread_scheduler(), move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(400));
        Ok(5)
    });

    let err = handle.get_timeout(Duration::from_millis(50)).unwrap_err();
    assert!(err.is_get_timeout());

    // The operation keeps running and eventually completes.
    assert_eq!(handle.get().unwrap(), 5);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn cancel_stops_future_attempts_and_publishes_cancellation() {
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .unbounded_attempts()
        .backoff(Backoff::fixed(Duration::from_millis(50)))
        .build();
    let stack = PolicyStack::builder().retry(retry).unwrap().build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let handle = stack.execute_async(thread_scheduler(), move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Err::<u32, _>(TestError("always"))
    });

    // Let a couple of attempts happen, then cancel.
    thread::sleep(Duration::from_millis(120));
    assert!(handle.cancel());
    assert!(handle.get().unwrap_err().is_cancelled());

    let at_cancel = calls.load(Ordering::SeqCst);
    thread::sleep(Duration::from_millis(300));
    let after = calls.load(Ordering::SeqCst);
    assert!(
        after <= at_cancel + 1,
        "at most the already-running attempt may finish (cancel at {}, saw {})",
        at_cancel,
        after
    );
}

#[test]
fn terminal_outcome_is_exactly_once() {
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .max_attempts(4)
        .unwrap()
        .backoff(Backoff::fixed(Duration::from_millis(10)))
        .build();
    let builder = PolicyStack::builder().retry(retry).unwrap();

    let completes = Arc::new(AtomicUsize::new(0));
    let successes = Arc::new(AtomicUsize::new(0));
    let failures = Arc::new(AtomicUsize::new(0));

    let counter = completes.clone();
    builder.listeners().on_complete(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = successes.clone();
    builder.listeners().on_success(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = failures.clone();
    builder.listeners().on_failure(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let stack = builder.build();
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let handle = stack.execute_async(thread_scheduler(), move || {
        if calls_clone.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(TestError("not yet"))
        } else {
            Ok(3)
        }
    });

    assert_eq!(handle.get().unwrap(), 3);

    // The outcome is published to the handle before listeners dispatch; give
    // them a moment to run on the worker thread.
    let deadline = Instant::now() + Duration::from_secs(2);
    while completes.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(5));
    }

    assert_eq!(completes.load(Ordering::SeqCst), 1);
    assert_eq!(successes.load(Ordering::SeqCst), 1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);
}

#[test]
fn retry_delays_are_scheduled_not_slept() {
    let scheduler = ImmediateScheduler::new();
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
    let stack = PolicyStack::builder().retry(retry).unwrap().build();

    let handle =
        stack.execute_async(Arc::new(scheduler.clone()), || Err::<u32, _>(TestError("always")));
    assert!(handle.get().is_err());

    assert_eq!(
        scheduler.delays(),
        vec![
            Duration::ZERO,
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
fn launch_returns_before_the_execution_finishes() {
    let stack: PolicyStack<u32, TestError> = PolicyStack::builder().build();
    let started = Instant::now();
    let handle = stack.execute_async(thread_scheduler(), || {
        thread::sleep(Duration::from_millis(200));
        Ok(1)
    });
    assert!(started.elapsed() < Duration::from_millis(100), "launch must not block");
    assert_eq!(handle.get().unwrap(), 1);
}

#[test]
fn late_listeners_fire_immediately_after_completion() {
    let stack: PolicyStack<u32, TestError> = PolicyStack::builder().build();
    let handle = stack.execute_async(thread_scheduler(), || Ok(2));
    assert_eq!(handle.get().unwrap(), 2);

    let fired = Arc::new(AtomicUsize::new(0));
    let counter = fired.clone();
    handle.on_success(move |value| {
        assert_eq!(*value, 2);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let counter = fired.clone();
    handle.on_complete(move |result, _| {
        assert_eq!(result, Some(&2));
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(fired.load(Ordering::SeqCst), 2);
}

#[test]
fn async_listener_variants_dispatch_through_the_scheduler() {
    let scheduler = ImmediateScheduler::new();
    let stack: PolicyStack<u32, TestError> = PolicyStack::builder().build();

    let fired = Arc::new(AtomicUsize::new(0));
    let handle = stack.execute_async(Arc::new(scheduler.clone()), || Ok(6));
    assert_eq!(handle.get().unwrap(), 6);

    let counter = fired.clone();
    handle.on_success_async(move |value| {
        assert_eq!(*value, 6);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    assert_eq!(fired.load(Ordering::SeqCst), 1);
    // Initial attempt task plus the late listener dispatch.
    assert_eq!(scheduler.delays(), vec![Duration::ZERO, Duration::ZERO]);
}

#[test]
fn async_fallback_runs_via_the_scheduler_after_sync_stages() {
    let scheduler = ImmediateScheduler::new();
    let retry: RetryPolicy<u32, TestError> =
        RetryPolicy::builder().max_attempts(2).unwrap().build();
    let stack = PolicyStack::builder()
        .fallback(Fallback::value(77).asynchronous())
        .unwrap()
        .retry(retry)
        .unwrap()
        .build();

    let handle =
        stack.execute_async(Arc::new(scheduler.clone()), || Err::<u32, _>(TestError("down")));
    assert_eq!(handle.get().unwrap(), 77);

    // Two attempt tasks (zero delay retry backoff) plus one zero-delay task
    // for the fallback unwind.
    assert_eq!(scheduler.delays().len(), 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn tokio_scheduler_drives_executions() {
    let retry: RetryPolicy<u32, TestError> = RetryPolicy::builder()
        .max_attempts(3)
        .unwrap()
        .backoff(Backoff::fixed(Duration::from_millis(5)))
        .build();
    let stack = PolicyStack::builder().retry(retry).unwrap().build();

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let handle = stack.execute_async(Arc::new(TokioScheduler::current()), move || {
        if calls_clone.fetch_add(1, Ordering::SeqCst) < 1 {
            Err(TestError("once"))
        } else {
            Ok(10)
        }
    });

    let value = tokio::task::spawn_blocking(move || handle.get())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(value, 10);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}
