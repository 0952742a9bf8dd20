//! Convenient re-exports for common holdfast types.
pub use crate::{
    backoff::{Backoff, MAX_BACKOFF},
    circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerBuilder},
    clock::{Clock, MonotonicClock},
    context::{Cancellation, ExecutionContext},
    error::{ConfigError, ExecutionError},
    fallback::Fallback,
    future::ExecutionHandle,
    jitter::Jitter,
    listeners::Listeners,
    outcome::Outcome,
    policy::{Admission, PolicyExecutor},
    retry::{RetryPolicy, RetryPolicyBuilder},
    scheduler::{ImmediateScheduler, ScheduleHandle, Scheduler, ThreadScheduler, TokioScheduler},
    sleeper::{BlockingSleeper, InstantSleeper, Sleeper, TrackingSleeper, WaitOutcome},
    stack::{PolicyStack, PolicyStackBuilder},
};
