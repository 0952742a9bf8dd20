#![forbid(unsafe_code)]
#![deny(warnings)]
#![cfg_attr(not(test), deny(clippy::all))]

//! # holdfast
//!
//! A policy-driven resilience execution engine: wrap an operation in retry,
//! circuit-breaking, and fallback policies, and run it either on the caller's
//! thread or as a chain of scheduled tasks.
//!
//! ## Features
//!
//! - **Retry policies** with attempt and duration budgets, fixed /
//!   exponential / random backoff, jitter, and retry/abort classifiers
//! - **Circuit breakers** with n-of-m windowed thresholds and half-open
//!   probing
//! - **Fallbacks** substituting a value or mapping the failure once the inner
//!   stack gives up
//! - **One composition model** for both execution modes: policies never drive
//!   each other, the runner does
//! - **Asynchronous executions** over any [`Scheduler`], with a blocking
//!   future-like [`ExecutionHandle`] and per-execution listeners
//!
//! ## Quick start
//!
//! ```rust
//! use holdfast::{Backoff, Jitter, PolicyStack, RetryPolicy};
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone)]
//! struct FlakyError;
//!
//! let retry = RetryPolicy::builder()
//!     .max_attempts(3).expect("max_attempts > 0")
//!     .backoff(Backoff::exponential(Duration::from_millis(20)))
//!     .jitter(Jitter::relative(0.2).expect("factor in [0, 1]"))
//!     .build();
//!
//! let stack: PolicyStack<u32, FlakyError> = PolicyStack::builder()
//!     .retry(retry).expect("first retry policy")
//!     .build();
//!
//! let mut attempts = 0;
//! let value = stack
//!     .execute(|| {
//!         attempts += 1;
//!         if attempts < 2 { Err(FlakyError) } else { Ok(attempts) }
//!     })
//!     .expect("succeeds on the second attempt");
//! assert_eq!(value, 2);
//! ```

mod async_exec;
pub mod backoff;
pub mod circuit_breaker;
pub mod clock;
pub mod context;
pub mod error;
pub mod fallback;
pub mod future;
pub mod jitter;
pub mod listeners;
pub mod outcome;
pub mod policy;
pub mod prelude;
pub mod retry;
pub mod scheduler;
pub mod sleeper;
pub mod stack;

// Re-exports
pub use backoff::{Backoff, MAX_BACKOFF};
pub use circuit_breaker::{BreakerState, CircuitBreaker, CircuitBreakerBuilder, MAX_WINDOW};
pub use clock::{Clock, MonotonicClock};
pub use context::{Cancellation, ExecutionContext};
pub use error::{ConfigError, ExecutionError};
pub use fallback::Fallback;
pub use future::ExecutionHandle;
pub use jitter::Jitter;
pub use listeners::Listeners;
pub use outcome::Outcome;
pub use policy::{Admission, PolicyExecutor};
pub use retry::{RetryPolicy, RetryPolicyBuilder};
pub use scheduler::{
    ImmediateScheduler, ScheduleHandle, Scheduler, ThreadScheduler, TokioScheduler,
};
pub use sleeper::{BlockingSleeper, InstantSleeper, Sleeper, TrackingSleeper, WaitOutcome};
pub use stack::{PolicyStack, PolicyStackBuilder};
