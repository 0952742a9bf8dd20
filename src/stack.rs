//! Policy composition and the synchronous runner.
//!
//! Policies are declared in order: the first declared is the outermost, the
//! user operation is the innermost. Per attempt the runner consults every
//! policy's admission outermost-first, invokes the operation, then threads the
//! outcome back innermost-first. Non-terminal outcomes are honored by waiting
//! on the caller's thread (synchronous) or by scheduling a new task
//! (asynchronous); the policy logic is identical in both modes.
//!
//! Example:
//! ```rust
//! use holdfast::{Backoff, PolicyStack, RetryPolicy};
//! use std::time::Duration;
//!
//! #[derive(Debug, Clone)]
//! struct Unreachable;
//!
//! let retry = RetryPolicy::builder()
//!     .max_attempts(3).expect("max_attempts > 0")
//!     .backoff(Backoff::exponential(Duration::from_millis(1)))
//!     .build();
//!
//! let stack: PolicyStack<u32, Unreachable> = PolicyStack::builder()
//!     .retry(retry).expect("first retry policy")
//!     .build();
//!
//! let mut calls = 0;
//! let result = stack.execute(|| {
//!     calls += 1;
//!     if calls < 3 { Err(Unreachable) } else { Ok(calls) }
//! });
//! assert_eq!(result.unwrap(), 3);
//! ```

use crate::async_exec::AsyncExecution;
use crate::{
    Admission, BlockingSleeper, Cancellation, CircuitBreaker, ConfigError, ExecutionContext,
    ExecutionError, ExecutionHandle, Fallback, Listeners, Outcome, PolicyExecutor, RetryPolicy,
    Scheduler, Sleeper, WaitOutcome,
};
use std::sync::Arc;

/// A composed stack of policies around one operation shape.
pub struct PolicyStack<T, E> {
    policies: Arc<Vec<Box<dyn PolicyExecutor<T, E>>>>,
    listeners: Arc<Listeners<T, E>>,
    sleeper: Arc<dyn Sleeper>,
}

impl<T, E> Clone for PolicyStack<T, E> {
    fn clone(&self) -> Self {
        Self {
            policies: self.policies.clone(),
            listeners: self.listeners.clone(),
            sleeper: self.sleeper.clone(),
        }
    }
}

impl<T, E> std::fmt::Debug for PolicyStack<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyStack")
            .field("policies", &self.policies.len())
            .field("sleeper", &self.sleeper)
            .finish()
    }
}

impl<T, E> PolicyStack<T, E> {
    pub fn builder() -> PolicyStackBuilder<T, E> {
        PolicyStackBuilder::new()
    }
}

impl<T, E> PolicyStack<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Run `operation` on the caller's thread until a terminal outcome.
    pub fn execute<F>(&self, mut operation: F) -> Result<T, ExecutionError<E>>
    where
        F: FnMut() -> Result<T, E>,
    {
        self.run_sync(move |_| operation(), Cancellation::new())
    }

    /// Like [`execute`](Self::execute), with the execution context visible to
    /// the operation.
    pub fn execute_with_context<F>(&self, operation: F) -> Result<T, ExecutionError<E>>
    where
        F: FnMut(&ExecutionContext<T, E>) -> Result<T, E>,
    {
        self.run_sync(operation, Cancellation::new())
    }

    /// Like [`execute`](Self::execute), interruptible through a caller-held
    /// token. Cancelling from another thread wakes an in-progress wait, which
    /// surfaces as [`ExecutionError::Interrupted`]; a running attempt finishes
    /// first.
    pub fn execute_cancellable<F>(
        &self,
        cancellation: Cancellation,
        operation: F,
    ) -> Result<T, ExecutionError<E>>
    where
        F: FnMut(&ExecutionContext<T, E>) -> Result<T, E>,
    {
        self.run_sync(operation, cancellation)
    }

    /// Run `operation` as a chain of scheduled tasks, returning immediately.
    pub fn execute_async<F>(
        &self,
        scheduler: Arc<dyn Scheduler>,
        mut operation: F,
    ) -> ExecutionHandle<T, E>
    where
        F: FnMut() -> Result<T, E> + Send + 'static,
    {
        self.execute_async_with_context(scheduler, move |_| operation())
    }

    /// Like [`execute_async`](Self::execute_async), with the execution context
    /// visible to the operation.
    pub fn execute_async_with_context<F>(
        &self,
        scheduler: Arc<dyn Scheduler>,
        operation: F,
    ) -> ExecutionHandle<T, E>
    where
        F: FnMut(&ExecutionContext<T, E>) -> Result<T, E> + Send + 'static,
    {
        AsyncExecution::launch(
            self.policies.clone(),
            Box::new(operation),
            self.listeners.snapshot(),
            scheduler,
        )
    }

    fn run_sync<F>(
        &self,
        mut operation: F,
        cancellation: Cancellation,
    ) -> Result<T, ExecutionError<E>>
    where
        F: FnMut(&ExecutionContext<T, E>) -> Result<T, E>,
    {
        let mut ctx = ExecutionContext::new(cancellation);

        loop {
            if ctx.is_cancelled() {
                return self.finish_sync(&ctx, Outcome::failure(ExecutionError::Interrupted));
            }

            let mut rejection = None;
            for (index, policy) in self.policies.iter().enumerate() {
                if let Admission::Reject(failure) = policy.before_attempt(&ctx) {
                    rejection = Some((index, failure));
                    break;
                }
            }

            let (mut outcome, mut index, attempted) = match rejection {
                Some((index, failure)) => (Outcome::failure(failure), index as isize - 1, false),
                None => {
                    ctx.begin_attempt();
                    let result = operation(&ctx);
                    let outcome = Outcome::from_attempt(result);
                    ctx.record(outcome.result(), outcome.failure());
                    (outcome, self.policies.len() as isize - 1, true)
                }
            };

            while index >= 0 {
                outcome = self.policies[index as usize].on_outcome(&ctx, outcome);
                index -= 1;
            }

            if attempted && !outcome.is_success() {
                self.listeners.notify_failed_attempt(
                    outcome.result(),
                    outcome.failure(),
                    ctx.attempts(),
                    None,
                );
            }

            if outcome.is_complete() {
                return self.finish_sync(&ctx, outcome);
            }

            match self.sleeper.sleep(outcome.wait(), ctx.cancellation()) {
                WaitOutcome::Elapsed => {
                    self.listeners.notify_retry(
                        outcome.result(),
                        outcome.failure(),
                        ctx.attempts(),
                        None,
                    );
                }
                WaitOutcome::Interrupted => {
                    return self.finish_sync(&ctx, Outcome::failure(ExecutionError::Interrupted));
                }
            }
        }
    }

    fn finish_sync(
        &self,
        _ctx: &ExecutionContext<T, E>,
        outcome: Outcome<T, E>,
    ) -> Result<T, ExecutionError<E>> {
        self.listeners.notify_terminal(
            outcome.result(),
            outcome.failure(),
            outcome.is_success(),
            None,
        );
        outcome.into_result()
    }
}

/// Builder for [`PolicyStack`]. Policies compose in declaration order,
/// outermost first; each kind may be configured at most once.
pub struct PolicyStackBuilder<T, E> {
    policies: Vec<Box<dyn PolicyExecutor<T, E>>>,
    has_retry: bool,
    has_breaker: bool,
    has_fallback: bool,
    listeners: Listeners<T, E>,
    sleeper: Arc<dyn Sleeper>,
}

impl<T, E> PolicyStackBuilder<T, E> {
    pub fn new() -> Self {
        Self {
            policies: Vec::new(),
            has_retry: false,
            has_breaker: false,
            has_fallback: false,
            listeners: Listeners::new(),
            sleeper: Arc::new(BlockingSleeper),
        }
    }

    /// Event listeners shared by every execution of the built stack.
    pub fn listeners(&self) -> &Listeners<T, E> {
        &self.listeners
    }

    /// Override how the synchronous runner waits between attempts.
    pub fn with_sleeper<S: Sleeper + 'static>(mut self, sleeper: S) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    pub fn build(self) -> PolicyStack<T, E> {
        PolicyStack {
            policies: Arc::new(self.policies),
            listeners: Arc::new(self.listeners),
            sleeper: self.sleeper,
        }
    }
}

impl<T, E> PolicyStackBuilder<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Add a fallback. At most one per stack.
    pub fn fallback(mut self, fallback: Fallback<T, E>) -> Result<Self, ConfigError> {
        if self.has_fallback {
            return Err(ConfigError::FallbackAlreadyConfigured);
        }
        self.has_fallback = true;
        self.policies.push(Box::new(fallback));
        Ok(self)
    }

    /// Add a retry policy. At most one per stack.
    pub fn retry(mut self, retry: RetryPolicy<T, E>) -> Result<Self, ConfigError> {
        if self.has_retry {
            return Err(ConfigError::RetryAlreadyConfigured);
        }
        self.has_retry = true;
        self.policies.push(Box::new(retry));
        Ok(self)
    }

    /// Add a circuit breaker. At most one per stack; the breaker handle may be
    /// shared with other stacks and with direct state inspection.
    pub fn circuit_breaker(mut self, breaker: CircuitBreaker<T, E>) -> Result<Self, ConfigError> {
        if self.has_breaker {
            return Err(ConfigError::CircuitBreakerAlreadyConfigured);
        }
        self.has_breaker = true;
        self.policies.push(Box::new(breaker));
        Ok(self)
    }

    /// Add a custom policy under the same composition contract.
    pub fn wrap<P: PolicyExecutor<T, E> + 'static>(mut self, policy: P) -> Self {
        self.policies.push(Box::new(policy));
        self
    }
}

impl<T, E> Default for PolicyStackBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}
