//! Retry policy: classification, attempt budgets, and delay computation.
//!
//! Classification order per attempt: abort classifiers first (an abort always
//! terminates, even when a retry classifier also matches), then retry
//! classifiers gated on the attempt and duration budgets, then accept. With no
//! classifiers configured the defaults apply: any operation failure retries,
//! any returned value is accepted.
//!
//! There is no per-attempt timeout here; `max_duration` bounds the whole
//! execution. Callers wanting to bound a single attempt wrap the operation.

use crate::{
    Backoff, ConfigError, ExecutionContext, ExecutionError, Jitter, Outcome, PolicyExecutor,
};
use std::sync::Arc;
use std::time::Duration;

type Classifier<T, E> = Arc<dyn Fn(Option<&T>, Option<&ExecutionError<E>>) -> bool + Send + Sync>;

/// Immutable retry configuration, built by [`RetryPolicyBuilder`].
#[derive(Clone)]
pub struct RetryPolicy<T, E> {
    max_attempts: Option<u32>,
    max_duration: Option<Duration>,
    backoff: Backoff,
    jitter: Jitter,
    retry_classifiers: Vec<Classifier<T, E>>,
    abort_classifiers: Vec<Classifier<T, E>>,
    narrows_failures: bool,
}

impl<T, E> std::fmt::Debug for RetryPolicy<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("max_duration", &self.max_duration)
            .field("backoff", &self.backoff)
            .field("jitter", &self.jitter)
            .field("retry_classifiers", &self.retry_classifiers.len())
            .field("abort_classifiers", &self.abort_classifiers.len())
            .finish()
    }
}

impl<T, E> RetryPolicy<T, E> {
    pub fn builder() -> RetryPolicyBuilder<T, E> {
        RetryPolicyBuilder::new()
    }

    fn retry_matches(&self, result: Option<&T>, failure: Option<&ExecutionError<E>>) -> bool {
        if self.retry_classifiers.iter().any(|c| c(result, failure)) {
            return true;
        }
        // Operation failures retry by default unless retry_on narrowed the set.
        // Engine-raised failures (circuit open, cancellation) never retry by
        // default.
        !self.narrows_failures && matches!(failure, Some(ExecutionError::Operation(_)))
    }

    fn abort_matches(&self, result: Option<&T>, failure: Option<&ExecutionError<E>>) -> bool {
        self.abort_classifiers.iter().any(|c| c(result, failure))
    }

    fn within_attempt_budget(&self, ctx: &ExecutionContext<T, E>) -> bool {
        self.max_attempts.is_none_or(|max| ctx.attempts() < max)
    }

    /// Delay before the next attempt, or `None` when the duration budget is
    /// already spent. Clamps the delay to the remaining budget.
    fn next_delay(&self, ctx: &ExecutionContext<T, E>) -> Option<Duration> {
        let base = self.backoff.delay_for(ctx.attempts());
        let jittered = self.jitter.apply(base);
        match self.max_duration {
            None => Some(jittered),
            Some(limit) => {
                let remaining = limit.checked_sub(ctx.elapsed())?;
                if remaining.is_zero() {
                    None
                } else {
                    Some(jittered.min(remaining))
                }
            }
        }
    }
}

impl<T, E> PolicyExecutor<T, E> for RetryPolicy<T, E>
where
    T: Send + Sync,
    E: Send + Sync,
{
    fn on_outcome(&self, ctx: &ExecutionContext<T, E>, outcome: Outcome<T, E>) -> Outcome<T, E> {
        let has_failure = outcome.failure().is_some();
        let retry_matched = self.retry_matches(outcome.result(), outcome.failure());
        let abort_matched = self.abort_matches(outcome.result(), outcome.failure());
        let verdict = !has_failure && !retry_matched;

        if abort_matched {
            return outcome.terminal_with(verdict);
        }

        if retry_matched && self.within_attempt_budget(ctx) {
            if let Some(wait) = self.next_delay(ctx) {
                tracing::debug!(
                    attempt = ctx.attempts(),
                    wait_ms = wait.as_millis() as u64,
                    "retry scheduled"
                );
                return outcome.retry_after(wait);
            }
        }

        outcome.terminal_with(verdict)
    }
}

/// Builder for [`RetryPolicy`]; validates eagerly.
pub struct RetryPolicyBuilder<T, E> {
    max_attempts: Option<u32>,
    max_duration: Option<Duration>,
    backoff: Backoff,
    jitter: Jitter,
    retry_classifiers: Vec<Classifier<T, E>>,
    abort_classifiers: Vec<Classifier<T, E>>,
    narrows_failures: bool,
}

impl<T, E> RetryPolicyBuilder<T, E> {
    pub fn new() -> Self {
        Self {
            max_attempts: Some(3),
            max_duration: None,
            backoff: Backoff::fixed(Duration::ZERO),
            jitter: Jitter::None,
            retry_classifiers: Vec::new(),
            abort_classifiers: Vec::new(),
            narrows_failures: false,
        }
    }

    /// Cap total inner invocations. Must be at least 1.
    pub fn max_attempts(mut self, attempts: u32) -> Result<Self, ConfigError> {
        if attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        self.max_attempts = Some(attempts);
        Ok(self)
    }

    /// Remove the attempt cap entirely.
    pub fn unbounded_attempts(mut self) -> Self {
        self.max_attempts = None;
        self
    }

    /// Cap total wall-clock time from the first attempt. The last delay is
    /// clamped to whatever budget remains.
    pub fn max_duration(mut self, duration: Duration) -> Self {
        self.max_duration = Some(duration);
        self
    }

    pub fn backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn jitter(mut self, jitter: Jitter) -> Self {
        self.jitter = jitter;
        self
    }

    /// Retry when the operation failure matches `predicate`. Configuring this
    /// narrows the default rule: failures no longer retry unconditionally.
    pub fn retry_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.narrows_failures = true;
        self.retry_classifiers.push(Arc::new(move |_, failure| {
            matches!(failure, Some(ExecutionError::Operation(e)) if predicate(e))
        }));
        self
    }

    /// Retry when `predicate` matches the attempt's result or failure.
    pub fn retry_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) -> bool + Send + Sync + 'static,
    {
        self.retry_classifiers.push(Arc::new(predicate));
        self
    }

    /// Retry when the attempt returned exactly `value`.
    pub fn retry_when(mut self, value: T) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
    {
        self.retry_classifiers
            .push(Arc::new(move |result, _| result.is_some_and(|r| *r == value)));
        self
    }

    /// Stop retrying when the operation failure matches `predicate`,
    /// propagating the current outcome.
    pub fn abort_on<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&E) -> bool + Send + Sync + 'static,
    {
        self.abort_classifiers.push(Arc::new(move |_, failure| {
            matches!(failure, Some(ExecutionError::Operation(e)) if predicate(e))
        }));
        self
    }

    /// Stop retrying when `predicate` matches the attempt's result or failure.
    pub fn abort_if<F>(mut self, predicate: F) -> Self
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) -> bool + Send + Sync + 'static,
    {
        self.abort_classifiers.push(Arc::new(predicate));
        self
    }

    /// Stop retrying when the attempt returned exactly `value`.
    pub fn abort_when(mut self, value: T) -> Self
    where
        T: PartialEq + Send + Sync + 'static,
    {
        self.abort_classifiers
            .push(Arc::new(move |result, _| result.is_some_and(|r| *r == value)));
        self
    }

    pub fn build(self) -> RetryPolicy<T, E> {
        RetryPolicy {
            max_attempts: self.max_attempts,
            max_duration: self.max_duration,
            backoff: self.backoff,
            jitter: self.jitter,
            retry_classifiers: self.retry_classifiers,
            abort_classifiers: self.abort_classifiers,
            narrows_failures: self.narrows_failures,
        }
    }
}

impl<T, E> Default for RetryPolicyBuilder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}
