//! Fallback policy: substitute a value or map the failure once the inner
//! stack gives up.

use crate::{ExecutionContext, ExecutionError, Outcome, PolicyExecutor};
use std::sync::Arc;

type FallbackFn<T, E> = Arc<
    dyn Fn(Option<&T>, Option<&ExecutionError<E>>, &ExecutionContext<T, E>) -> Result<T, E>
        + Send
        + Sync,
>;

/// Computes an alternative result from a terminal failure outcome.
///
/// Only terminal failures reach the fallback; non-terminal outcomes (a retry
/// in progress beneath it) and successes pass through untouched. A fallback
/// that itself fails replaces the inner failure with its own.
#[derive(Clone)]
pub struct Fallback<T, E> {
    func: FallbackFn<T, E>,
    run_async: bool,
}

impl<T, E> std::fmt::Debug for Fallback<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fallback").field("run_async", &self.run_async).finish()
    }
}

impl<T, E> Fallback<T, E> {
    /// Fallback computed from the failing outcome and the execution context.
    pub fn of<F>(func: F) -> Self
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, &ExecutionContext<T, E>) -> Result<T, E>
            + Send
            + Sync
            + 'static,
    {
        Self { func: Arc::new(func), run_async: false }
    }

    /// Fallback to a fixed value.
    pub fn value(value: T) -> Self
    where
        T: Clone + Send + Sync + 'static,
    {
        Self::of(move |_, _, _| Ok(value.clone()))
    }

    /// Run the fallback as a scheduled task in asynchronous executions, even
    /// when the stages beneath it ran inline.
    pub fn asynchronous(mut self) -> Self {
        self.run_async = true;
        self
    }
}

impl<T, E> PolicyExecutor<T, E> for Fallback<T, E> {
    fn on_outcome(&self, ctx: &ExecutionContext<T, E>, outcome: Outcome<T, E>) -> Outcome<T, E> {
        if !outcome.is_complete() || outcome.is_success() {
            return outcome;
        }
        match (self.func)(outcome.result(), outcome.failure(), ctx) {
            Ok(value) => outcome.with_result(value),
            Err(e) => Outcome::failure(ExecutionError::Operation(e)),
        }
    }

    fn dispatch_async(&self, outcome: &Outcome<T, E>) -> bool {
        // Only terminal failures are acted on; everything else passes through
        // inline even for an asynchronous fallback.
        self.run_async && outcome.is_complete() && !outcome.is_success()
    }
}
