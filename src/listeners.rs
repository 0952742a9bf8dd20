//! Event callbacks observing an execution.
//!
//! Five categories: `complete`, `success`, `failure`, `failed_attempt`, and
//! `retry`. Each has an inline variant, run on the thread that produced the
//! event, and a scheduled variant dispatched through the execution's
//! scheduler. Per execution the terminal categories fire exactly once:
//! one `complete`, and `success` or `failure` but never both.

use crate::{ExecutionError, Scheduler};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type OutcomeFn<T, E> = Arc<dyn Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync>;
type ValueFn<T> = Arc<dyn Fn(&T) + Send + Sync>;
type AttemptFn<T, E> = Arc<dyn Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    Inline,
    Scheduled,
}

struct Registered<T, E> {
    complete: Vec<(OutcomeFn<T, E>, Dispatch)>,
    success: Vec<(ValueFn<T>, Dispatch)>,
    failure: Vec<(OutcomeFn<T, E>, Dispatch)>,
    failed_attempt: Vec<(AttemptFn<T, E>, Dispatch)>,
    retry: Vec<(AttemptFn<T, E>, Dispatch)>,
}

impl<T, E> Registered<T, E> {
    fn empty() -> Self {
        Self {
            complete: Vec::new(),
            success: Vec::new(),
            failure: Vec::new(),
            failed_attempt: Vec::new(),
            retry: Vec::new(),
        }
    }
}

impl<T, E> Clone for Registered<T, E> {
    fn clone(&self) -> Self {
        Self {
            complete: self.complete.clone(),
            success: self.success.clone(),
            failure: self.failure.clone(),
            failed_attempt: self.failed_attempt.clone(),
            retry: self.retry.clone(),
        }
    }
}

/// Registry of execution event callbacks.
pub struct Listeners<T, E> {
    inner: Mutex<Registered<T, E>>,
}

impl<T, E> Default for Listeners<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> std::fmt::Debug for Listeners<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock().unwrap();
        f.debug_struct("Listeners")
            .field("complete", &inner.complete.len())
            .field("success", &inner.success.len())
            .field("failure", &inner.failure.len())
            .field("failed_attempt", &inner.failed_attempt.len())
            .field("retry", &inner.retry.len())
            .finish()
    }
}

impl<T, E> Listeners<T, E> {
    pub fn new() -> Self {
        Self { inner: Mutex::new(Registered::empty()) }
    }

    /// Independent copy of the current registrations; used to give each
    /// asynchronous execution its own registry seeded from the stack's.
    pub(crate) fn snapshot(&self) -> Self {
        Self { inner: Mutex::new(self.inner.lock().unwrap().clone()) }
    }

    /// Called once per execution with the terminal value or failure.
    pub fn on_complete<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        self.push_complete(Arc::new(f), Dispatch::Inline);
    }

    /// Scheduler-dispatched variant of [`on_complete`](Self::on_complete).
    pub fn on_complete_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        self.push_complete(Arc::new(f), Dispatch::Scheduled);
    }

    /// Called once when the execution terminates successfully.
    pub fn on_success<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.push_success(Arc::new(f), Dispatch::Inline);
    }

    /// Scheduler-dispatched variant of [`on_success`](Self::on_success).
    pub fn on_success_async<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.push_success(Arc::new(f), Dispatch::Scheduled);
    }

    /// Called once when the execution terminates classified as a failure.
    pub fn on_failure<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        self.push_failure(Arc::new(f), Dispatch::Inline);
    }

    /// Scheduler-dispatched variant of [`on_failure`](Self::on_failure).
    pub fn on_failure_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        self.push_failure(Arc::new(f), Dispatch::Scheduled);
    }

    /// Called after every attempt classified unsuccessful, including the one
    /// that terminates the execution. Receives the attempt counter.
    pub fn on_failed_attempt<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.push_failed_attempt(Arc::new(f), Dispatch::Inline);
    }

    /// Scheduler-dispatched variant of [`on_failed_attempt`](Self::on_failed_attempt).
    pub fn on_failed_attempt_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.push_failed_attempt(Arc::new(f), Dispatch::Scheduled);
    }

    /// Called after the inter-attempt wait, before the next attempt runs.
    pub fn on_retry<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.push_retry(Arc::new(f), Dispatch::Inline);
    }

    /// Scheduler-dispatched variant of [`on_retry`](Self::on_retry).
    pub fn on_retry_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.push_retry(Arc::new(f), Dispatch::Scheduled);
    }

    pub(crate) fn push_complete(&self, f: OutcomeFn<T, E>, dispatch: Dispatch) {
        self.inner.lock().unwrap().complete.push((f, dispatch));
    }

    pub(crate) fn push_success(&self, f: ValueFn<T>, dispatch: Dispatch) {
        self.inner.lock().unwrap().success.push((f, dispatch));
    }

    pub(crate) fn push_failure(&self, f: OutcomeFn<T, E>, dispatch: Dispatch) {
        self.inner.lock().unwrap().failure.push((f, dispatch));
    }

    pub(crate) fn push_failed_attempt(&self, f: AttemptFn<T, E>, dispatch: Dispatch) {
        self.inner.lock().unwrap().failed_attempt.push((f, dispatch));
    }

    pub(crate) fn push_retry(&self, f: AttemptFn<T, E>, dispatch: Dispatch) {
        self.inner.lock().unwrap().retry.push((f, dispatch));
    }
}

impl<T, E> Listeners<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub(crate) fn notify_failed_attempt(
        &self,
        result: Option<&T>,
        failure: Option<&ExecutionError<E>>,
        attempts: u32,
        scheduler: Option<&Arc<dyn Scheduler>>,
    ) {
        let entries = self.inner.lock().unwrap().failed_attempt.clone();
        for (f, dispatch) in entries {
            invoke_attempt(f, dispatch, result, failure, attempts, scheduler);
        }
    }

    pub(crate) fn notify_retry(
        &self,
        result: Option<&T>,
        failure: Option<&ExecutionError<E>>,
        attempts: u32,
        scheduler: Option<&Arc<dyn Scheduler>>,
    ) {
        let entries = self.inner.lock().unwrap().retry.clone();
        for (f, dispatch) in entries {
            invoke_attempt(f, dispatch, result, failure, attempts, scheduler);
        }
    }

    /// Fire `success` or `failure`, then `complete`. Callers guarantee this
    /// runs at most once per execution.
    pub(crate) fn notify_terminal(
        &self,
        result: Option<&T>,
        failure: Option<&ExecutionError<E>>,
        success: bool,
        scheduler: Option<&Arc<dyn Scheduler>>,
    ) {
        let (successes, failures, completes) = {
            let inner = self.inner.lock().unwrap();
            (inner.success.clone(), inner.failure.clone(), inner.complete.clone())
        };

        if success {
            if let Some(value) = result {
                for (f, dispatch) in successes {
                    invoke_value(f, dispatch, value, scheduler);
                }
            }
        } else {
            for (f, dispatch) in failures {
                invoke_outcome(f, dispatch, result, failure, scheduler);
            }
        }
        for (f, dispatch) in completes {
            invoke_outcome(f, dispatch, result, failure, scheduler);
        }
    }
}

fn invoke_outcome<T, E>(
    f: OutcomeFn<T, E>,
    dispatch: Dispatch,
    result: Option<&T>,
    failure: Option<&ExecutionError<E>>,
    scheduler: Option<&Arc<dyn Scheduler>>,
) where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    match (dispatch, scheduler) {
        (Dispatch::Scheduled, Some(scheduler)) => {
            let result = result.cloned();
            let failure = failure.cloned();
            scheduler.schedule(
                Duration::ZERO,
                Box::new(move || f(result.as_ref(), failure.as_ref())),
            );
        }
        _ => f(result, failure),
    }
}

fn invoke_value<T>(
    f: ValueFn<T>,
    dispatch: Dispatch,
    value: &T,
    scheduler: Option<&Arc<dyn Scheduler>>,
) where
    T: Clone + Send + Sync + 'static,
{
    match (dispatch, scheduler) {
        (Dispatch::Scheduled, Some(scheduler)) => {
            let value = value.clone();
            scheduler.schedule(Duration::ZERO, Box::new(move || f(&value)));
        }
        _ => f(value),
    }
}

fn invoke_attempt<T, E>(
    f: AttemptFn<T, E>,
    dispatch: Dispatch,
    result: Option<&T>,
    failure: Option<&ExecutionError<E>>,
    attempts: u32,
    scheduler: Option<&Arc<dyn Scheduler>>,
) where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    match (dispatch, scheduler) {
        (Dispatch::Scheduled, Some(scheduler)) => {
            let result = result.cloned();
            let failure = failure.cloned();
            scheduler.schedule(
                Duration::ZERO,
                Box::new(move || f(result.as_ref(), failure.as_ref(), attempts)),
            );
        }
        _ => f(result, failure, attempts),
    }
}
