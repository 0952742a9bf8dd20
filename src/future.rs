//! The handle returned by asynchronous executions.
//!
//! The terminal outcome is published to the handle before any listener runs,
//! so a blocked `get` never waits on listener callbacks. Terminal listeners
//! registered after completion fire immediately, still exactly once.

use crate::listeners::Dispatch;
use crate::{Cancellation, ExecutionError, Listeners, ScheduleHandle, Scheduler};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

struct Terminal<T, E> {
    result: Option<T>,
    failure: Option<ExecutionError<E>>,
    success: bool,
}

impl<T: Clone, E: Clone> Terminal<T, E> {
    fn to_result(&self) -> Result<T, ExecutionError<E>> {
        match (&self.result, &self.failure) {
            (_, Some(failure)) => Err(failure.clone()),
            (Some(value), None) => Ok(value.clone()),
            (None, None) => Err(ExecutionError::Cancelled),
        }
    }
}

/// Shared state between an asynchronous execution and its handle.
pub(crate) struct ExecutionCore<T, E> {
    slot: Mutex<Option<Terminal<T, E>>>,
    done: Condvar,
    cancellation: Cancellation,
    pending: Mutex<Option<Box<dyn ScheduleHandle>>>,
    listeners: Listeners<T, E>,
    scheduler: Arc<dyn Scheduler>,
}

impl<T, E> ExecutionCore<T, E> {
    pub(crate) fn new(listeners: Listeners<T, E>, scheduler: Arc<dyn Scheduler>) -> Arc<Self> {
        Arc::new(Self {
            slot: Mutex::new(None),
            done: Condvar::new(),
            cancellation: Cancellation::new(),
            pending: Mutex::new(None),
            listeners,
            scheduler,
        })
    }

    pub(crate) fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub(crate) fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// Track the currently scheduled task so `cancel` can reach it. A handle
    /// stored after cancellation is cancelled on the spot.
    pub(crate) fn set_pending(&self, handle: Box<dyn ScheduleHandle>) {
        let mut pending = self.pending.lock().unwrap();
        if self.cancellation.is_cancelled() {
            handle.cancel();
        } else {
            *pending = Some(handle);
        }
    }

    fn take_pending(&self) -> Option<Box<dyn ScheduleHandle>> {
        self.pending.lock().unwrap().take()
    }

    pub(crate) fn is_complete(&self) -> bool {
        self.slot.lock().unwrap().is_some()
    }
}

impl<T, E> ExecutionCore<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Publish the terminal outcome, then notify listeners. Returns `false`
    /// when an outcome was already published; nothing fires twice.
    pub(crate) fn complete(
        &self,
        result: Option<T>,
        failure: Option<ExecutionError<E>>,
        success: bool,
    ) -> bool {
        let notify_result = result.clone();
        let notify_failure = failure.clone();
        {
            let mut slot = self.slot.lock().unwrap();
            if slot.is_some() {
                return false;
            }
            *slot = Some(Terminal { result, failure, success });
            self.done.notify_all();
        }
        self.listeners.notify_terminal(
            notify_result.as_ref(),
            notify_failure.as_ref(),
            success,
            Some(&self.scheduler),
        );
        true
    }

    pub(crate) fn notify_failed_attempt(
        &self,
        result: Option<&T>,
        failure: Option<&ExecutionError<E>>,
        attempts: u32,
    ) {
        self.listeners.notify_failed_attempt(result, failure, attempts, Some(&self.scheduler));
    }

    pub(crate) fn notify_retry(
        &self,
        result: Option<&T>,
        failure: Option<&ExecutionError<E>>,
        attempts: u32,
    ) {
        self.listeners.notify_retry(result, failure, attempts, Some(&self.scheduler));
    }

    /// Register a terminal listener, or fire it immediately when the outcome
    /// is already published. The slot lock orders registration against
    /// publication so the listener fires exactly once either way.
    fn register_terminal(&self, register: impl FnOnce(&Listeners<T, E>), fire: impl FnOnce(&Terminal<T, E>)) {
        let slot = self.slot.lock().unwrap();
        match slot.as_ref() {
            Some(terminal) => {
                let late =
                    Terminal {
                        result: terminal.result.clone(),
                        failure: terminal.failure.clone(),
                        success: terminal.success,
                    };
                drop(slot);
                fire(&late);
            }
            None => register(&self.listeners),
        }
    }
}

/// Future-like handle to one asynchronous execution.
pub struct ExecutionHandle<T, E> {
    core: Arc<ExecutionCore<T, E>>,
}

impl<T, E> std::fmt::Debug for ExecutionHandle<T, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionHandle")
            .field("complete", &self.core.is_complete())
            .field("cancelled", &self.core.cancellation.is_cancelled())
            .finish()
    }
}

impl<T, E> ExecutionHandle<T, E> {
    pub(crate) fn new(core: Arc<ExecutionCore<T, E>>) -> Self {
        Self { core }
    }

    /// Whether a terminal outcome has been published.
    pub fn is_done(&self) -> bool {
        self.core.is_complete()
    }

    /// Whether the execution was cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.core.cancellation.is_cancelled()
    }
}

impl<T, E> ExecutionHandle<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Block until the terminal outcome is published.
    pub fn get(&self) -> Result<T, ExecutionError<E>> {
        let mut slot = self.core.slot.lock().unwrap();
        loop {
            if let Some(terminal) = slot.as_ref() {
                return terminal.to_result();
            }
            slot = self.core.done.wait(slot).unwrap();
        }
    }

    /// Block until the terminal outcome is published or `timeout` passes.
    /// Timing out does not affect the underlying execution.
    pub fn get_timeout(&self, timeout: Duration) -> Result<T, ExecutionError<E>> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.core.slot.lock().unwrap();
        loop {
            if let Some(terminal) = slot.as_ref() {
                return terminal.to_result();
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ExecutionError::GetTimeout { waited: timeout });
            }
            let (guard, _timeout) = self.core.done.wait_timeout(slot, deadline - now).unwrap();
            slot = guard;
        }
    }

    /// Cancel the execution: set the context flag, cancel any pending
    /// scheduled task, and publish a terminal cancellation outcome. Returns
    /// `false` when a terminal outcome was already published. A running
    /// attempt is not interrupted; its outcome is discarded.
    pub fn cancel(&self) -> bool {
        self.core.cancellation.cancel();
        if let Some(pending) = self.core.take_pending() {
            pending.cancel();
        }
        self.core.complete(None, Some(ExecutionError::Cancelled), false)
    }

    /// Called once with the terminal value or failure. Registered after
    /// completion, fires immediately.
    pub fn on_complete<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.core.register_terminal(
            |listeners| listeners.push_complete(f.clone(), Dispatch::Inline),
            |terminal| f(terminal.result.as_ref(), terminal.failure.as_ref()),
        );
    }

    /// Scheduler-dispatched variant of [`on_complete`](Self::on_complete).
    pub fn on_complete_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let fire = f.clone();
        let scheduler = self.core.scheduler.clone();
        self.core.register_terminal(
            |listeners| listeners.push_complete(f.clone(), Dispatch::Scheduled),
            move |terminal| {
                let result = terminal.result.clone();
                let failure = terminal.failure.clone();
                scheduler.schedule(
                    Duration::ZERO,
                    Box::new(move || fire(result.as_ref(), failure.as_ref())),
                );
            },
        );
    }

    /// Called once if the execution terminates successfully.
    pub fn on_success<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.core.register_terminal(
            |listeners| listeners.push_success(f.clone(), Dispatch::Inline),
            |terminal| {
                if terminal.success {
                    if let Some(value) = terminal.result.as_ref() {
                        f(value);
                    }
                }
            },
        );
    }

    /// Scheduler-dispatched variant of [`on_success`](Self::on_success).
    pub fn on_success_async<F>(&self, f: F)
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let fire = f.clone();
        let scheduler = self.core.scheduler.clone();
        self.core.register_terminal(
            |listeners| listeners.push_success(f.clone(), Dispatch::Scheduled),
            move |terminal| {
                if terminal.success {
                    if let Some(value) = terminal.result.clone() {
                        scheduler.schedule(Duration::ZERO, Box::new(move || fire(&value)));
                    }
                }
            },
        );
    }

    /// Called once if the execution terminates classified as a failure.
    pub fn on_failure<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.core.register_terminal(
            |listeners| listeners.push_failure(f.clone(), Dispatch::Inline),
            |terminal| {
                if !terminal.success {
                    f(terminal.result.as_ref(), terminal.failure.as_ref());
                }
            },
        );
    }

    /// Scheduler-dispatched variant of [`on_failure`](Self::on_failure).
    pub fn on_failure_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let fire = f.clone();
        let scheduler = self.core.scheduler.clone();
        self.core.register_terminal(
            |listeners| listeners.push_failure(f.clone(), Dispatch::Scheduled),
            move |terminal| {
                if !terminal.success {
                    let result = terminal.result.clone();
                    let failure = terminal.failure.clone();
                    scheduler.schedule(
                        Duration::ZERO,
                        Box::new(move || fire(result.as_ref(), failure.as_ref())),
                    );
                }
            },
        );
    }

    /// Called after every attempt classified unsuccessful.
    pub fn on_failed_attempt<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.core.listeners.push_failed_attempt(Arc::new(f), Dispatch::Inline);
    }

    /// Scheduler-dispatched variant of [`on_failed_attempt`](Self::on_failed_attempt).
    pub fn on_failed_attempt_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.core.listeners.push_failed_attempt(Arc::new(f), Dispatch::Scheduled);
    }

    /// Called after each inter-attempt wait, before the next attempt.
    pub fn on_retry<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.core.listeners.push_retry(Arc::new(f), Dispatch::Inline);
    }

    /// Scheduler-dispatched variant of [`on_retry`](Self::on_retry).
    pub fn on_retry_async<F>(&self, f: F)
    where
        F: Fn(Option<&T>, Option<&ExecutionError<E>>, u32) + Send + Sync + 'static,
    {
        self.core.listeners.push_retry(Arc::new(f), Dispatch::Scheduled);
    }
}
