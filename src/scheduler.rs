//! Minimal scheduling interface consumed by the asynchronous runner.
//!
//! The engine only ever needs "run this task after a delay, and let me cancel
//! it if it has not started". Production deployments can hand in anything
//! that satisfies that; [`ThreadScheduler`] works out of the box and
//! [`TokioScheduler`] bridges to an existing tokio runtime.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Cancellable handle to one scheduled task.
pub trait ScheduleHandle: Send {
    /// Prevent the task from running if it has not started yet. Returns
    /// whether cancellation took effect.
    fn cancel(&self) -> bool;
}

/// Schedules short-lived tasks with a delay.
pub trait Scheduler: Send + Sync + std::fmt::Debug {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduleHandle>;
}

#[derive(Debug, PartialEq, Eq)]
enum TaskState {
    Pending,
    Cancelled,
    Running,
}

struct TaskCell {
    state: Mutex<TaskState>,
    wake: Condvar,
}

/// Default scheduler: a timer thread per task, woken early on cancellation.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduleHandle> {
        let cell = Arc::new(TaskCell { state: Mutex::new(TaskState::Pending), wake: Condvar::new() });
        let worker = cell.clone();
        std::thread::spawn(move || {
            let deadline = Instant::now() + delay;
            let mut state = worker.state.lock().unwrap();
            loop {
                if *state == TaskState::Cancelled {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                let (guard, _timeout) = worker.wake.wait_timeout(state, deadline - now).unwrap();
                state = guard;
            }
            *state = TaskState::Running;
            drop(state);
            task();
        });
        Box::new(ThreadHandle { cell })
    }
}

struct ThreadHandle {
    cell: Arc<TaskCell>,
}

impl ScheduleHandle for ThreadHandle {
    fn cancel(&self) -> bool {
        let mut state = self.cell.state.lock().unwrap();
        if *state == TaskState::Pending {
            *state = TaskState::Cancelled;
            self.cell.wake.notify_all();
            true
        } else {
            false
        }
    }
}

const PENDING: u8 = 0;
const RUNNING: u8 = 1;
const CANCELLED: u8 = 2;

/// Scheduler backed by a tokio runtime. The delay is a `tokio::time::sleep`;
/// the task body runs on the blocking pool, since scheduled tasks may block.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
}

impl TokioScheduler {
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self { handle }
    }

    /// Bind to the runtime the caller is currently inside.
    ///
    /// # Panics
    /// Outside a tokio runtime, like `tokio::runtime::Handle::current`.
    pub fn current() -> Self {
        Self { handle: tokio::runtime::Handle::current() }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduleHandle> {
        let state = Arc::new(AtomicU8::new(PENDING));
        let claimed = state.clone();
        let join = self.handle.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if claimed
                .compare_exchange(PENDING, RUNNING, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                let _ = tokio::task::spawn_blocking(task).await;
            }
        });
        Box::new(TokioHandle { state, join })
    }
}

struct TokioHandle {
    state: Arc<AtomicU8>,
    join: tokio::task::JoinHandle<()>,
}

impl ScheduleHandle for TokioHandle {
    fn cancel(&self) -> bool {
        if self
            .state
            .compare_exchange(PENDING, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.join.abort();
            true
        } else {
            false
        }
    }
}

/// Test scheduler: runs tasks inline with no delay and records every
/// requested delay for assertions.
#[derive(Debug, Clone, Default)]
pub struct ImmediateScheduler {
    delays: Arc<Mutex<Vec<Duration>>>,
}

impl ImmediateScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays requested so far, in order.
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.delays.lock().unwrap().clear();
    }
}

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, delay: Duration, task: Box<dyn FnOnce() + Send>) -> Box<dyn ScheduleHandle> {
        self.delays.lock().unwrap().push(delay);
        task();
        Box::new(CompletedHandle)
    }
}

struct CompletedHandle;

impl ScheduleHandle for CompletedHandle {
    fn cancel(&self) -> bool {
        false
    }
}
