//! Scheduler-driven execution: the same policy pipeline as the synchronous
//! runner, re-entered at task boundaries.
//!
//! Each attempt is one scheduled task carrying the shared execution state.
//! Honoring a retry delay means scheduling a fresh task with that delay, not
//! sleeping inside the operation. When a policy asks for asynchronous
//! dispatch (an async fallback), the outcome unwind splits: the remaining
//! policies run inside a zero-delay scheduled task.

use crate::future::ExecutionCore;
use crate::{
    Admission, Cancellation, ExecutionContext, ExecutionHandle, Listeners, Outcome,
    PolicyExecutor, Scheduler,
};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub(crate) type BoxedOperation<T, E> =
    Box<dyn FnMut(&ExecutionContext<T, E>) -> Result<T, E> + Send>;

pub(crate) struct AsyncExecution<T, E> {
    policies: Arc<Vec<Box<dyn PolicyExecutor<T, E>>>>,
    operation: Mutex<BoxedOperation<T, E>>,
    ctx: Mutex<ExecutionContext<T, E>>,
    core: Arc<ExecutionCore<T, E>>,
}

impl<T, E> AsyncExecution<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// Start the execution. The first attempt is scheduled with zero delay;
    /// the handle comes back immediately.
    pub(crate) fn launch(
        policies: Arc<Vec<Box<dyn PolicyExecutor<T, E>>>>,
        operation: BoxedOperation<T, E>,
        listeners: Listeners<T, E>,
        scheduler: Arc<dyn Scheduler>,
    ) -> ExecutionHandle<T, E> {
        let core = ExecutionCore::new(listeners, scheduler);
        let execution = Arc::new(Self {
            policies,
            operation: Mutex::new(operation),
            ctx: Mutex::new(ExecutionContext::new(core.cancellation().clone())),
            core: core.clone(),
        });
        execution.schedule_attempt(Duration::ZERO, false);
        ExecutionHandle::new(core)
    }

    fn cancellation(&self) -> &Cancellation {
        self.core.cancellation()
    }

    fn schedule_attempt(self: &Arc<Self>, delay: Duration, is_retry: bool) {
        if self.cancellation().is_cancelled() {
            return;
        }
        let this = Arc::clone(self);
        let handle = self
            .core
            .scheduler()
            .schedule(delay, Box::new(move || this.run_attempt(is_retry)));
        self.core.set_pending(handle);
    }

    fn run_attempt(self: Arc<Self>, is_retry: bool) {
        // A cancelled execution already published its terminal outcome; any
        // outcome produced past this point is discarded.
        if self.cancellation().is_cancelled() {
            return;
        }

        if is_retry {
            let ctx = self.ctx.lock().unwrap();
            let (result, failure, attempts) =
                (ctx.last_result().cloned(), ctx.last_failure().cloned(), ctx.attempts());
            drop(ctx);
            self.core.notify_retry(result.as_ref(), failure.as_ref(), attempts);
        }

        let mut rejection = None;
        {
            let ctx = self.ctx.lock().unwrap();
            for (index, policy) in self.policies.iter().enumerate() {
                if let Admission::Reject(failure) = policy.before_attempt(&ctx) {
                    rejection = Some((index, failure));
                    break;
                }
            }
        }

        let (outcome, from, attempted) = match rejection {
            Some((index, failure)) => (Outcome::failure(failure), index as isize - 1, false),
            None => {
                let mut ctx = self.ctx.lock().unwrap();
                ctx.begin_attempt();
                let result = {
                    let mut operation = self.operation.lock().unwrap();
                    (*operation)(&ctx)
                };
                let outcome = Outcome::from_attempt(result);
                ctx.record(outcome.result(), outcome.failure());
                (outcome, self.policies.len() as isize - 1, true)
            }
        };

        self.unwind(outcome, from, attempted);
    }

    /// Thread `outcome` through policies `from..=0`, innermost to outermost.
    /// A policy requesting asynchronous dispatch continues the unwind inside
    /// a scheduled task.
    fn unwind(self: &Arc<Self>, mut outcome: Outcome<T, E>, mut index: isize, attempted: bool) {
        while index >= 0 {
            let at = index as usize;
            if self.policies[at].dispatch_async(&outcome) {
                let this = Arc::clone(self);
                let handle = self.core.scheduler().schedule(
                    Duration::ZERO,
                    Box::new(move || {
                        if this.cancellation().is_cancelled() {
                            return;
                        }
                        let next = {
                            let ctx = this.ctx.lock().unwrap();
                            this.policies[at].on_outcome(&ctx, outcome)
                        };
                        this.unwind(next, at as isize - 1, attempted);
                    }),
                );
                self.core.set_pending(handle);
                return;
            }
            {
                let ctx = self.ctx.lock().unwrap();
                outcome = self.policies[at].on_outcome(&ctx, outcome);
            }
            index -= 1;
        }
        self.settle(outcome, attempted);
    }

    fn settle(self: &Arc<Self>, outcome: Outcome<T, E>, attempted: bool) {
        if self.cancellation().is_cancelled() {
            return;
        }

        let attempts = self.ctx.lock().unwrap().attempts();
        if attempted && !outcome.is_success() {
            self.core.notify_failed_attempt(outcome.result(), outcome.failure(), attempts);
        }

        if outcome.is_complete() {
            let success = outcome.is_success();
            let (result, failure) = outcome.into_parts();
            self.core.complete(result, failure, success);
        } else {
            self.schedule_attempt(outcome.wait(), true);
        }
    }
}
