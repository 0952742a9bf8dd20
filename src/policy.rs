//! The contract every policy implements.
//!
//! Policies never invoke the layer beneath them; the runner owns the drive
//! loop. Per attempt it consults `before_attempt` outermost-first, invokes the
//! operation if every policy admits, then threads the outcome back through
//! `on_outcome` innermost-first. A rejection at some policy becomes a terminal
//! failure outcome that only the policies outside it observe.
//!
//! Keeping the drive loop out of the policies is what lets the synchronous and
//! scheduler-driven runners share the exact same policy logic.

use crate::{ExecutionContext, ExecutionError, Outcome};

/// Verdict of a policy consulted before an attempt.
#[derive(Debug)]
pub enum Admission<E> {
    /// Let the attempt proceed.
    Admit,
    /// Refuse the attempt; the failure becomes a terminal outcome for the
    /// policies outside the rejecting one.
    Reject(ExecutionError<E>),
}

/// A reusable strategy that observes and shapes attempt outcomes.
pub trait PolicyExecutor<T, E>: Send + Sync {
    /// Consulted before each attempt. The default admits.
    fn before_attempt(&self, _ctx: &ExecutionContext<T, E>) -> Admission<E> {
        Admission::Admit
    }

    /// Receives the outcome produced by the layer beneath and returns either
    /// a terminal outcome or a non-terminal one carrying the wait the runner
    /// must honor. The default passes the outcome through untouched.
    fn on_outcome(&self, _ctx: &ExecutionContext<T, E>, outcome: Outcome<T, E>) -> Outcome<T, E> {
        outcome
    }

    /// When `true` for a given outcome, the asynchronous runner dispatches
    /// this policy's `on_outcome` as a scheduled task instead of calling it
    /// inline.
    fn dispatch_async(&self, _outcome: &Outcome<T, E>) -> bool {
        false
    }
}
