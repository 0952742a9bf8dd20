//! The uniform outcome record passed up the policy stack.
//!
//! Every attempt produces an `Outcome`; each policy executor observes the
//! outcome of the layer beneath it and returns either a terminal outcome or a
//! non-terminal one carrying the wait the runner must honor before the next
//! attempt.

use crate::ExecutionError;
use std::time::Duration;

/// Value-or-failure for one attempt, plus the classification metadata policies
/// attach as it travels outward.
///
/// Exactly one of `result`/`failure` is meaningful per attempt. A complete and
/// successful outcome never carries a wait.
#[derive(Debug, Clone)]
pub struct Outcome<T, E> {
    result: Option<T>,
    failure: Option<ExecutionError<E>>,
    complete: bool,
    success: bool,
    wait: Duration,
}

impl<T, E> Outcome<T, E> {
    /// Terminal success carrying `value`.
    pub fn success(value: T) -> Self {
        Self { result: Some(value), failure: None, complete: true, success: true, wait: Duration::ZERO }
    }

    /// Terminal failure carrying `failure`.
    pub fn failure(failure: ExecutionError<E>) -> Self {
        Self { result: None, failure: Some(failure), complete: true, success: false, wait: Duration::ZERO }
    }

    /// Raw outcome of an attempt, before any policy classifies it. Complete,
    /// and successful exactly when the operation returned a value.
    pub fn from_attempt(attempt: Result<T, E>) -> Self {
        match attempt {
            Ok(value) => Self::success(value),
            Err(e) => Self::failure(ExecutionError::Operation(e)),
        }
    }

    /// Re-mark this outcome as non-terminal: the runner must wait `wait` and
    /// then re-enter the inner pipeline. The attempt's result/failure are kept
    /// for listeners and context tracking.
    pub fn retry_after(mut self, wait: Duration) -> Self {
        self.complete = false;
        self.success = false;
        self.wait = wait;
        self
    }

    /// Re-mark this outcome as terminal with the given success verdict.
    pub fn terminal_with(mut self, success: bool) -> Self {
        self.complete = true;
        self.success = success;
        self.wait = Duration::ZERO;
        self
    }

    /// Substitute `value` for whatever this outcome carried, producing a
    /// terminal success. Used by fallbacks.
    pub fn with_result(mut self, value: T) -> Self {
        self.result = Some(value);
        self.failure = None;
        self.complete = true;
        self.success = true;
        self.wait = Duration::ZERO;
        self
    }

    /// The operation's returned value, if any.
    pub fn result(&self) -> Option<&T> {
        self.result.as_ref()
    }

    /// The propagated failure, if any.
    pub fn failure(&self) -> Option<&ExecutionError<E>> {
        self.failure.as_ref()
    }

    /// Whether this outcome is terminal.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Whether the producing policy classified this outcome as a success.
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Delay the runner must honor before the next attempt, when non-terminal.
    pub fn wait(&self) -> Duration {
        self.wait
    }

    /// Split into the raw value / failure pair.
    pub(crate) fn into_parts(self) -> (Option<T>, Option<ExecutionError<E>>) {
        (self.result, self.failure)
    }

    /// Collapse a terminal outcome into the caller-facing result.
    ///
    /// A failure maps to `Err`; otherwise the attempt's value is returned even
    /// when classified unsuccessful, so predicates shape listener notification
    /// without hiding the value the operation actually produced.
    pub fn into_result(self) -> Result<T, ExecutionError<E>> {
        debug_assert!(self.complete, "into_result on a non-terminal outcome");
        match (self.result, self.failure) {
            (_, Some(failure)) => Err(failure),
            (Some(value), None) => Ok(value),
            (None, None) => Err(ExecutionError::Cancelled),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct TestError;

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }

    impl std::error::Error for TestError {}

    #[test]
    fn success_is_terminal_without_wait() {
        let outcome: Outcome<u32, TestError> = Outcome::success(7);
        assert!(outcome.is_complete());
        assert!(outcome.is_success());
        assert_eq!(outcome.wait(), Duration::ZERO);
        assert_eq!(outcome.into_result().unwrap(), 7);
    }

    #[test]
    fn from_attempt_classifies_by_result() {
        let ok: Outcome<u32, TestError> = Outcome::from_attempt(Ok(1));
        assert!(ok.is_success());

        let err: Outcome<u32, TestError> = Outcome::from_attempt(Err(TestError));
        assert!(!err.is_success());
        assert!(err.failure().unwrap().is_operation());
    }

    #[test]
    fn retry_after_keeps_attempt_payload() {
        let outcome: Outcome<u32, TestError> =
            Outcome::from_attempt(Err(TestError)).retry_after(Duration::from_millis(20));
        assert!(!outcome.is_complete());
        assert!(!outcome.is_success());
        assert_eq!(outcome.wait(), Duration::from_millis(20));
        assert!(outcome.failure().is_some());
    }

    #[test]
    fn terminal_verdict_overrides_success() {
        let outcome: Outcome<bool, TestError> = Outcome::success(false).terminal_with(false);
        assert!(outcome.is_complete());
        assert!(!outcome.is_success());
        // The value still comes back to the caller.
        assert_eq!(outcome.into_result().unwrap(), false);
    }

    #[test]
    fn with_result_clears_failure() {
        let outcome: Outcome<u32, TestError> =
            Outcome::failure(ExecutionError::Operation(TestError)).with_result(99);
        assert!(outcome.is_success());
        assert_eq!(outcome.into_result().unwrap(), 99);
    }

    #[test]
    fn into_result_prefers_failure() {
        let outcome: Outcome<u32, TestError> =
            Outcome::failure(ExecutionError::Operation(TestError));
        assert!(outcome.into_result().unwrap_err().is_operation());
    }
}
