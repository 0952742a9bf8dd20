//! Error types surfaced by the execution engine.
use std::fmt;
use std::time::Duration;

/// Unified terminal error for a single execution.
///
/// `Operation` carries the user operation's own failure untouched; the other
/// variants are raised by the engine itself, so callers can always tell the
/// two apart at the final boundary.
#[derive(Debug, Clone)]
pub enum ExecutionError<E> {
    /// The user operation failed and retries were exhausted or aborted.
    Operation(E),
    /// The circuit breaker rejected the attempt without invoking the operation.
    CircuitOpen {
        /// Cooldown left before the breaker will admit a probe.
        remaining: Duration,
    },
    /// A synchronous inter-attempt wait was interrupted by cancellation.
    Interrupted,
    /// The asynchronous execution was cancelled through its handle.
    Cancelled,
    /// `ExecutionHandle::get_timeout` gave up waiting. The underlying
    /// execution keeps running; this never terminates it.
    GetTimeout {
        /// How long the caller waited before giving up.
        waited: Duration,
    },
}

impl<E: fmt::Display> fmt::Display for ExecutionError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operation(e) => write!(f, "{}", e),
            Self::CircuitOpen { remaining } => {
                write!(f, "circuit breaker open ({:?} until half-open)", remaining)
            }
            Self::Interrupted => write!(f, "execution interrupted while waiting to retry"),
            Self::Cancelled => write!(f, "execution cancelled"),
            Self::GetTimeout { waited } => {
                write!(f, "no terminal outcome after waiting {:?}", waited)
            }
        }
    }
}

impl<E: std::error::Error + 'static> std::error::Error for ExecutionError<E> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }
}

impl<E> ExecutionError<E> {
    /// Check if this is the user operation's own failure.
    pub fn is_operation(&self) -> bool {
        matches!(self, Self::Operation(_))
    }

    /// Check if this is a circuit breaker rejection.
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, Self::CircuitOpen { .. })
    }

    /// Check if this is an interrupted synchronous wait.
    pub fn is_interrupted(&self) -> bool {
        matches!(self, Self::Interrupted)
    }

    /// Check if the execution was cancelled through its handle.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this came from `ExecutionHandle::get_timeout` expiring.
    pub fn is_get_timeout(&self) -> bool {
        matches!(self, Self::GetTimeout { .. })
    }

    /// Extract the operation failure if this is an `Operation` variant.
    pub fn into_operation(self) -> Option<E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Borrow the operation failure if present.
    pub fn as_operation(&self) -> Option<&E> {
        match self {
            Self::Operation(e) => Some(e),
            _ => None,
        }
    }

    /// Cooldown remaining on a circuit breaker rejection, if present.
    pub fn circuit_open_remaining(&self) -> Option<Duration> {
        match self {
            Self::CircuitOpen { remaining } => Some(*remaining),
            _ => None,
        }
    }
}

/// Configuration rejected at policy construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A retry policy was already configured on this builder.
    RetryAlreadyConfigured,
    /// A circuit breaker was already configured on this builder.
    CircuitBreakerAlreadyConfigured,
    /// A fallback was already configured on this builder.
    FallbackAlreadyConfigured,
    /// `max_attempts` must be at least 1.
    ZeroMaxAttempts,
    /// Threshold must satisfy `0 < n <= m`.
    InvalidThreshold { n: u32, m: u32 },
    /// Threshold window exceeds the supported capacity.
    WindowTooLarge { m: u32, capacity: u32 },
    /// Relative jitter factor must lie in `[0, 1]`.
    InvalidJitterFactor(f64),
    /// Exponential delay factor must be at least 1.0 and finite.
    InvalidDelayFactor(f64),
    /// Random delay range must satisfy `min <= max`.
    InvalidDelayRange { min: Duration, max: Duration },
    /// A backoff cap must be non-zero and at least the base delay.
    InvalidDelayCap { base: Duration, max: Duration },
    /// Only exponential backoff takes a cap.
    CapUnsupported,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetryAlreadyConfigured => {
                write!(f, "a retry policy has already been configured")
            }
            Self::CircuitBreakerAlreadyConfigured => {
                write!(f, "a circuit breaker has already been configured")
            }
            Self::FallbackAlreadyConfigured => {
                write!(f, "a fallback has already been configured")
            }
            Self::ZeroMaxAttempts => write!(f, "max_attempts must be at least 1"),
            Self::InvalidThreshold { n, m } => {
                write!(f, "threshold must satisfy 0 < n <= m (got {} of {})", n, m)
            }
            Self::WindowTooLarge { m, capacity } => {
                write!(f, "threshold window {} exceeds supported capacity {}", m, capacity)
            }
            Self::InvalidJitterFactor(factor) => {
                write!(f, "jitter factor must lie in [0, 1] (got {})", factor)
            }
            Self::InvalidDelayFactor(factor) => {
                write!(f, "delay factor must be finite and >= 1.0 (got {})", factor)
            }
            Self::InvalidDelayRange { min, max } => {
                write!(f, "delay range must satisfy min <= max (got {:?}..{:?})", min, max)
            }
            Self::InvalidDelayCap { base, max } => {
                write!(f, "delay cap {:?} must be non-zero and >= base {:?}", max, base)
            }
            Self::CapUnsupported => {
                write!(f, "with_max is only valid for exponential backoff")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
