//! Resilience layer for calls against the content store.
//!
//! - [`classifier`] decides whether a failure is a transient transport fault
//!   by walking its `source()` chain.
//! - [`retry`] re-runs an async operation with capped exponential backoff.
//! - [`circuit_breaker`] short-circuits a call site after repeated failures.
//!
//! [`Fault`] is the structured error that transports use to carry a
//! machine-readable fault code or HTTP status through wrapper layers.

pub mod circuit_breaker;
pub mod classifier;
pub mod fault;
pub mod retry;

// Re-export primary types for convenience.
pub use circuit_breaker::{
    BreakerConfig, BreakerError, BreakerSnapshot, CircuitBreaker, CircuitState, Clock,
    ManualClock, SystemClock,
};
pub use classifier::{fault_code, http_status, is_transient};
pub use fault::{Fault, FaultCode};
pub use retry::{Backoff, RetryExecutor, RetryOn, RetryPolicy};
