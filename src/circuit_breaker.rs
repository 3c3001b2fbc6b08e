//! Circuit breaker for record store lookups.
//!
//! Predecessor lookups hit the cluster API once per processed item. When the
//! API is unhealthy each lookup would otherwise wait out its timeout; the
//! breaker fails them fast instead. Uses the `recloser` crate.
//!
//! # States
//!
//! - **Closed**: Normal operation, requests pass through
//! - **Open**: Store unhealthy, requests fail-fast without attempting
//! - **HalfOpen**: Testing if the store recovered, limited requests allowed
//!
//! # Usage
//!
//! ```rust,no_run
//! # use release_watch::circuit_breaker::{CircuitBreaker, CircuitConfig, CircuitError};
//! # async fn example() {
//! let circuit = CircuitBreaker::new("predecessor_lookup", CircuitConfig::default());
//!
//! match circuit.call(|| async { Ok::<u32, String>(7) }).await {
//!     Ok(value) => { /* success */ }
//!     Err(CircuitError::Rejected) => { /* circuit open */ }
//!     Err(CircuitError::Inner(e)) => { /* lookup error */ }
//! }
//! # }
//! ```

use crate::metrics;
use recloser::{AsyncRecloser, Error as RecloserError, Recloser};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Error type for circuit-protected operations.
#[derive(Debug, thiserror::Error)]
pub enum CircuitError<E> {
    /// The circuit breaker rejected the call (circuit is open).
    #[error("circuit breaker open, request rejected")]
    Rejected,

    /// The underlying operation failed.
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

impl<E> CircuitError<E> {
    pub fn is_rejected(&self) -> bool {
        matches!(self, CircuitError::Rejected)
    }

    pub fn inner(&self) -> Option<&E> {
        match self {
            CircuitError::Inner(e) => Some(e),
            CircuitError::Rejected => None,
        }
    }
}

impl<E> From<RecloserError<E>> for CircuitError<E> {
    fn from(err: RecloserError<E>) -> Self {
        match err {
            RecloserError::Rejected => CircuitError::Rejected,
            RecloserError::Inner(e) => CircuitError::Inner(e),
        }
    }
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone)]
pub struct CircuitConfig {
    /// Failure ratio over the closed window that trips the circuit.
    pub error_rate: f32,
    /// Calls observed while closed before the ratio is evaluated.
    pub closed_window: usize,
    /// Trial calls allowed while half-open.
    pub half_open_window: usize,
    /// How long to stay open before trying again.
    pub recovery_timeout: Duration,
}

impl Default for CircuitConfig {
    fn default() -> Self {
        Self {
            error_rate: 0.5,
            closed_window: 10,
            half_open_window: 2,
            recovery_timeout: Duration::from_secs(15),
        }
    }
}

impl CircuitConfig {
    /// Trips on a short window and recovers quickly.
    pub fn for_testing() -> Self {
        Self {
            error_rate: 0.5,
            closed_window: 2,
            half_open_window: 1,
            recovery_timeout: Duration::from_millis(50),
        }
    }
}

/// A named circuit breaker with call accounting.
pub struct CircuitBreaker {
    name: String,
    inner: AsyncRecloser,

    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitConfig) -> Self {
        let recloser = Recloser::custom()
            .error_rate(config.error_rate)
            .closed_len(config.closed_window.max(1))
            .half_open_len(config.half_open_window.max(1))
            .open_wait(config.recovery_timeout)
            .build();

        Self {
            name: name.into(),
            inner: recloser.into(),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Execute an async operation through the circuit breaker.
    ///
    /// Takes a closure that returns a Future, so a rejected call never
    /// starts the operation.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, CircuitError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.calls_total.fetch_add(1, Ordering::Relaxed);

        match self.inner.call(f()).await {
            Ok(result) => {
                self.successes.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_call(&self.name, "success");
                Ok(result)
            }
            Err(RecloserError::Rejected) => {
                self.rejections.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_call(&self.name, "rejected");
                warn!(circuit = %self.name, "Circuit breaker rejected call (open)");
                Err(CircuitError::Rejected)
            }
            Err(RecloserError::Inner(e)) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                metrics::record_circuit_call(&self.name, "failure");
                debug!(circuit = %self.name, "Circuit call failed");
                Err(CircuitError::Inner(e))
            }
        }
    }

    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }
}
