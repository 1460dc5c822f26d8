//! Circuit breaker for isolating a failing downstream dependency
//!
//! This module provides the `CircuitBreaker` struct, a generic guard around any
//! asynchronous operation. While the dependency keeps failing the breaker stops
//! calling it for a cooldown period, so retries do not amplify an outage.
//!
//! # States
//!
//! ```text
//! CLOSED    ──(failures >= threshold && requests >= minimum)──▶ OPEN
//! OPEN      ──(recovery_timeout elapsed, next call)───────────▶ HALF_OPEN
//! HALF_OPEN ──(probe succeeds)────────────────────────────────▶ CLOSED
//! HALF_OPEN ──(probe fails)───────────────────────────────────▶ OPEN
//! ```
//!
//! # Probing
//!
//! In HALF_OPEN exactly one call is let through as the probe. Any other call
//! arriving while the probe is in flight is rejected exactly like in OPEN.
//!
//! # Thread Safety
//!
//! State lives behind a `std::sync::Mutex` that is only held between awaits,
//! never across the wrapped operation.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{info, warn};

/// State of a circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Calls pass through
    Closed,
    /// Calls are rejected without invoking the operation
    Open,
    /// A single probe call tests whether the dependency recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "CLOSED"),
            CircuitState::Open => write!(f, "OPEN"),
            CircuitState::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Configuration for a circuit breaker
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerConfig {
    /// Failures within one monitoring window that trip the breaker
    pub failure_threshold: u32,

    /// Time spent OPEN before the next call is let through as a probe
    pub recovery_timeout: Duration,

    /// Length of the window over which failures are counted while CLOSED
    pub monitoring_period: Duration,

    /// Requests within the window below which the breaker never trips
    pub minimum_requests: u32,

    /// Fraction of successful probes required to close from HALF_OPEN
    ///
    /// With a single probe any success satisfies it.
    pub success_threshold: f64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(30),
            monitoring_period: Duration::from_secs(60),
            minimum_requests: 5,
            success_threshold: 0.5,
        }
    }
}

impl CircuitBreakerConfig {
    /// Create a new CircuitBreakerConfig, falling back to defaults for invalid values
    pub fn new(
        failure_threshold: u32,
        recovery_timeout: Duration,
        monitoring_period: Duration,
        minimum_requests: u32,
    ) -> Self {
        let default = Self::default();

        let failure_threshold = if failure_threshold == 0 {
            warn!(
                default = default.failure_threshold,
                "Invalid failure_threshold (0), using default"
            );
            default.failure_threshold
        } else {
            failure_threshold
        };

        let monitoring_period = if monitoring_period.is_zero() {
            warn!(
                default_ms = default.monitoring_period.as_millis() as u64,
                "Invalid monitoring_period (0), using default"
            );
            default.monitoring_period
        } else {
            monitoring_period
        };

        Self {
            failure_threshold,
            recovery_timeout,
            monitoring_period,
            minimum_requests,
            success_threshold: default.success_threshold,
        }
    }
}

/// Snapshot of a circuit breaker's state
///
/// `requests == successes + failures` holds for every snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failures: u32,
    pub successes: u32,
    pub requests: u32,
    pub last_failure_time: Option<Instant>,
    pub last_state_change_time: Instant,
}

/// Error returned by [`CircuitBreaker::execute`]
///
/// `Open` means the operation was never invoked; `Operation` carries the
/// operation's own error unchanged.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CircuitBreakerError<E> {
    /// The breaker rejected the call without invoking the operation
    #[error("Circuit breaker '{name}' is OPEN")]
    Open {
        /// Name of the rejecting breaker
        name: String,
    },
    /// The operation ran and failed
    #[error(transparent)]
    Operation(E),
}

impl<E> CircuitBreakerError<E> {
    pub fn is_open(&self) -> bool {
        matches!(self, CircuitBreakerError::Open { .. })
    }

    /// The operation's error, or `None` when the call was rejected
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            CircuitBreakerError::Open { .. } => None,
            CircuitBreakerError::Operation(error) => Some(error),
        }
    }
}

/// How a call was admitted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Permit {
    Normal,
    Probe,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failures: u32,
    successes: u32,
    requests: u32,
    last_failure_time: Option<Instant>,
    last_state_change_time: Instant,
    window_started: Instant,
    probe_in_flight: bool,
}

impl BreakerState {
    fn new(now: Instant) -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            requests: 0,
            last_failure_time: None,
            last_state_change_time: now,
            window_started: now,
            probe_in_flight: false,
        }
    }

    fn reset_counters(&mut self, now: Instant) {
        self.failures = 0;
        self.successes = 0;
        self.requests = 0;
        self.window_started = now;
    }

    fn transition(&mut self, to: CircuitState, now: Instant) {
        self.state = to;
        self.last_state_change_time = now;
    }
}

/// Failure-isolation wrapper around asynchronous operations
///
/// One breaker is meant to guard one dependency; share it behind an `Arc`
/// between every caller of that dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    /// Create a new breaker in the CLOSED state
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            state: Mutex::new(BreakerState::new(Instant::now())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `operation` under the breaker's protection
    ///
    /// # Returns
    ///
    /// * `Ok(T)` - the operation's value
    /// * `Err(CircuitBreakerError::Open)` - the breaker is OPEN (or a probe is
    ///   already in flight); `operation` was not invoked
    /// * `Err(CircuitBreakerError::Operation(e))` - the operation failed with `e`
    pub async fn execute<F, Fut, T, E>(&self, operation: F) -> Result<T, CircuitBreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire().ok_or_else(|| CircuitBreakerError::Open {
            name: self.name.clone(),
        })?;

        // Frees the probe slot if the caller drops this future mid-probe
        let mut guard = ProbeGuard {
            breaker: self,
            armed: permit == Permit::Probe,
        };

        let outcome = operation().await;
        guard.armed = false;

        match outcome {
            Ok(value) => {
                self.on_success(permit);
                Ok(value)
            }
            Err(error) => {
                self.on_failure(permit);
                Err(CircuitBreakerError::Operation(error))
            }
        }
    }

    fn acquire(&self) -> Option<Permit> {
        let now = Instant::now();
        let mut state = self.lock();

        match state.state {
            CircuitState::Closed => {
                if now.duration_since(state.window_started) >= self.config.monitoring_period {
                    state.reset_counters(now);
                }
                Some(Permit::Normal)
            }
            CircuitState::Open => {
                if now.duration_since(state.last_state_change_time) < self.config.recovery_timeout {
                    return None;
                }
                state.transition(CircuitState::HalfOpen, now);
                state.probe_in_flight = true;
                info!(breaker = %self.name, "Circuit breaker HALF_OPEN, probing dependency");
                Some(Permit::Probe)
            }
            CircuitState::HalfOpen => {
                if state.probe_in_flight {
                    return None;
                }
                state.probe_in_flight = true;
                Some(Permit::Probe)
            }
        }
    }

    fn on_success(&self, permit: Permit) {
        let now = Instant::now();
        let mut state = self.lock();

        match permit {
            Permit::Probe => {
                state.probe_in_flight = false;
                state.reset_counters(now);
                state.successes = 1;
                state.requests = 1;
                state.transition(CircuitState::Closed, now);
                info!(breaker = %self.name, "Circuit breaker CLOSED after successful probe");
            }
            Permit::Normal => {
                state.successes += 1;
                state.requests += 1;
            }
        }
    }

    fn on_failure(&self, permit: Permit) {
        let now = Instant::now();
        let mut state = self.lock();

        state.failures += 1;
        state.requests += 1;
        state.last_failure_time = Some(now);

        match permit {
            Permit::Probe => {
                state.probe_in_flight = false;
                state.transition(CircuitState::Open, now);
                warn!(breaker = %self.name, "Probe failed, circuit breaker back to OPEN");
            }
            Permit::Normal => {
                if state.state == CircuitState::Closed
                    && state.failures >= self.config.failure_threshold
                    && state.requests >= self.config.minimum_requests
                {
                    state.transition(CircuitState::Open, now);
                    warn!(
                        breaker = %self.name,
                        failures = state.failures,
                        requests = state.requests,
                        recovery_timeout_ms = self.config.recovery_timeout.as_millis() as u64,
                        "Circuit breaker OPEN"
                    );
                }
            }
        }
    }

    /// Snapshot of the breaker's state and counters
    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.lock();
        CircuitBreakerStats {
            state: state.state,
            failures: state.failures,
            successes: state.successes,
            requests: state.requests,
            last_failure_time: state.last_failure_time,
            last_state_change_time: state.last_state_change_time,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Force the breaker CLOSED with every counter zeroed
    pub fn manual_reset(&self) {
        let now = Instant::now();
        let mut state = self.lock();
        *state = BreakerState::new(now);
        info!(breaker = %self.name, "Circuit breaker manually reset");
    }
}

struct ProbeGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl Drop for ProbeGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.lock().probe_in_flight = false;
        }
    }
}
