//! Per-source circuit breaker for fault tolerance.
//!
//! Implements the circuit breaker pattern to stop calling a source that keeps
//! failing. The circuit has three states:
//!
//! - **Closed**: Normal operation, calls are allowed through.
//! - **Open**: Source is failing, calls fail fast without reaching the adapter.
//! - **HalfOpen**: Cool-down elapsed, a single probe call is allowed.
//!
//! There is no timer: the Open -> HalfOpen transition is evaluated lazily on
//! the next call attempt by comparing `now - opened_at` to the open duration.
//! State is in-memory and resets on restart.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::errors::MarketDataError;
use crate::models::source::duration_secs;

/// Default number of consecutive failures before opening the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default time to wait before transitioning from Open to HalfOpen.
pub const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(60);

/// Circuit breaker state.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    /// Normal operation - calls are allowed.
    Closed,
    /// Source is failing - calls are blocked.
    Open,
    /// Testing recovery - one probe allowed.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "CLOSED"),
            Self::Open => write!(f, "OPEN"),
            Self::HalfOpen => write!(f, "HALF_OPEN"),
        }
    }
}

/// Internal circuit state for a single source.
#[derive(Debug)]
struct Circuit {
    state: CircuitState,
    consecutive_failures: u32,
    /// Valid only while Open.
    opened_at: Option<Instant>,
    /// True while the single HalfOpen probe is in flight.
    probe_in_flight: bool,
}

impl Circuit {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            probe_in_flight: false,
        }
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.probe_in_flight = false;
    }
}

/// Circuit breaker configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures before opening the circuit.
    pub failure_threshold: u32,
    /// Time to wait in Open before admitting a probe.
    #[serde(rename = "openDurationSecs", with = "duration_secs")]
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_duration: DEFAULT_OPEN_DURATION,
        }
    }
}

/// Point-in-time view of a circuit.
#[derive(Clone, Debug)]
pub struct CircuitMetrics {
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<Instant>,
}

/// Circuit breaker guarding one source.
///
/// Thread-safe: many symbol requests may hit the same source at once.
pub struct CircuitBreaker {
    source: String,
    circuit: Mutex<Circuit>,
    config: CircuitBreakerConfig,
}

impl CircuitBreaker {
    pub fn new(source: impl Into<String>) -> Self {
        Self::with_config(source, CircuitBreakerConfig::default())
    }

    pub fn with_config(source: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            source: source.into(),
            circuit: Mutex::new(Circuit::new()),
            config,
        }
    }

    /// Lock the circuit mutex, recovering from poison if necessary.
    ///
    /// The worst case after a poisoned lock is a slightly incorrect circuit
    /// state, which is better than panicking.
    fn lock_circuit(&self) -> MutexGuard<'_, Circuit> {
        self.circuit.lock().unwrap_or_else(|poisoned| {
            warn!(
                "Circuit breaker mutex for '{}' was poisoned, recovering",
                self.source
            );
            poisoned.into_inner()
        })
    }

    /// Ask to make one call through the breaker.
    ///
    /// - Closed: always admitted.
    /// - Open: admitted as a HalfOpen probe once `open_duration` has elapsed
    ///   since `opened_at`, otherwise fails fast with `CircuitOpen`.
    /// - HalfOpen: admitted only if no probe is already in flight.
    ///
    /// The returned permit must be settled with [`CallPermit::success`] or
    /// [`CallPermit::failure`]. Dropping it unsettled (cancellation) records
    /// nothing and frees the probe slot.
    pub fn try_acquire(self: &Arc<Self>) -> Result<CallPermit, MarketDataError> {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed => Ok(CallPermit::new(Arc::clone(self), false)),
            CircuitState::Open => {
                let cooled_down = circuit
                    .opened_at
                    .map(|opened| opened.elapsed() >= self.config.open_duration)
                    .unwrap_or(true);

                if cooled_down {
                    info!(
                        "Circuit breaker: transitioning '{}' from OPEN to HALF_OPEN",
                        self.source
                    );
                    circuit.state = CircuitState::HalfOpen;
                    circuit.probe_in_flight = true;
                    Ok(CallPermit::new(Arc::clone(self), true))
                } else {
                    Err(self.open_error())
                }
            }
            CircuitState::HalfOpen => {
                if circuit.probe_in_flight {
                    debug!(
                        "Circuit breaker: probe already in flight for '{}', failing fast",
                        self.source
                    );
                    Err(self.open_error())
                } else {
                    circuit.probe_in_flight = true;
                    Ok(CallPermit::new(Arc::clone(self), true))
                }
            }
        }
    }

    fn open_error(&self) -> MarketDataError {
        MarketDataError::CircuitOpen {
            source_name: self.source.clone(),
        }
    }

    fn on_success(&self, probe: bool) {
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::HalfOpen if probe => {
                info!(
                    "Circuit breaker: probe succeeded, closing circuit for '{}'",
                    self.source
                );
                *circuit = Circuit::new();
            }
            CircuitState::Closed => {
                if circuit.consecutive_failures > 0 {
                    debug!(
                        "Circuit breaker: success for '{}', failure count reset",
                        self.source
                    );
                }
                circuit.consecutive_failures = 0;
            }
            // A call admitted while Closed finished after the circuit opened
            // or began probing; the probe alone decides recovery.
            _ => {
                debug!(
                    "Circuit breaker: late success for '{}' in {} ignored",
                    self.source, circuit.state
                );
            }
        }
    }

    fn on_failure(&self, probe: bool) {
        let now = Instant::now();
        let mut circuit = self.lock_circuit();

        match circuit.state {
            CircuitState::Closed => {
                circuit.consecutive_failures += 1;
                if circuit.consecutive_failures >= self.config.failure_threshold {
                    info!(
                        "Circuit breaker: opening circuit for '{}' after {} consecutive failures",
                        self.source, circuit.consecutive_failures
                    );
                    circuit.open(now);
                } else {
                    debug!(
                        "Circuit breaker: failure for '{}' ({}/{})",
                        self.source, circuit.consecutive_failures, self.config.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen if probe => {
                circuit.consecutive_failures += 1;
                info!(
                    "Circuit breaker: probe failed, reopening circuit for '{}'",
                    self.source
                );
                circuit.open(now);
            }
            _ => {
                debug!(
                    "Circuit breaker: additional failure for '{}' in {}",
                    self.source, circuit.state
                );
            }
        }
    }

    fn on_abandoned(&self, probe: bool) {
        if !probe {
            return;
        }
        let mut circuit = self.lock_circuit();
        if circuit.state == CircuitState::HalfOpen {
            debug!(
                "Circuit breaker: probe for '{}' abandoned, slot released",
                self.source
            );
            circuit.probe_in_flight = false;
        }
    }

    /// Current state, with the lazy Open -> HalfOpen check reflected
    /// (without consuming the probe).
    pub fn state(&self) -> CircuitState {
        let circuit = self.lock_circuit();
        match (circuit.state, circuit.opened_at) {
            (CircuitState::Open, Some(opened)) if opened.elapsed() >= self.config.open_duration => {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.lock_circuit().consecutive_failures
    }

    pub fn metrics(&self) -> CircuitMetrics {
        let circuit = self.lock_circuit();
        CircuitMetrics {
            state: circuit.state,
            consecutive_failures: circuit.consecutive_failures,
            opened_at: circuit.opened_at,
        }
    }

    /// Reset the circuit to Closed.
    pub fn reset(&self) {
        info!(
            "Circuit breaker: manually resetting circuit for '{}'",
            self.source
        );
        *self.lock_circuit() = Circuit::new();
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }
}

/// Admission ticket for one call through a [`CircuitBreaker`].
#[must_use = "settle the permit with success() or failure()"]
pub struct CallPermit {
    breaker: Arc<CircuitBreaker>,
    probe: bool,
    settled: bool,
}

impl CallPermit {
    fn new(breaker: Arc<CircuitBreaker>, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    /// True if this call is the HalfOpen probe.
    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.on_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.on_failure(self.probe);
    }

    /// Settle without affecting the circuit (the source was healthy but the
    /// call failed for a reason that is not its fault).
    pub fn neutral(mut self) {
        self.settled = true;
        if self.probe {
            // A healthy answer from the probe proves the source is back.
            self.breaker.on_success(true);
        }
    }
}

impl Drop for CallPermit {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_abandoned(self.probe);
        }
    }
}
