//! Circuit breaker guarding the durable store.
//!
//! Wraps the batch and per-item persistence paths. A streak of system
//! failures opens the circuit; while open, calls are refused with
//! [`Error::CircuitOpen`], which the flush loop translates into stream
//! backpressure and a retry of the same batch. Data errors pass straight
//! through and never move the breaker.

use std::collections::VecDeque;
use std::future::Future;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Breaker thresholds and half-open trial policy.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Failure share of the rolling window that opens the circuit, in (0, 1].
    pub failure_rate: f64,
    /// Minimum calls in the window before the rate is evaluated.
    pub min_calls: usize,
    /// How long the circuit stays open before probing.
    pub open_duration: Duration,
    /// Successful probes required in half-open to close again.
    pub half_open_trials: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_rate: 0.5,
            min_calls: 10,
            open_duration: Duration::from_secs(10),
            half_open_trials: 3,
        }
    }
}

/// Rolling-window size for outcome tracking.
const WINDOW: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CircuitState {
    /// Normal operation; outcomes feed the rolling window.
    Closed,
    /// Refusing calls until the open duration elapses.
    Open { until: Instant },
    /// Probing: a bounded number of trial calls is let through.
    HalfOpen { permitted: u32, successes: u32 },
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    window: VecDeque<bool>, // true = failure
}

/// Circuit breaker with `Closed / Open / HalfOpen` states.
pub struct CircuitBreaker {
    config: BreakerConfig,
    inner: Mutex<Inner>,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                window: VecDeque::with_capacity(WINDOW),
            }),
        }
    }

    /// Run `f` under the breaker.
    ///
    /// Returns [`Error::CircuitOpen`] without calling `f` when the circuit
    /// refuses the call. System-error outcomes count toward opening; data
    /// errors are forwarded untouched.
    pub async fn execute<T, F, Fut>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.acquire()?;
        match f().await {
            Ok(value) => {
                self.record(false);
                Ok(value)
            }
            Err(e) if e.is_data_error() => {
                // Not the store's fault; does not move the breaker.
                Err(e)
            }
            Err(e) => {
                self.record(true);
                Err(e)
            }
        }
    }

    /// Whether the circuit is currently refusing calls.
    pub fn is_open(&self) -> bool {
        let inner = self.inner.lock();
        matches!(inner.state, CircuitState::Open { until } if Instant::now() < until)
    }

    fn acquire(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::Open { until } => {
                if Instant::now() >= until {
                    info!("Circuit breaker half-open, permitting trial calls");
                    inner.state = CircuitState::HalfOpen {
                        permitted: self.config.half_open_trials,
                        successes: 0,
                    };
                    self.take_half_open_permit(&mut inner)
                } else {
                    Err(Error::CircuitOpen)
                }
            }
            CircuitState::HalfOpen { .. } => self.take_half_open_permit(&mut inner),
        }
    }

    fn take_half_open_permit(&self, inner: &mut Inner) -> Result<()> {
        if let CircuitState::HalfOpen { permitted, .. } = &mut inner.state {
            if *permitted == 0 {
                return Err(Error::CircuitOpen);
            }
            *permitted -= 1;
        }
        Ok(())
    }

    fn record(&self, failure: bool) {
        let mut inner = self.inner.lock();
        match inner.state {
            CircuitState::Closed => {
                if inner.window.len() == WINDOW {
                    inner.window.pop_front();
                }
                inner.window.push_back(failure);
                if self.should_open(&inner.window) {
                    let until = Instant::now() + self.config.open_duration;
                    warn!(
                        open_ms = self.config.open_duration.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                    inner.state = CircuitState::Open { until };
                    inner.window.clear();
                }
            }
            CircuitState::HalfOpen { successes, .. } => {
                if failure {
                    let until = Instant::now() + self.config.open_duration;
                    warn!("Circuit breaker re-opened after failed trial");
                    inner.state = CircuitState::Open { until };
                } else {
                    let successes = successes + 1;
                    if successes >= self.config.half_open_trials {
                        info!("Circuit breaker closed");
                        inner.state = CircuitState::Closed;
                        inner.window.clear();
                    } else if let CircuitState::HalfOpen { successes: s, .. } = &mut inner.state {
                        *s = successes;
                    }
                }
            }
            CircuitState::Open { .. } => {
                // A call that was in flight when the circuit opened; its
                // outcome no longer matters.
            }
        }
    }

    fn should_open(&self, window: &VecDeque<bool>) -> bool {
        if window.len() < self.config.min_calls {
            return false;
        }
        let failures = window.iter().filter(|failed| **failed).count();
        failures as f64 / window.len() as f64 >= self.config.failure_rate
    }
}
