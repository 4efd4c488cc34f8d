//! Circuit breaker for the authorizer call
//!
//! ```text
//! CLOSED --(threshold consecutive failures)--> OPEN
//!   ^                                           |
//!   |                                     (cooldown)
//!   |                                           v
//!   +--------(probe succeeds)-------------- HALF_OPEN --(probe fails)--> OPEN
//! ```
//!
//! While OPEN every call is rejected without touching the network.
//! HALF_OPEN admits exactly one probe; concurrent callers are rejected
//! until the probe settles.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use tracing::{info, warn};

/// Externally visible breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug)]
enum Phase {
    Closed { failures: u32 },
    Open { since: Instant },
    HalfOpen { probing: bool },
}

/// Consecutive-failure circuit breaker
#[derive(Debug)]
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    phase: Mutex<Phase>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            phase: Mutex::new(Phase::Closed { failures: 0 }),
        }
    }

    fn phase(&self) -> MutexGuard<'_, Phase> {
        self.phase.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> CircuitState {
        match *self.phase() {
            Phase::Closed { .. } => CircuitState::Closed,
            Phase::Open { .. } => CircuitState::Open,
            Phase::HalfOpen { .. } => CircuitState::HalfOpen,
        }
    }

    /// Consecutive failures counted while CLOSED
    pub fn consecutive_failures(&self) -> u32 {
        match *self.phase() {
            Phase::Closed { failures } => failures,
            _ => 0,
        }
    }

    /// Ask to place one call. `None` means short-circuit to the fallback.
    pub fn try_acquire(&self) -> Option<CallPermit<'_>> {
        let mut phase = self.phase();
        match *phase {
            Phase::Closed { .. } => Some(CallPermit::new(self, false)),
            Phase::Open { since } => {
                if since.elapsed() >= self.cooldown {
                    info!("Circuit breaker cooldown elapsed, admitting probe");
                    *phase = Phase::HalfOpen { probing: true };
                    Some(CallPermit::new(self, true))
                } else {
                    None
                }
            }
            Phase::HalfOpen { probing: true } => None,
            Phase::HalfOpen { probing: false } => {
                *phase = Phase::HalfOpen { probing: true };
                Some(CallPermit::new(self, true))
            }
        }
    }

    fn record_success(&self, probe: bool) {
        let mut phase = self.phase();
        match *phase {
            Phase::HalfOpen { .. } if probe => {
                info!("Circuit breaker probe succeeded, closing");
                *phase = Phase::Closed { failures: 0 };
            }
            Phase::Closed { .. } => *phase = Phase::Closed { failures: 0 },
            // A slow call from before the breaker opened does not close it.
            _ => {}
        }
    }

    fn record_failure(&self, probe: bool) {
        let mut phase = self.phase();
        match *phase {
            Phase::HalfOpen { .. } if probe => {
                warn!("Circuit breaker probe failed, reopening");
                *phase = Phase::Open {
                    since: Instant::now(),
                };
            }
            Phase::Closed { failures } => {
                let failures = failures + 1;
                if failures >= self.threshold {
                    warn!(
                        failures,
                        cooldown_ms = self.cooldown.as_millis() as u64,
                        "Circuit breaker opened"
                    );
                    *phase = Phase::Open {
                        since: Instant::now(),
                    };
                } else {
                    *phase = Phase::Closed { failures };
                }
            }
            _ => {}
        }
    }

    fn release_probe(&self) {
        let mut phase = self.phase();
        if let Phase::HalfOpen { probing: true } = *phase {
            *phase = Phase::HalfOpen { probing: false };
        }
    }
}

/// Admission for one call through the breaker
///
/// Settle it with [`success`](Self::success) or [`failure`](Self::failure).
/// A probe permit dropped unsettled (cancelled caller) frees the probe
/// slot without changing the state.
#[must_use = "an unsettled permit records nothing"]
pub struct CallPermit<'a> {
    breaker: &'a CircuitBreaker,
    probe: bool,
    settled: bool,
}

impl<'a> CallPermit<'a> {
    fn new(breaker: &'a CircuitBreaker, probe: bool) -> Self {
        Self {
            breaker,
            probe,
            settled: false,
        }
    }

    pub fn is_probe(&self) -> bool {
        self.probe
    }

    pub fn success(mut self) {
        self.settled = true;
        self.breaker.record_success(self.probe);
    }

    pub fn failure(mut self) {
        self.settled = true;
        self.breaker.record_failure(self.probe);
    }
}

impl Drop for CallPermit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.probe {
            self.breaker.release_probe();
        }
    }
}
