//! Resilience policy for the authorizer call

use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("max_attempts must be at least 1")]
    ZeroAttempts,

    #[error("failure_threshold must be at least 1")]
    ZeroThreshold,

    #[error("backoff_multiplier must be a finite value >= 1.0, got {0}")]
    InvalidMultiplier(String),

    #[error("attempt_timeout must be non-zero")]
    ZeroTimeout,
}

/// Retry, timeout and circuit-breaker settings
///
/// Defaults: 3 attempts, 100ms backoff doubling per attempt, 3s per-attempt
/// timeout, breaker opens after 5 consecutive failed calls and probes again
/// after 30s.
#[derive(Debug, Clone, PartialEq)]
pub struct ResiliencePolicy {
    /// Total attempts per authorization, including the first
    pub max_attempts: u32,
    /// Wait before the second attempt
    pub backoff_base: Duration,
    /// Growth factor of the wait between subsequent attempts
    pub backoff_multiplier: f64,
    /// Upper bound for one remote call
    pub attempt_timeout: Duration,
    /// Consecutive failed authorizations that open the breaker
    pub failure_threshold: u32,
    /// Time the breaker stays open before allowing a probe
    pub cooldown: Duration,
}

impl Default for ResiliencePolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_base: Duration::from_millis(100),
            backoff_multiplier: 2.0,
            attempt_timeout: Duration::from_secs(3),
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

impl ResiliencePolicy {
    pub fn validate(&self) -> Result<(), PolicyError> {
        if self.max_attempts == 0 {
            return Err(PolicyError::ZeroAttempts);
        }
        if self.failure_threshold == 0 {
            return Err(PolicyError::ZeroThreshold);
        }
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(PolicyError::InvalidMultiplier(
                self.backoff_multiplier.to_string(),
            ));
        }
        if self.attempt_timeout.is_zero() {
            return Err(PolicyError::ZeroTimeout);
        }
        Ok(())
    }

    /// Wait after failed attempt number `attempt` (1-based) before the next one
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let nanos = self.backoff_base.as_nanos() as f64 * self.backoff_multiplier.powi(exponent);
        Duration::from_nanos(nanos.round().min(u64::MAX as f64) as u64)
    }
}
