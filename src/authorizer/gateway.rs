//! Authorization gateway
//!
//! Composes the raw [`Authorizer`] call with per-attempt timeout, retry
//! with exponential backoff, a circuit breaker and a deny-by-default
//! fallback. Every path resolves to a decision; nothing is raised to the
//! caller.
//!
//! # Order of operations for one `decide`
//!
//! 1. Breaker admission. OPEN (or HALF_OPEN with a probe in flight) goes
//!    straight to the fallback without a network call.
//! 2. Up to `max_attempts` remote calls. Only transient errors
//!    (timeout, connection) are retried; a response of any shape ends the loop.
//! 3. The breaker records one outcome for the whole call: a response is a
//!    success even when it denies, an exhausted retry loop or a
//!    non-transient call error is a failure.
//! 4. The response is parsed with the [`DecisionRule`]; anything but the
//!    exact approval token is a denial.

use std::fmt;
use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::breaker::{CircuitBreaker, CircuitState};
use super::client::{AuthCallError, AuthResponse, Authorizer, DecisionRule};
use super::policy::{PolicyError, ResiliencePolicy};
use crate::core_types::OwnerId;
use crate::log_mask::LogMask;

/// Why the fallback answered instead of the remote authorizer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackReason {
    /// Breaker rejected the call, no network call issued
    CircuitOpen,
    /// Every attempt failed with a transient error
    RetriesExhausted { attempts: u32, last: AuthCallError },
    /// A non-transient call error, not retried
    CallFailed(AuthCallError),
}

impl fmt::Display for FallbackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FallbackReason::CircuitOpen => write!(f, "circuit open"),
            FallbackReason::RetriesExhausted { attempts, last } => {
                write!(f, "retries exhausted after {attempts} attempts: {last}")
            }
            FallbackReason::CallFailed(e) => write!(f, "call failed: {e}"),
        }
    }
}

/// Outcome of one authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationDecision {
    Approved,
    /// The remote authorizer answered and did not approve
    Denied,
    /// The remote authorizer was unavailable; always a denial
    Fallback(FallbackReason),
}

impl AuthorizationDecision {
    #[inline]
    pub fn is_approved(&self) -> bool {
        matches!(self, AuthorizationDecision::Approved)
    }
}

/// Aborts the remote call task when the caller goes away
struct AbortOnDrop<T>(JoinHandle<T>);

impl<T> Drop for AbortOnDrop<T> {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Resilient wrapper around the remote authorizer
pub struct AuthorizationGateway {
    authorizer: Arc<dyn Authorizer>,
    policy: ResiliencePolicy,
    rule: DecisionRule,
    breaker: CircuitBreaker,
    mask: LogMask,
}

impl AuthorizationGateway {
    pub fn new(
        authorizer: Arc<dyn Authorizer>,
        policy: ResiliencePolicy,
        rule: DecisionRule,
    ) -> Result<Self, PolicyError> {
        policy.validate()?;
        let breaker = CircuitBreaker::new(policy.failure_threshold, policy.cooldown);
        Ok(Self {
            authorizer,
            policy,
            rule,
            breaker,
            mask: LogMask::default(),
        })
    }

    /// Use `mask` when logging owner ids and amounts
    pub fn with_log_mask(mut self, mask: LogMask) -> Self {
        self.mask = mask;
        self
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    /// `true` only when the remote authorizer explicitly approved
    pub async fn authorize(&self, owner_id: OwnerId, amount: Decimal) -> bool {
        self.decide(owner_id, amount).await.is_approved()
    }

    pub async fn decide(&self, owner_id: OwnerId, amount: Decimal) -> AuthorizationDecision {
        let Some(permit) = self.breaker.try_acquire() else {
            return self.fallback(owner_id, FallbackReason::CircuitOpen);
        };

        match self.call_with_retry(owner_id, amount).await {
            Ok(response) => {
                permit.success();
                if self.rule.is_approved(&response) {
                    info!(
                        owner = %self.mask.owner(&owner_id),
                        amount = %self.mask.amount(&amount),
                        "Authorization approved"
                    );
                    AuthorizationDecision::Approved
                } else {
                    debug!(
                        owner = %self.mask.owner(&owner_id),
                        status = response.status,
                        "Authorization denied"
                    );
                    AuthorizationDecision::Denied
                }
            }
            Err(reason) => {
                permit.failure();
                self.fallback(owner_id, reason)
            }
        }
    }

    async fn call_with_retry(
        &self,
        owner_id: OwnerId,
        amount: Decimal,
    ) -> Result<AuthResponse, FallbackReason> {
        let max_attempts = self.policy.max_attempts;
        let mut attempt = 1;

        loop {
            match self.call_once(owner_id, amount).await {
                Ok(response) => return Ok(response),
                Err(e) if !e.is_transient() => {
                    warn!(authorizer = self.authorizer.name(), error = %e, "Authorizer call failed, not retrying");
                    return Err(FallbackReason::CallFailed(e));
                }
                Err(e) if attempt >= max_attempts => {
                    return Err(FallbackReason::RetriesExhausted {
                        attempts: attempt,
                        last: e,
                    });
                }
                Err(e) => {
                    let wait = self.policy.backoff(attempt);
                    warn!(
                        authorizer = self.authorizer.name(),
                        attempt,
                        max_attempts,
                        backoff_ms = wait.as_millis() as u64,
                        error = %e,
                        "Authorizer call failed, retrying"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }

    /// One remote call bounded by the attempt timeout
    ///
    /// Runs on its own task so a panicking authorizer surfaces as a call
    /// error instead of unwinding through the caller.
    async fn call_once(&self, owner_id: OwnerId, amount: Decimal) -> Result<AuthResponse, AuthCallError> {
        let authorizer = self.authorizer.clone();
        let mut task = AbortOnDrop(tokio::spawn(async move {
            authorizer.check(owner_id, amount).await
        }));

        match tokio::time::timeout(self.policy.attempt_timeout, &mut task.0).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AuthCallError::Request(format!(
                "authorizer task aborted: {join_error}"
            ))),
            Err(_) => Err(AuthCallError::Timeout),
        }
    }

    fn fallback(&self, owner_id: OwnerId, reason: FallbackReason) -> AuthorizationDecision {
        error!(
            owner = %self.mask.owner(&owner_id),
            reason = %reason,
            "Authorizer unavailable, transfer denied"
        );
        AuthorizationDecision::Fallback(reason)
    }
}
