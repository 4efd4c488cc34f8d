//! Raw remote authorizer call and decision parsing

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::core_types::OwnerId;

/// What came back from the remote authorizer
///
/// `payload` is `None` when the body was missing or not JSON. That is a
/// malformed response and reads as a denial, never as a call error.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthResponse {
    pub status: u16,
    pub payload: Option<Value>,
}

impl AuthResponse {
    pub fn new(status: u16, payload: Option<Value>) -> Self {
        Self { status, payload }
    }

    #[inline]
    pub fn is_success_status(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Failure to obtain any response from the remote authorizer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthCallError {
    #[error("Authorizer call timed out")]
    Timeout,

    #[error("Authorizer connection failed: {0}")]
    Connect(String),

    #[error("Authorizer request failed: {0}")]
    Request(String),
}

impl AuthCallError {
    /// Transient connectivity failures are the only ones worth retrying
    #[inline]
    pub fn is_transient(&self) -> bool {
        matches!(self, AuthCallError::Timeout | AuthCallError::Connect(_))
    }
}

/// The remote yes/no authorization service
///
/// Implementations issue exactly one network call per `check`. Retries,
/// timeouts and circuit breaking live in
/// [`AuthorizationGateway`](super::AuthorizationGateway).
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Adapter name for logging
    fn name(&self) -> &'static str;

    async fn check(&self, owner_id: OwnerId, amount: Decimal) -> Result<AuthResponse, AuthCallError>;
}

/// Which payload field carries the decision and which value means "approved"
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionRule {
    pub field: String,
    pub approval_token: String,
}

impl Default for DecisionRule {
    fn default() -> Self {
        Self {
            field: "message".to_string(),
            approval_token: "Autorizado".to_string(),
        }
    }
}

impl DecisionRule {
    /// Approved only for a 2xx status whose payload field equals the token exactly
    pub fn is_approved(&self, response: &AuthResponse) -> bool {
        if !response.is_success_status() {
            return false;
        }
        response
            .payload
            .as_ref()
            .and_then(|p| p.get(self.field.as_str()))
            .and_then(Value::as_str)
            .is_some_and(|v| v == self.approval_token)
    }
}
