//! Transfer Error Types

use std::fmt;

use thiserror::Error;

use crate::core_types::{AccountId, OwnerKind};
use crate::models::AMOUNT_SCALE;
use crate::store::StoreError;

/// Malformed or ineligible request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Amount must be greater than zero")]
    NonPositiveAmount,

    #[error("Amount has {0} decimal places, at most {max} allowed", max = AMOUNT_SCALE)]
    TooManyDecimals(u32),

    #[error("Sender and receiver must be different accounts")]
    SameAccount,

    #[error("{0} accounts may not send transfers")]
    IneligibleSender(OwnerKind),

    #[error("Amount would overflow the receiver balance")]
    AmountOverflow,
}

/// Which side of the transfer an account plays
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountRole {
    Sender,
    Receiver,
}

impl fmt::Display for AccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccountRole::Sender => write!(f, "Sender"),
            AccountRole::Receiver => write!(f, "Receiver"),
        }
    }
}

/// Why authorization was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialCause {
    /// The authorizer answered and did not approve
    Denied,
    /// The authorizer was unreachable or the breaker was open
    Unavailable,
}

impl fmt::Display for DenialCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DenialCause::Denied => write!(f, "denied by authorizer"),
            DenialCause::Unavailable => write!(f, "authorizer unavailable"),
        }
    }
}

/// Transfer error types
///
/// Authorizer unavailability arrives as `NotAuthorized { cause: Unavailable }`,
/// never as a retryable error. `Unavailable` is reserved for storage failures.
#[derive(Error, Debug, Clone)]
pub enum TransferError {
    #[error("Invalid transfer: {0}")]
    Validation(#[from] ValidationError),

    #[error("Transfer not authorized: {cause}")]
    NotAuthorized { cause: DenialCause },

    #[error("Insufficient balance")]
    InsufficientBalance,

    #[error("{0} account not found: {1}")]
    NotFound(AccountRole, AccountId),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

impl TransferError {
    /// Stable error code for the API boundary
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::Validation(_) => "VALIDATION_ERROR",
            TransferError::NotAuthorized { .. } => "NOT_AUTHORIZED",
            TransferError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            TransferError::NotFound(..) => "NOT_FOUND",
            TransferError::Unavailable(_) => "UNAVAILABLE",
        }
    }
}

impl From<StoreError> for TransferError {
    fn from(e: StoreError) -> Self {
        TransferError::Unavailable(e.to_string())
    }
}
