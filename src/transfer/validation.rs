//! Cheap pre-checks, run before any lock or network call

use super::error::{TransferError, ValidationError};
use crate::models::{Account, TransferRequest, fits_amount_scale};

/// Shape of the request alone, no I/O needed
pub fn check_request(req: &TransferRequest) -> Result<(), ValidationError> {
    if req.amount <= rust_decimal::Decimal::ZERO {
        return Err(ValidationError::NonPositiveAmount);
    }
    // Storage keeps a fixed scale; anything finer would be rounded per row.
    if !fits_amount_scale(req.amount) {
        return Err(ValidationError::TooManyDecimals(req.amount.normalize().scale()));
    }
    if req.sender == req.receiver {
        return Err(ValidationError::SameAccount);
    }
    Ok(())
}

/// Sender eligibility and an early balance check on the unlocked read
///
/// The balance check only fails fast; the authoritative check runs again
/// under the row lock.
pub fn check_sender(req: &TransferRequest, sender: &Account) -> Result<(), TransferError> {
    if !sender.owner_kind.can_send() {
        return Err(ValidationError::IneligibleSender(sender.owner_kind).into());
    }
    if sender.balance < req.amount {
        return Err(TransferError::InsufficientBalance);
    }
    Ok(())
}
