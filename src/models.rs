//! Account and ledger models
//!
//! - [`Account`] is owned by the store and only mutated inside a committed transfer.
//! - [`TransferRequest`] is the immutable input of one transfer.
//! - [`TransferRecord`] is the append-only ledger entry, created once per committed transfer.

use chrono::{DateTime, SubsecRound, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::core_types::{AccountId, OwnerId, OwnerKind, TransferId};

/// Decimal places stored for amounts and balances (`NUMERIC(30, 8)` columns)
pub const AMOUNT_SCALE: u32 = 8;

/// `true` if `value` is representable in [`AMOUNT_SCALE`] places without rounding
pub fn fits_amount_scale(value: Decimal) -> bool {
    value.normalize().scale() <= AMOUNT_SCALE
}

/// Persisted account state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: AccountId,
    pub owner_id: OwnerId,
    pub owner_kind: OwnerKind,
    /// Exact fixed-point balance, never negative
    pub balance: Decimal,
}

impl Account {
    pub fn new(owner_id: OwnerId, owner_kind: OwnerKind, balance: Decimal) -> Self {
        Self {
            id: AccountId::new(),
            owner_id,
            owner_kind,
            balance,
        }
    }

    /// Balance after removing `amount`, or `None` if it would go negative or overflow
    pub fn debited(&self, amount: Decimal) -> Option<Decimal> {
        self.balance
            .checked_sub(amount)
            .filter(|b| !b.is_sign_negative() || b.is_zero())
    }

    /// Balance after adding `amount`, or `None` on overflow
    pub fn credited(&self, amount: Decimal) -> Option<Decimal> {
        self.balance.checked_add(amount)
    }
}

/// Transfer request as submitted by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub amount: Decimal,
    pub sender: AccountId,
    pub receiver: AccountId,
}

impl TransferRequest {
    pub fn new(sender: AccountId, receiver: AccountId, amount: Decimal) -> Self {
        Self {
            amount,
            sender,
            receiver,
        }
    }
}

/// Ledger entry for one committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub id: TransferId,
    pub amount: Decimal,
    pub sender_id: AccountId,
    pub receiver_id: AccountId,
    pub timestamp: DateTime<Utc>,
}

impl TransferRecord {
    pub fn new(sender_id: AccountId, receiver_id: AccountId, amount: Decimal) -> Self {
        Self {
            id: TransferId::new(),
            amount,
            sender_id,
            receiver_id,
            // TIMESTAMPTZ keeps microseconds
            timestamp: Utc::now().trunc_subsecs(6),
        }
    }
}
