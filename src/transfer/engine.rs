//! Transfer Engine
//!
//! Runs one transfer as a single committed unit of work. See the module
//! docs of [`crate::transfer`] for the step order.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::error::{AccountRole, DenialCause, TransferError, ValidationError};
use super::validation::{check_request, check_sender};
use crate::authorizer::{AuthorizationDecision, AuthorizationGateway};
use crate::core_types::{AccountId, OwnerId};
use crate::log_mask::LogMask;
use crate::models::{Account, TransferRecord, TransferRequest};
use crate::store::{AccountStore, LedgerStore, UnitOfWork};

/// Who to lock, kept after the unlocked reads are discarded
#[derive(Debug, Clone, Copy)]
struct Parties {
    sender_id: AccountId,
    sender_owner: OwnerId,
    receiver_id: AccountId,
    receiver_owner: OwnerId,
}

/// Transfer Engine - validation, authorization, locking, mutation, ledger
///
/// Holds no mutable state of its own; any number of engines (in one or
/// many processes) may run against the same store.
pub struct TransferEngine {
    accounts: Arc<dyn AccountStore>,
    gateway: Arc<AuthorizationGateway>,
    mask: LogMask,
}

impl TransferEngine {
    pub fn new(accounts: Arc<dyn AccountStore>, gateway: Arc<AuthorizationGateway>) -> Self {
        Self {
            accounts,
            gateway,
            mask: LogMask::default(),
        }
    }

    pub fn with_log_mask(mut self, mask: LogMask) -> Self {
        self.mask = mask;
        self
    }

    /// Execute one transfer
    ///
    /// Makes exactly one authorization decision and never re-attempts the
    /// transfer. Dropping the returned future before authorization
    /// completes leaves no lock taken; dropping it later rolls back.
    pub async fn execute(&self, req: TransferRequest) -> Result<TransferRecord, TransferError> {
        check_request(&req)?;
        let parties = self.authorize_parties(&req).await?;

        let mut uow = self.accounts.begin().await?;
        let started = Instant::now();

        let record = match self.apply(&mut *uow, &req, parties).await {
            Ok(record) => record,
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed, transaction dropped");
                }
                return Err(e);
            }
        };

        uow.commit().await?;

        info!(
            transfer_id = %record.id,
            sender = %record.sender_id,
            receiver = %record.receiver_id,
            amount = %self.mask.amount(&record.amount),
            lock_held_us = started.elapsed().as_micros() as u64,
            "Transfer committed"
        );
        Ok(record)
    }

    /// Steps before any lock: resolve, pre-check, authorize
    ///
    /// Only identities leave this function. The balances read here may be
    /// stale by the time authorization returns and are re-read under lock.
    async fn authorize_parties(&self, req: &TransferRequest) -> Result<Parties, TransferError> {
        let sender = self.resolve(req.sender, AccountRole::Sender).await?;
        let receiver = self.resolve(req.receiver, AccountRole::Receiver).await?;
        check_sender(req, &sender)?;

        match self.gateway.decide(sender.owner_id, req.amount).await {
            AuthorizationDecision::Approved => Ok(Parties {
                sender_id: sender.id,
                sender_owner: sender.owner_id,
                receiver_id: receiver.id,
                receiver_owner: receiver.owner_id,
            }),
            AuthorizationDecision::Denied => {
                warn!(sender = %req.sender, "Transfer rejected by authorizer");
                Err(TransferError::NotAuthorized {
                    cause: DenialCause::Denied,
                })
            }
            AuthorizationDecision::Fallback(reason) => {
                warn!(sender = %req.sender, reason = %reason, "Transfer rejected, authorizer unavailable");
                Err(TransferError::NotAuthorized {
                    cause: DenialCause::Unavailable,
                })
            }
        }
    }

    async fn resolve(&self, id: AccountId, role: AccountRole) -> Result<Account, TransferError> {
        self.accounts
            .get(id)
            .await?
            .ok_or(TransferError::NotFound(role, id))
    }

    /// Steps under lock: sender lock, balance re-check, receiver lock, writes, ledger
    async fn apply(
        &self,
        uow: &mut dyn UnitOfWork,
        req: &TransferRequest,
        parties: Parties,
    ) -> Result<TransferRecord, TransferError> {
        debug!(owner = %self.mask.owner(&parties.sender_owner), "Acquiring sender lock");
        let mut sender = uow
            .lock_for_update(parties.sender_owner)
            .await?
            .filter(|a| a.id == parties.sender_id)
            .ok_or(TransferError::NotFound(AccountRole::Sender, req.sender))?;
        debug!(balance = %self.mask.amount(&sender.balance), "Sender lock acquired");

        if sender.balance < req.amount {
            warn!(
                sender = %req.sender,
                requested = %self.mask.amount(&req.amount),
                "Insufficient balance under lock"
            );
            return Err(TransferError::InsufficientBalance);
        }

        let mut receiver = uow
            .lock_for_update(parties.receiver_owner)
            .await?
            .filter(|a| a.id == parties.receiver_id)
            .ok_or(TransferError::NotFound(AccountRole::Receiver, req.receiver))?;

        let debited = sender
            .debited(req.amount)
            .ok_or(TransferError::InsufficientBalance)?;
        let credited = receiver
            .credited(req.amount)
            .ok_or(ValidationError::AmountOverflow)?;
        sender.balance = debited;
        receiver.balance = credited;

        uow.save(&sender).await?;
        uow.save(&receiver).await?;

        let record = TransferRecord::new(sender.id, receiver.id, req.amount);
        uow.append(&record).await?;
        Ok(record)
    }
}
