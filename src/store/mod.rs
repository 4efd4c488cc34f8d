//! Account and ledger storage
//!
//! The transfer engine never mutates state directly. It opens a
//! [`UnitOfWork`], takes row locks through it, stages writes and the
//! ledger entry, then commits. Locks are released by the commit (or the
//! rollback); there is no separate unlock call.
//!
//! # Locking contract
//!
//! - `lock_for_update` blocks while another unit of work holds the row
//! - the returned account is the freshest committed state, never a cached copy
//! - nothing staged in a unit of work is visible to `AccountStore::get` before commit
//! - dropping an uncommitted unit of work rolls it back
//!
//! Implementations:
//! - [`MemoryAccountStore`] - in-process row locks, used by tests and demos
//! - [`PgAccountStore`] - PostgreSQL `SELECT ... FOR UPDATE`

pub mod memory;
pub mod postgres;

pub use memory::MemoryAccountStore;
pub use postgres::PgAccountStore;

use async_trait::async_trait;
use thiserror::Error;

use crate::core_types::{AccountId, OwnerId};
use crate::models::{Account, TransferRecord};

/// Storage errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("Constraint violated: {0}")]
    Constraint(String),

    #[error("Account {0} is not locked by this unit of work")]
    NotLocked(String),

    #[error("Unit of work already finished")]
    Finished,
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

/// Read access to committed accounts and the entry point to units of work
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get committed account state by account id
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Open a new unit of work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError>;
}

/// Append-only ledger of committed transfers
#[async_trait]
pub trait LedgerStore: Send {
    /// Stage a ledger entry; it becomes visible with the commit
    async fn append(&mut self, record: &TransferRecord) -> Result<(), StoreError>;
}

/// One all-or-nothing unit of work against the account and ledger stores
#[async_trait]
pub trait UnitOfWork: LedgerStore {
    /// Take the exclusive row lock of the owner's account, blocking until granted
    ///
    /// Returns `None` if the owner has no account.
    async fn lock_for_update(&mut self, owner_id: OwnerId) -> Result<Option<Account>, StoreError>;

    /// Stage a balance write for an account locked by this unit of work
    async fn save(&mut self, account: &Account) -> Result<(), StoreError>;

    /// Apply all staged writes and release every lock
    async fn commit(&mut self) -> Result<(), StoreError>;

    /// Discard all staged writes and release every lock
    async fn rollback(&mut self) -> Result<(), StoreError>;
}
