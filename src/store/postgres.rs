//! PostgreSQL account store
//!
//! Row locks are `SELECT ... FOR UPDATE` inside one `sqlx` transaction.
//! PostgreSQL releases them on COMMIT or ROLLBACK, and a concurrent
//! `FOR UPDATE` on the same row waits for that, across processes.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, warn};

use super::{AccountStore, LedgerStore, StoreError, UnitOfWork};
use crate::core_types::{AccountId, OwnerId, OwnerKind};
use crate::db::RowExt;
use crate::models::{AMOUNT_SCALE, Account, TransferRecord, fits_amount_scale};

fn create_accounts_sql() -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS accounts_tb (
    account_id  UUID PRIMARY KEY,
    owner_id    UUID NOT NULL UNIQUE,
    owner_kind  SMALLINT NOT NULL,
    balance     NUMERIC(30, {AMOUNT_SCALE}) NOT NULL CHECK (balance >= 0),
    updated_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)"#
    )
}

fn create_transfers_sql() -> String {
    format!(
        r#"
CREATE TABLE IF NOT EXISTS transfers_tb (
    transfer_id  TEXT PRIMARY KEY,
    amount       NUMERIC(30, {AMOUNT_SCALE}) NOT NULL CHECK (amount > 0),
    sender_id    UUID NOT NULL REFERENCES accounts_tb (account_id),
    receiver_id  UUID NOT NULL REFERENCES accounts_tb (account_id),
    created_at   TIMESTAMPTZ NOT NULL
)"#
    )
}

/// [`AccountStore`] backed by PostgreSQL
#[derive(Clone)]
pub struct PgAccountStore {
    pool: PgPool,
}

impl PgAccountStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create `accounts_tb` and `transfers_tb` if missing
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(&create_accounts_sql()).execute(&self.pool).await?;
        sqlx::query(&create_transfers_sql()).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert an account row (seeding and tests)
    pub async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        if !fits_amount_scale(account.balance) {
            return Err(StoreError::Constraint(format!(
                "balance of account {} exceeds the stored scale",
                account.id
            )));
        }
        sqlx::query(
            "INSERT INTO accounts_tb (account_id, owner_id, owner_kind, balance) VALUES ($1, $2, $3, $4)",
        )
        .bind(account.id.as_uuid())
        .bind(account.owner_id.as_uuid())
        .bind(account.owner_kind.id())
        .bind(account.balance)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Ledger entries touching an account, oldest first
    pub async fn records_for(&self, id: AccountId) -> Result<Vec<TransferRecord>, StoreError> {
        let rows = sqlx::query(
            r#"SELECT transfer_id, amount, sender_id, receiver_id, created_at
               FROM transfers_tb
               WHERE sender_id = $1 OR receiver_id = $1
               ORDER BY transfer_id"#,
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(record_from_row).collect()
    }
}

fn account_from_row(row: &PgRow) -> Result<Account, StoreError> {
    const TABLE: &str = "accounts_tb";
    let owner_kind: i16 = row.column(TABLE, "owner_kind")?;

    Ok(Account {
        id: AccountId::from_uuid(row.column(TABLE, "account_id")?),
        owner_id: OwnerId::from_uuid(row.column(TABLE, "owner_id")?),
        owner_kind: OwnerKind::try_from(owner_kind)
            .map_err(|_| StoreError::CorruptRow(format!("{TABLE}.owner_kind = {owner_kind}")))?,
        balance: row.column(TABLE, "balance")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<TransferRecord, StoreError> {
    const TABLE: &str = "transfers_tb";
    let id: String = row.column(TABLE, "transfer_id")?;

    Ok(TransferRecord {
        id: id
            .parse()
            .map_err(|_| StoreError::CorruptRow(format!("{TABLE}.transfer_id = {id}")))?,
        amount: row.column(TABLE, "amount")?,
        sender_id: AccountId::from_uuid(row.column(TABLE, "sender_id")?),
        receiver_id: AccountId::from_uuid(row.column(TABLE, "receiver_id")?),
        timestamp: row.column(TABLE, "created_at")?,
    })
}

#[async_trait]
impl AccountStore for PgAccountStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = sqlx::query(
            "SELECT account_id, owner_id, owner_kind, balance FROM accounts_tb WHERE account_id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgUnitOfWork { tx: Some(tx) }))
    }
}

/// One PostgreSQL transaction
///
/// Dropping it without `commit` lets `sqlx` roll the transaction back.
pub struct PgUnitOfWork {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgUnitOfWork {
    fn tx(&mut self) -> Result<&mut Transaction<'static, Postgres>, StoreError> {
        self.tx.as_mut().ok_or(StoreError::Finished)
    }
}

#[async_trait]
impl LedgerStore for PgUnitOfWork {
    async fn append(&mut self, record: &TransferRecord) -> Result<(), StoreError> {
        let tx = self.tx()?;
        sqlx::query(
            r#"INSERT INTO transfers_tb (transfer_id, amount, sender_id, receiver_id, created_at)
               VALUES ($1, $2, $3, $4, $5)"#,
        )
        .bind(record.id.to_string())
        .bind(record.amount)
        .bind(record.sender_id.as_uuid())
        .bind(record.receiver_id.as_uuid())
        .bind(record.timestamp)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_for_update(&mut self, owner_id: OwnerId) -> Result<Option<Account>, StoreError> {
        let tx = self.tx()?;
        let row = sqlx::query(
            r#"SELECT account_id, owner_id, owner_kind, balance
               FROM accounts_tb
               WHERE owner_id = $1
               FOR UPDATE"#,
        )
        .bind(owner_id.as_uuid())
        .fetch_optional(&mut **tx)
        .await?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn save(&mut self, account: &Account) -> Result<(), StoreError> {
        let tx = self.tx()?;
        let result = sqlx::query(
            "UPDATE accounts_tb SET balance = $1, updated_at = NOW() WHERE account_id = $2",
        )
        .bind(account.balance)
        .bind(account.id.as_uuid())
        .execute(&mut **tx)
        .await?;

        if result.rows_affected() != 1 {
            warn!(account_id = %account.id, rows = result.rows_affected(), "Balance update hit no row");
            return Err(StoreError::CorruptRow(format!(
                "accounts_tb row {} missing",
                account.id
            )));
        }
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.commit().await?;
        debug!("Transaction committed, row locks released");
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        let tx = self.tx.take().ok_or(StoreError::Finished)?;
        tx.rollback().await?;
        Ok(())
    }
}
