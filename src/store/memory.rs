//! In-process account store
//!
//! Each account row owns an async mutex that plays the role of the
//! database row lock. A unit of work keeps the owned guards of every row
//! it locked and stages writes locally; `commit` applies the writes and
//! the ledger entries under one write lock, then drops the guards.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

use super::{AccountStore, LedgerStore, StoreError, UnitOfWork};
use crate::core_types::{AccountId, OwnerId};
use crate::models::{Account, TransferRecord, fits_amount_scale};

#[derive(Default)]
struct State {
    accounts: HashMap<AccountId, Account>,
    owners: HashMap<OwnerId, AccountId>,
    row_locks: HashMap<AccountId, Arc<AsyncMutex<()>>>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<State>,
    ledger: Mutex<Vec<TransferRecord>>,
    lock_requests: AtomicUsize,
}

impl Inner {
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn ledger(&self) -> MutexGuard<'_, Vec<TransferRecord>> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory [`AccountStore`] with blocking per-row locks
///
/// Cloning shares the underlying state, so several engines can run
/// against one store the way several processes share one database.
#[derive(Clone, Default)]
pub struct MemoryAccountStore {
    inner: Arc<Inner>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account. Each owner may hold a single account.
    pub fn insert(&self, account: Account) -> Result<(), StoreError> {
        if account.balance.is_sign_negative() && !account.balance.is_zero() {
            return Err(StoreError::Constraint(format!(
                "negative balance for account {}",
                account.id
            )));
        }
        if !fits_amount_scale(account.balance) {
            return Err(StoreError::Constraint(format!(
                "balance of account {} exceeds the stored scale",
                account.id
            )));
        }

        let mut state = self.inner.write();
        if state.owners.contains_key(&account.owner_id) {
            return Err(StoreError::Constraint(format!(
                "owner {} already has an account",
                account.owner_id
            )));
        }
        if state.accounts.contains_key(&account.id) {
            return Err(StoreError::Constraint(format!(
                "duplicate account id {}",
                account.id
            )));
        }

        state.owners.insert(account.owner_id, account.id);
        state
            .row_locks
            .insert(account.id, Arc::new(AsyncMutex::new(())));
        state.accounts.insert(account.id, account);
        Ok(())
    }

    /// Committed state of one account
    pub fn account(&self, id: AccountId) -> Option<Account> {
        self.inner.read().accounts.get(&id).cloned()
    }

    /// Committed ledger, in append order
    pub fn records(&self) -> Vec<TransferRecord> {
        self.inner.ledger().clone()
    }

    /// Number of `lock_for_update` calls issued against this store
    pub fn lock_requests(&self) -> usize {
        self.inner.lock_requests.load(Ordering::SeqCst)
    }

    /// Whether some unit of work currently holds the row lock of `id`
    pub fn is_locked(&self, id: AccountId) -> bool {
        let lock = self.inner.read().row_locks.get(&id).cloned();
        match lock {
            Some(lock) => lock.try_lock().is_err(),
            None => false,
        }
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.account(id))
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, StoreError> {
        Ok(Box::new(MemoryUnitOfWork {
            inner: self.inner.clone(),
            held: HashMap::new(),
            writes: HashMap::new(),
            appended: Vec::new(),
            finished: false,
        }))
    }
}

/// Unit of work over [`MemoryAccountStore`]
///
/// Dropping it without `commit` discards the staged writes and releases the locks.
pub struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    held: HashMap<AccountId, OwnedMutexGuard<()>>,
    writes: HashMap<AccountId, Account>,
    appended: Vec<TransferRecord>,
    finished: bool,
}

impl MemoryUnitOfWork {
    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.finished {
            Err(StoreError::Finished)
        } else {
            Ok(())
        }
    }

    fn release(&mut self) {
        self.writes.clear();
        self.appended.clear();
        self.held.clear();
        self.finished = true;
    }
}

#[async_trait]
impl LedgerStore for MemoryUnitOfWork {
    async fn append(&mut self, record: &TransferRecord) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.appended.push(record.clone());
        Ok(())
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_for_update(&mut self, owner_id: OwnerId) -> Result<Option<Account>, StoreError> {
        self.ensure_open()?;
        self.inner.lock_requests.fetch_add(1, Ordering::SeqCst);

        let (id, row_lock) = {
            let state = self.inner.read();
            let Some(id) = state.owners.get(&owner_id).copied() else {
                return Ok(None);
            };
            let lock = state
                .row_locks
                .get(&id)
                .cloned()
                .ok_or_else(|| StoreError::CorruptRow(format!("no row lock for account {id}")))?;
            (id, lock)
        };

        if !self.held.contains_key(&id) {
            let guard = row_lock.lock_owned().await;
            debug!(account_id = %id, "Row lock acquired");
            self.held.insert(id, guard);
        }

        // Fresh read after the lock is granted; own staged writes win.
        if let Some(staged) = self.writes.get(&id) {
            return Ok(Some(staged.clone()));
        }
        Ok(self.inner.read().accounts.get(&id).cloned())
    }

    async fn save(&mut self, account: &Account) -> Result<(), StoreError> {
        self.ensure_open()?;
        if !self.held.contains_key(&account.id) {
            return Err(StoreError::NotLocked(account.id.to_string()));
        }
        if account.balance.is_sign_negative() && !account.balance.is_zero() {
            return Err(StoreError::Constraint(format!(
                "negative balance for account {}",
                account.id
            )));
        }
        self.writes.insert(account.id, account.clone());
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        {
            let mut state = self.inner.write();
            let mut ledger = self.inner.ledger();
            for (id, account) in self.writes.drain() {
                state.accounts.insert(id, account);
            }
            ledger.append(&mut self.appended);
        }
        // Locks go only after the new state is visible.
        self.release();
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::OwnerKind;
    use rust_decimal_macros::dec;
    use std::time::Duration;

    fn seeded() -> (MemoryAccountStore, Account, Account) {
        let store = MemoryAccountStore::new();
        let a = Account::new(OwnerId::new(), OwnerKind::Personal, dec!(100));
        let b = Account::new(OwnerId::new(), OwnerKind::Personal, dec!(50));
        store.insert(a.clone()).unwrap();
        store.insert(b.clone()).unwrap();
        (store, a, b)
    }

    #[test]
    fn test_insert_rejects_second_account_for_owner() {
        let (store, a, _) = seeded();
        let dup = Account::new(a.owner_id, OwnerKind::Personal, dec!(1));
        assert!(matches!(store.insert(dup), Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_insert_rejects_balance_finer_than_scale() {
        let store = MemoryAccountStore::new();
        let account = Account::new(OwnerId::new(), OwnerKind::Personal, dec!(1.000000001));
        assert!(matches!(store.insert(account), Err(StoreError::Constraint(_))));
    }

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let (store, a, b) = seeded();
        let mut uow = store.begin().await.unwrap();

        let mut locked = uow.lock_for_update(a.owner_id).await.unwrap().unwrap();
        locked.balance = dec!(70);
        uow.save(&locked).await.unwrap();
        uow.append(&TransferRecord::new(a.id, b.id, dec!(30)))
            .await
            .unwrap();

        assert_eq!(store.account(a.id).unwrap().balance, dec!(100));
        assert!(store.records().is_empty());
        assert!(store.is_locked(a.id));

        uow.commit().await.unwrap();

        assert_eq!(store.account(a.id).unwrap().balance, dec!(70));
        assert_eq!(store.records().len(), 1);
        assert!(!store.is_locked(a.id));
    }

    #[tokio::test]
    async fn test_drop_rolls_back_and_releases() {
        let (store, a, _) = seeded();
        {
            let mut uow = store.begin().await.unwrap();
            let mut locked = uow.lock_for_update(a.owner_id).await.unwrap().unwrap();
            locked.balance = dec!(1);
            uow.save(&locked).await.unwrap();
            assert!(store.is_locked(a.id));
        }
        assert!(!store.is_locked(a.id));
        assert_eq!(store.account(a.id).unwrap().balance, dec!(100));
    }

    #[tokio::test]
    async fn test_save_requires_lock() {
        let (store, a, _) = seeded();
        let mut uow = store.begin().await.unwrap();
        let result = uow.save(&a).await;
        assert!(matches!(result, Err(StoreError::NotLocked(_))));
    }

    #[tokio::test]
    async fn test_save_rejects_negative_balance() {
        let (store, a, _) = seeded();
        let mut uow = store.begin().await.unwrap();
        let mut locked = uow.lock_for_update(a.owner_id).await.unwrap().unwrap();
        locked.balance = dec!(-0.01);
        assert!(matches!(
            uow.save(&locked).await,
            Err(StoreError::Constraint(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_owner_is_none() {
        let (store, _, _) = seeded();
        let mut uow = store.begin().await.unwrap();
        assert!(uow.lock_for_update(OwnerId::new()).await.unwrap().is_none());
        assert_eq!(store.lock_requests(), 1);
    }

    #[tokio::test]
    async fn test_finished_unit_of_work_is_unusable() {
        let (store, a, _) = seeded();
        let mut uow = store.begin().await.unwrap();
        uow.rollback().await.unwrap();
        assert!(matches!(
            uow.lock_for_update(a.owner_id).await,
            Err(StoreError::Finished)
        ));
        assert!(matches!(uow.commit().await, Err(StoreError::Finished)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_second_locker_blocks_until_commit() {
        let (store, a, _) = seeded();

        let mut first = store.begin().await.unwrap();
        let mut locked = first.lock_for_update(a.owner_id).await.unwrap().unwrap();

        let contender_store = store.clone();
        let owner = a.owner_id;
        let contender = tokio::spawn(async move {
            let mut second = contender_store.begin().await.unwrap();
            let seen = second.lock_for_update(owner).await.unwrap().unwrap();
            second.rollback().await.unwrap();
            seen.balance
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!contender.is_finished());

        locked.balance = dec!(42);
        first.save(&locked).await.unwrap();
        first.commit().await.unwrap();

        // The contender sees the committed value, not the one it could have cached.
        assert_eq!(contender.await.unwrap(), dec!(42));
    }
}
