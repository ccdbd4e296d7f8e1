//! Shared account pool with per-account mutual exclusion.
//!
//! Each account owns a single-permit [`Semaphore`]. Tokio semaphores queue
//! waiters in FIFO order, so a contended account is handed to the task that
//! started waiting first. Unrelated accounts never block each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::select_all;
use indexmap::IndexMap;
use log::{debug, trace};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::account::{Account, AccountName};
use crate::error::{AccountError, Result};

/// One managed account and its lock.
#[derive(Debug)]
struct Slot {
    account: Arc<Account>,
    lock: Arc<Semaphore>,
}

/// Pool of named accounts shared across concurrent automation tasks.
///
/// Build the pool once, wrap it in an `Arc`, and hand it to every task (or
/// [`SessionAdapter`](crate::SessionAdapter)) that needs shared-credential
/// semantics.
///
/// Two acquisition styles share the same locks:
/// - [`acquire_account`](Self::acquire_account) /
///   [`release_account`](Self::release_account) for explicit, balanced pairs.
/// - [`lock`](Self::lock) returning an [`AccountGuard`] that releases on drop.
///
/// # Example
///
/// ```rust
/// use ferrisconf::{Account, AccountManager};
///
/// # async fn example() -> Result<(), ferrisconf::Error> {
/// let mut manager = AccountManager::new();
/// manager.add_account(Account::new("oper").with_password("secret"))?;
///
/// let account = manager.acquire_account("oper").await?;
/// // ... log in and do work as `oper` ...
/// manager.release_account(&account)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct AccountManager {
    accounts: IndexMap<String, Slot>,

    /// Permits of accounts acquired through `acquire_account`, keyed by name.
    held: Mutex<HashMap<String, OwnedSemaphorePermit>>,
}

impl AccountManager {
    /// Create an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pool from a list of accounts.
    pub fn from_accounts(accounts: impl IntoIterator<Item = Account>) -> Result<Self> {
        let mut manager = Self::new();
        for account in accounts {
            manager.add_account(account)?;
        }
        Ok(manager)
    }

    /// Add an account to the pool.
    ///
    /// Fails if the name is empty or already registered.
    pub fn add_account(&mut self, account: Account) -> Result<Arc<Account>> {
        account.validate()?;

        if self.accounts.contains_key(account.name()) {
            return Err(AccountError::AlreadyRegistered {
                name: account.name().to_string(),
            }
            .into());
        }

        let account = Arc::new(account);
        self.accounts.insert(
            account.name().to_string(),
            Slot {
                account: account.clone(),
                lock: Arc::new(Semaphore::new(1)),
            },
        );
        Ok(account)
    }

    /// Look up an account by name. Does not lock.
    pub fn get_account_from_name(&self, name: &str) -> Result<Arc<Account>> {
        Ok(self.slot(name)?.account.clone())
    }

    /// Check whether an account is managed by this pool.
    pub fn has_account(&self, name: &str) -> bool {
        self.accounts.contains_key(name)
    }

    /// Number of managed accounts.
    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    /// Whether the pool has no accounts.
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Names of all managed accounts, in insertion order.
    pub fn account_names(&self) -> impl Iterator<Item = &str> {
        self.accounts.keys().map(String::as_str)
    }

    /// Whether an account is currently held by anyone.
    pub fn is_locked(&self, name: &str) -> Result<bool> {
        Ok(self.slot(name)?.lock.available_permits() == 0)
    }

    /// Acquire an account, waiting until no one else holds it.
    ///
    /// Accepts a name or an account record. Waiters for the same account are
    /// served first-come, first-served. Every successful call must be paired
    /// with exactly one [`release_account`](Self::release_account).
    ///
    /// Dropping the returned future before it completes leaves no trace in
    /// the pool.
    pub async fn acquire_account<A: AccountName + ?Sized>(
        &self,
        account: &A,
    ) -> Result<Arc<Account>> {
        let name = account.account_name();
        let slot = self.slot(name)?;

        trace!("acquire: waiting for account '{}'", name);
        let permit = slot
            .lock
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AccountError::PoolClosed)?;

        self.held().insert(name.to_string(), permit);
        debug!("acquire: account '{}' locked", name);

        Ok(slot.account.clone())
    }

    /// Acquire whichever account becomes free first.
    ///
    /// Free accounts are taken in insertion order. When every account is
    /// held, waits on all of them at once.
    pub async fn acquire_any_account(&self) -> Result<Arc<Account>> {
        if self.accounts.is_empty() {
            return Err(AccountError::EmptyPool.into());
        }

        for (name, slot) in &self.accounts {
            if let Ok(permit) = slot.lock.clone().try_acquire_owned() {
                self.held().insert(name.clone(), permit);
                debug!("acquire: account '{}' locked (free)", name);
                return Ok(slot.account.clone());
            }
        }

        trace!("acquire: all {} accounts busy, waiting", self.accounts.len());
        let waits = self
            .accounts
            .values()
            .map(|slot| Box::pin(slot.lock.clone().acquire_owned()));
        let (permit, index, _) = select_all(waits).await;
        let permit = permit.map_err(|_| AccountError::PoolClosed)?;

        let (name, slot) = self
            .accounts
            .get_index(index)
            .ok_or(AccountError::EmptyPool)?;
        self.held().insert(name.clone(), permit);
        debug!("acquire: account '{}' locked", name);

        Ok(slot.account.clone())
    }

    /// Release an account acquired with [`acquire_account`](Self::acquire_account).
    ///
    /// Wakes the longest-waiting acquirer of that account, if any.
    pub fn release_account<A: AccountName + ?Sized>(&self, account: &A) -> Result<()> {
        let name = account.account_name();
        self.slot(name)?;

        let permit = self
            .held()
            .remove(name)
            .ok_or_else(|| AccountError::NotLocked {
                name: name.to_string(),
            })?;
        drop(permit);

        debug!("release: account '{}' unlocked", name);
        Ok(())
    }

    /// Acquire an account and hold it for the lifetime of the returned guard.
    pub async fn lock<A: AccountName + ?Sized>(&self, account: &A) -> Result<AccountGuard> {
        let name = account.account_name();
        let slot = self.slot(name)?;

        let permit = slot
            .lock
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| AccountError::PoolClosed)?;
        debug!("lock: account '{}' locked", name);

        Ok(AccountGuard {
            account: slot.account.clone(),
            _permit: permit,
        })
    }

    /// Close the pool.
    ///
    /// Pending and future acquisitions fail with
    /// [`AccountError::PoolClosed`]. Accounts already held stay held until
    /// released.
    pub fn close(&self) {
        for slot in self.accounts.values() {
            slot.lock.close();
        }
        debug!("account pool closed");
    }

    fn slot(&self, name: &str) -> Result<&Slot> {
        self.accounts.get(name).ok_or_else(|| {
            AccountError::UnknownAccount {
                name: name.to_string(),
            }
            .into()
        })
    }

    fn held(&self) -> MutexGuard<'_, HashMap<String, OwnedSemaphorePermit>> {
        self.held.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// An account held from an [`AccountManager`] until dropped.
#[derive(Debug)]
pub struct AccountGuard {
    account: Arc<Account>,
    _permit: OwnedSemaphorePermit,
}

impl AccountGuard {
    /// The held account.
    pub fn account(&self) -> &Arc<Account> {
        &self.account
    }
}

impl std::ops::Deref for AccountGuard {
    type Target = Account;

    fn deref(&self) -> &Account {
        &self.account
    }
}

impl Drop for AccountGuard {
    fn drop(&mut self) {
        debug!("lock: account '{}' unlocked", self.account.name());
    }
}
