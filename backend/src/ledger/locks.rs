use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

/// Per-account serialization point.
///
/// Every read-modify-write of an account's ledger fields (missed reminders,
/// committed profit, reminder/withdrawal timestamps) runs while holding the
/// account's guard, so the scheduler, reply handler and withdrawal paths
/// cannot interleave on the same account. Code that needs two guards takes
/// them in ascending id order.
#[derive(Default)]
pub struct AccountLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

/// Proof that the caller holds the lock for `account_id`.
pub struct AccountGuard {
    account_id: Uuid,
    _guard: OwnedMutexGuard<()>,
}

impl AccountGuard {
    pub fn account_id(&self) -> Uuid {
        self.account_id
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, account_id: Uuid) -> AccountGuard {
        let mutex = {
            let mut locks = self.locks.lock();
            locks
                .entry(account_id)
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };

        AccountGuard {
            account_id,
            _guard: mutex.lock_owned().await,
        }
    }

    /// Drop entries nobody is holding or waiting on
    pub fn prune(&self) -> usize {
        let mut locks = self.locks.lock();
        let before = locks.len();
        locks.retain(|_, mutex| Arc::strong_count(mutex) > 1);
        before - locks.len()
    }
}
