use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::locks::{AccountGuard, AccountLocks};
use super::models::{CustodialAccount, NewPendingRequest, PendingRequest};
use super::repository::AccountStore;
use crate::error::{AppError, AppResult, LedgerError};
use crate::wallet::keys::{generate_access_key, is_access_key};

const LINK_ATTEMPTS: usize = 3;
const KEY_ATTEMPTS: usize = 5;

/// A timely reply that was credited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub total: Decimal,
}

/// Turns reminders and replies into authoritative changes to committed profit.
///
/// Request lifecycle: `Pending -> Responded` on a timely reply,
/// `Pending -> Superseded` when the next reminder opens a new request. A
/// pending request older than the response window is unaddressable and is
/// never revisited.
///
/// Every mutating method takes the account's [`AccountGuard`]; callers hold
/// it across their whole read-compute-write.
pub struct CommitmentLedger {
    store: Arc<dyn AccountStore>,
    locks: AccountLocks,
    response_window: chrono::Duration,
}

impl CommitmentLedger {
    pub fn new(store: Arc<dyn AccountStore>, response_window: chrono::Duration) -> Self {
        Self {
            store,
            locks: AccountLocks::new(),
            response_window,
        }
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    pub async fn lock(&self, account_id: Uuid) -> AccountGuard {
        self.locks.lock(account_id).await
    }

    /// Drop lock entries for accounts nobody is working on
    pub fn prune_locks(&self) -> usize {
        self.locks.prune()
    }

    /// Fresh copy of the guarded account
    pub async fn load(&self, guard: &AccountGuard) -> AppResult<CustodialAccount> {
        self.store
            .get_account(guard.account_id())
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound.into())
    }

    /// Record a sent reminder: supersede the previous request, open a new one
    /// for `amount` and count the reminder as missed until a reply arrives.
    pub async fn open_request(
        &self,
        guard: &AccountGuard,
        account: &mut CustodialAccount,
        amount: Decimal,
        message_id: String,
        now: DateTime<Utc>,
    ) -> AppResult<PendingRequest> {
        ensure_guarded(guard, account)?;

        account.missed_reminders += 1;
        account.last_reminder_at = Some(now);

        let request = self
            .store
            .open_request(
                account,
                NewPendingRequest {
                    account_id: account.id,
                    amount,
                    message_id,
                    created_at: now,
                },
            )
            .await?;

        info!(
            "📨 Opened request {} for account {} ({} USDC, missed {})",
            request.id, account.id, amount, account.missed_reminders
        );
        Ok(request)
    }

    /// Apply a reply sent from `channel_id` to the outbound message `message_id`.
    ///
    /// Credits at most once per request. A channel no account is linked to
    /// yields `AccountNotFound`; unknown, superseded or already answered
    /// requests yield `RequestNotFound`; late replies yield `RequestExpired`.
    /// None of these change any state.
    #[instrument(skip(self))]
    pub async fn handle_reply(
        &self,
        channel_id: &str,
        message_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Credit> {
        let account = self
            .store
            .find_by_channel(channel_id)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        let guard = self.lock(account.id).await;
        let mut account = self.load(&guard).await?;
        if account.channel_id.as_deref() != Some(channel_id) {
            return Err(LedgerError::AccountNotFound.into());
        }

        let request = self
            .store
            .find_open_request(account.id, message_id)
            .await?
            .ok_or(LedgerError::RequestNotFound)?;

        if request.is_expired_at(now, self.response_window) {
            warn!(
                "Reply to request {} arrived {}s after creation, window is {}s",
                request.id,
                (now - request.created_at).num_seconds(),
                self.response_window.num_seconds()
            );
            return Err(LedgerError::RequestExpired.into());
        }

        account.profit_committed += request.amount;
        account.missed_reminders = 0;
        account.last_reminder_at = Some(now);

        if !self.store.credit_request(request.id, &account, now).await? {
            return Err(LedgerError::RequestNotFound.into());
        }

        info!(
            "✓ Credited {} to account {} (committed now {})",
            request.amount, account.id, account.profit_committed
        );

        Ok(Credit {
            account_id: account.id,
            amount: request.amount,
            total: account.profit_committed,
        })
    }

    /// Bind `channel_id` to the account holding `access_key` and activate it.
    ///
    /// The used key is rotated so it cannot link a channel twice. An account
    /// already bound to the same channel loses the link; its guard is taken
    /// alongside this account's, so no in-flight reminder can write it back.
    #[instrument(skip(self, access_key))]
    pub async fn link_channel(
        &self,
        access_key: &str,
        channel_id: &str,
        now: DateTime<Utc>,
    ) -> AppResult<CustodialAccount> {
        if !is_access_key(access_key) {
            return Err(LedgerError::InvalidAccessKey.into());
        }

        let account_id = self
            .store
            .find_by_access_key(access_key)
            .await?
            .ok_or(LedgerError::InvalidAccessKey)?
            .id;

        for _ in 0..LINK_ATTEMPTS {
            let holder = self.channel_holder(channel_id, account_id).await?;
            let (guard, holder_guard) = self.lock_pair(account_id, holder).await;

            // the channel changed hands before both guards were held
            if self.channel_holder(channel_id, account_id).await? != holder {
                continue;
            }

            let mut account = self.load(&guard).await?;
            if account.access_key != access_key {
                return Err(LedgerError::InvalidAccessKey.into());
            }

            if let Some(holder_guard) = &holder_guard {
                let mut displaced = self.load(holder_guard).await?;
                displaced.channel_id = None;
                self.store.update_account(&displaced).await?;
                info!("Channel {} moved away from account {}", channel_id, displaced.id);
            }

            account.channel_id = Some(channel_id.to_string());
            account.access_key = generate_access_key();
            account.is_active = true;
            account.missed_reminders = 0;
            account.last_reminder_at = Some(now);
            self.save_with_fresh_key(&mut account).await?;

            info!("🔗 Account {} linked and activated", account.id);
            return Ok(account);
        }

        Err(AppError::Internal(format!(
            "Channel {} kept changing owner while linking account {}",
            channel_id, account_id
        )))
    }

    pub async fn deactivate(&self, guard: &AccountGuard, account: &mut CustodialAccount) -> AppResult<()> {
        ensure_guarded(guard, account)?;
        account.is_active = false;
        self.store.update_account(account).await?;

        info!(
            "⛔ Account {} deactivated after {} missed reminders",
            account.id, account.missed_reminders
        );
        Ok(())
    }

    /// Reset after a user withdrawal of committed profit. The channel link stays.
    pub async fn record_withdrawal(
        &self,
        guard: &AccountGuard,
        account: &mut CustodialAccount,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        ensure_guarded(guard, account)?;
        Self::clear_commitments(account, now);
        self.save_with_fresh_key(account).await?;

        info!("Account {} reset after withdrawal", account.id);
        Ok(())
    }

    /// Reset after a full liquidation: unlinked, requests dropped, inactive
    pub async fn record_liquidation(
        &self,
        guard: &AccountGuard,
        account: &mut CustodialAccount,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        ensure_guarded(guard, account)?;
        Self::clear_commitments(account, now);
        account.channel_id = None;
        account.is_active = false;

        let deleted = self.store.delete_requests(account.id).await?;
        self.save_with_fresh_key(account).await?;

        info!(
            "Account {} liquidated, {} request(s) deleted",
            account.id, deleted
        );
        Ok(())
    }

    /// Administrative reactivation
    pub async fn reactivate(
        &self,
        guard: &AccountGuard,
        account: &mut CustodialAccount,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        ensure_guarded(guard, account)?;
        account.is_active = true;
        account.missed_reminders = 0;
        account.last_reminder_at = Some(now);
        self.store.update_account(account).await?;

        info!("Account {} reactivated", account.id);
        Ok(())
    }

    /// Persist an account whose access key was just rotated, drawing another
    /// key while the drawn one belongs to someone else
    async fn save_with_fresh_key(&self, account: &mut CustodialAccount) -> AppResult<()> {
        for _ in 1..KEY_ATTEMPTS {
            match self.store.update_account(account).await {
                Err(AppError::Ledger(LedgerError::AccessKeyTaken)) => {
                    warn!("Rotated access key of account {} is taken, drawing again", account.id);
                    account.access_key = generate_access_key();
                }
                result => return result,
            }
        }
        self.store.update_account(account).await
    }

    /// Account other than `except` currently bound to `channel_id`
    async fn channel_holder(&self, channel_id: &str, except: Uuid) -> AppResult<Option<Uuid>> {
        Ok(self
            .store
            .find_by_channel(channel_id)
            .await?
            .map(|a| a.id)
            .filter(|id| *id != except))
    }

    /// Guards for `first` and optionally `second`, always acquired in id order
    async fn lock_pair(&self, first: Uuid, second: Option<Uuid>) -> (AccountGuard, Option<AccountGuard>) {
        match second {
            Some(second) if second < first => {
                let second_guard = self.lock(second).await;
                (self.lock(first).await, Some(second_guard))
            }
            Some(second) => {
                let first_guard = self.lock(first).await;
                (first_guard, Some(self.lock(second).await))
            }
            None => (self.lock(first).await, None),
        }
    }

    fn clear_commitments(account: &mut CustodialAccount, now: DateTime<Utc>) {
        account.profit_committed = Decimal::ZERO;
        account.missed_reminders = 0;
        account.access_key = generate_access_key();
        account.last_withdrawal_at = Some(now);
        account.last_reminder_at = Some(now);
    }
}

fn ensure_guarded(guard: &AccountGuard, account: &CustodialAccount) -> AppResult<()> {
    if guard.account_id() != account.id {
        return Err(AppError::Internal(format!(
            "Account {} modified under the lock of {}",
            account.id,
            guard.account_id()
        )));
    }
    Ok(())
}
