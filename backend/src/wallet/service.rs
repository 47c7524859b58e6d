use alloy::primitives::{Address, B256};
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::keys::{generate_access_key, generate_wallet};
use crate::error::{AppError, AppResult, LedgerError};
use crate::execution::chain::signer_from_key;
use crate::execution::units::parse_address;
use crate::execution::{DepositReceipt, TransactionExecutor};
use crate::ledger::models::{CustodialAccount, NewAccount};
use crate::ledger::CommitmentLedger;

const KEY_ATTEMPTS: u32 = 5;

/// Result of a signup call
#[derive(Debug)]
pub struct SignupOutcome {
    pub account: CustodialAccount,
    pub created: bool,
    pub funding_tx: Option<B256>,
    pub deposit: Option<DepositReceipt>,
}

/// Yield figures for one account, as the scheduler computes them
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct YieldPreview {
    pub withdrawable: Decimal,
    pub committed: Decimal,
    pub available: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Withdrawal {
    pub account_id: Uuid,
    pub amount: Decimal,
    pub destination: String,
    pub tx_hash: B256,
}

/// Account-level operations that combine the ledger with on-chain execution
pub struct AccountService {
    ledger: Arc<CommitmentLedger>,
    executor: Arc<TransactionExecutor>,
    withdrawal_interval: chrono::Duration,
}

impl AccountService {
    pub fn new(
        ledger: Arc<CommitmentLedger>,
        executor: Arc<TransactionExecutor>,
        withdrawal_interval: chrono::Duration,
    ) -> Self {
        Self {
            ledger,
            executor,
            withdrawal_interval,
        }
    }

    /// Create a custodial account and deposit its principal into the pool.
    ///
    /// A new account is persisted before the chain is touched, so a failed
    /// deposit never loses the wallet key. Signing up an existing username
    /// re-drives its onboarding: only the part of the principal not yet in the
    /// pool is funded and supplied, so a completed signup submits nothing.
    #[instrument(skip(self))]
    pub async fn create_account(&self, username: &str, initial_principal: Decimal) -> AppResult<SignupOutcome> {
        if let Some(existing) = self.ledger.store().find_by_username(username).await? {
            info!("Account {} already exists for {}", existing.id, username);
            let guard = self.ledger.lock(existing.id).await;
            let account = self.ledger.load(&guard).await?;

            // Withdrawn or liquidated accounts are never topped up again
            if account.last_withdrawal_at.is_some() {
                return Ok(SignupOutcome {
                    account,
                    created: false,
                    funding_tx: None,
                    deposit: None,
                });
            }

            let (funding_tx, deposit) = self.onboard(&account).await?;
            return Ok(SignupOutcome {
                account,
                created: false,
                funding_tx,
                deposit,
            });
        }

        let account = self.insert_account(username, initial_principal).await?;

        let _guard = self.ledger.lock(account.id).await;
        let (funding_tx, deposit) = self.onboard(&account).await?;

        info!(
            "✅ Account {} ({}) onboarded with principal {}",
            account.id, username, initial_principal
        );

        Ok(SignupOutcome {
            account,
            created: true,
            funding_tx,
            deposit,
        })
    }

    /// Persist a fresh wallet, drawing another access key on a collision
    async fn insert_account(&self, username: &str, initial_principal: Decimal) -> AppResult<CustodialAccount> {
        let wallet = generate_wallet();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let created = self
                .ledger
                .store()
                .create_account(NewAccount {
                    username: username.to_string(),
                    access_key: generate_access_key(),
                    wallet_address: wallet.address.clone(),
                    wallet_private_key: wallet.private_key.clone(),
                    initial_principal,
                })
                .await;

            match created {
                Err(AppError::Ledger(LedgerError::AccessKeyTaken)) if attempts < KEY_ATTEMPTS => {
                    warn!("Access key drawn for {} is taken, drawing again", username);
                }
                result => return result,
            }
        }
    }

    /// Fund and supply whatever part of the principal is not in the pool yet
    async fn onboard(&self, account: &CustodialAccount) -> AppResult<(Option<B256>, Option<DepositReceipt>)> {
        let signer = signer_from_key(&account.wallet_private_key)?;
        let supplied = self.executor.withdrawable_balance(signer.address()).await?;
        let outstanding = (account.initial_principal - supplied).max(Decimal::ZERO);

        let funding_tx = if outstanding.is_zero() {
            None
        } else {
            self.executor
                .fund_principal(signer.address(), outstanding)
                .await?
        };
        let deposit = self.executor.deposit(&signer).await?;
        Ok((funding_tx, deposit))
    }

    pub async fn get_account(&self, account_id: Uuid) -> AppResult<CustodialAccount> {
        self.ledger
            .store()
            .get_account(account_id)
            .await?
            .ok_or_else(|| LedgerError::AccountNotFound.into())
    }

    pub async fn preview_yield(&self, account_id: Uuid) -> AppResult<YieldPreview> {
        let account = self.get_account(account_id).await?;
        let withdrawable = self.withdrawable_of(&account).await?;

        Ok(YieldPreview {
            withdrawable,
            committed: account.profit_committed,
            available: account.uncommitted_yield(withdrawable),
        })
    }

    /// Current pool position of the account's wallet
    pub async fn withdrawable_of(&self, account: &CustodialAccount) -> AppResult<Decimal> {
        let owner = Address::from_str(&account.wallet_address).map_err(|e| {
            AppError::Internal(format!(
                "Stored wallet address of {} is invalid: {}",
                account.id, e
            ))
        })?;
        self.executor.withdrawable_balance(owner).await
    }

    /// User-triggered withdrawal of committed profit to `destination`.
    ///
    /// Checks run in order: linked account, withdrawal spacing, committed
    /// profit, destination address. The whole operation holds the account's
    /// lock so a reply cannot be credited and then wiped by the reset.
    #[instrument(skip(self))]
    pub async fn withdraw_committed(
        &self,
        channel_id: &str,
        destination: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Withdrawal> {
        let account = self
            .ledger
            .store()
            .find_by_channel(channel_id)
            .await?
            .ok_or(LedgerError::AccountNotFound)?;

        let guard = self.ledger.lock(account.id).await;
        let mut account = self.ledger.load(&guard).await?;
        if account.channel_id.as_deref() != Some(channel_id) {
            return Err(LedgerError::AccountNotFound.into());
        }

        if !account.can_withdraw_at(now, self.withdrawal_interval) {
            return Err(LedgerError::WithdrawalTooSoon.into());
        }

        let amount = self.payable(account.profit_committed);
        if amount <= Decimal::ZERO {
            return Err(LedgerError::NoCommittedProfit.into());
        }

        parse_address(destination)?;

        let signer = signer_from_key(&account.wallet_private_key)?;
        let tx_hash = self.executor.withdraw(&signer, amount, destination).await?;

        self.ledger.record_withdrawal(&guard, &mut account, now).await?;

        info!(
            "💰 Account {} withdrew {} to {} (tx: {})",
            account.id, amount, destination, tx_hash
        );

        Ok(Withdrawal {
            account_id: account.id,
            amount,
            destination: destination.to_string(),
            tx_hash,
        })
    }

    /// Administrative exit: withdraw principal plus committed profit, then
    /// unlink and deactivate the account.
    #[instrument(skip(self))]
    pub async fn liquidate(
        &self,
        account_id: Uuid,
        destination: &str,
        now: DateTime<Utc>,
    ) -> AppResult<Withdrawal> {
        let destination_address = parse_address(destination)?;

        let guard = self.ledger.lock(account_id).await;
        let mut account = self.ledger.load(&guard).await?;

        let amount = self.payable(account.initial_principal + account.profit_committed);
        let signer = signer_from_key(&account.wallet_private_key)?;
        let tx_hash = self.executor.withdraw(&signer, amount, destination).await?;

        self.ledger.record_liquidation(&guard, &mut account, now).await?;

        info!(
            "💰 Account {} liquidated: {} to {} (tx: {})",
            account.id, amount, destination_address, tx_hash
        );

        Ok(Withdrawal {
            account_id: account.id,
            amount,
            destination: destination.to_string(),
            tx_hash,
        })
    }

    /// Reactivate an account and clear its missed reminders
    pub async fn reset(&self, account_id: Uuid, now: DateTime<Utc>) -> AppResult<CustodialAccount> {
        let guard = self.ledger.lock(account_id).await;
        let mut account = self.ledger.load(&guard).await?;
        self.ledger.reactivate(&guard, &mut account, now).await?;
        Ok(account)
    }

    /// Amount the token can actually carry: truncated to its precision
    fn payable(&self, amount: Decimal) -> Decimal {
        amount.round_dp_with_strategy(self.executor.token_decimals(), RoundingStrategy::ToZero)
    }
}
