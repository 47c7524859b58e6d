// Wallet Funder - tops custodial wallets up from the treasury
//
// The treasury is the only shared signer in the system. Every treasury
// submission goes through `submit_from_treasury`, which holds one mutex
// from submission until confirmation, so treasury nonces are consumed
// strictly in order.

use alloy::primitives::{utils::format_ether, Address, B256, U256};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, instrument};

use super::chain::{ChainClient, ContractCall, TxSender};
use super::confirm::{wait_for_confirmation, ConfirmationPolicy};
use crate::error::{AppResult, ChainError};

/// Amount to send so that `balance` reaches `required`; zero when already covered
pub fn shortfall(required: U256, balance: U256) -> U256 {
    required.saturating_sub(balance)
}

pub struct WalletFunder {
    chain: Arc<dyn ChainClient>,
    policy: ConfirmationPolicy,
    treasury_lock: Mutex<()>,
}

impl WalletFunder {
    pub fn new(chain: Arc<dyn ChainClient>, policy: ConfirmationPolicy) -> Self {
        Self {
            chain,
            policy,
            treasury_lock: Mutex::new(()),
        }
    }

    /// Guarantee `wallet` holds at least `required` wei of native token.
    ///
    /// Sends exactly the shortfall and waits for it to confirm. Returns the
    /// funding transaction hash, or `None` when no transfer was needed.
    #[instrument(skip(self), fields(wallet = %wallet))]
    pub async fn ensure_native(&self, wallet: Address, required: U256) -> AppResult<Option<B256>> {
        let balance = self.chain.native_balance(wallet).await?;
        let missing = shortfall(required, balance);

        if missing.is_zero() {
            info!(
                "✓ Wallet {} already holds {} ETH (needs {})",
                wallet,
                format_ether(balance),
                format_ether(required)
            );
            return Ok(None);
        }

        let treasury = self.chain.treasury_address();
        let _treasury = self.treasury_lock.lock().await;

        let available = self.chain.native_balance(treasury).await?;
        if available < missing {
            return Err(ChainError::InsufficientBalance {
                required: format_ether(missing),
                available: format_ether(available),
            }
            .into());
        }

        let call = ContractCall::native_transfer(treasury, wallet, missing);
        let tx_hash = self.submit_from_treasury(call).await?;

        info!(
            "💸 Funded wallet {} with {} ETH for gas (tx: {})",
            wallet,
            format_ether(missing),
            tx_hash
        );
        Ok(Some(tx_hash))
    }

    /// Guarantee `wallet` holds at least `required` smallest units of `token`.
    /// Used at signup to move the principal into a fresh custodial wallet.
    #[instrument(skip(self), fields(wallet = %wallet))]
    pub async fn ensure_token(
        &self,
        token: Address,
        wallet: Address,
        required: U256,
    ) -> AppResult<Option<B256>> {
        let balance = self.chain.token_balance(token, wallet).await?;
        let missing = shortfall(required, balance);

        if missing.is_zero() {
            info!("✓ Wallet {} already holds the required token balance", wallet);
            return Ok(None);
        }

        let treasury = self.chain.treasury_address();
        let _treasury = self.treasury_lock.lock().await;

        let available = self.chain.token_balance(token, treasury).await?;
        if available < missing {
            return Err(ChainError::InsufficientBalance {
                required: missing.to_string(),
                available: available.to_string(),
            }
            .into());
        }

        let call = ContractCall::token_transfer(treasury, token, wallet, missing);
        let tx_hash = self.submit_from_treasury(call).await?;

        info!(
            "💸 Transferred {} token units to wallet {} (tx: {})",
            missing, wallet, tx_hash
        );
        Ok(Some(tx_hash))
    }

    /// Caller holds `treasury_lock` until this returns
    async fn submit_from_treasury(&self, call: ContractCall) -> AppResult<B256> {
        let tx_hash = self.chain.submit(TxSender::Treasury, call).await?;
        wait_for_confirmation(self.chain.as_ref(), tx_hash, self.policy).await?;
        Ok(tx_hash)
    }
}
