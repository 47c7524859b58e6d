use alloy::primitives::{Address, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::chain::{ChainClient, ContractAddresses, ContractCall, TxSender};
use super::confirm::{wait_for_confirmation, ConfirmationPolicy};
use super::funder::WalletFunder;
use super::gas::GasEstimator;
use super::units::{from_base_units, parse_address, to_base_units};
use crate::error::{AppResult, ChainError};

/// Hashes of a completed deposit sequence
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositReceipt {
    pub amount: U256,
    pub approve_tx: B256,
    pub supply_tx: B256,
}

/// Sequences multi-step pool operations for custodial wallets.
///
/// Every step is estimate -> fund -> submit -> confirm. A failing step aborts
/// the sequence; earlier confirmed steps stay on-chain and the sequence is
/// safe to run again.
pub struct TransactionExecutor {
    chain: Arc<dyn ChainClient>,
    estimator: GasEstimator,
    funder: Arc<WalletFunder>,
    contracts: ContractAddresses,
    policy: ConfirmationPolicy,
    token_decimals: u32,
}

impl TransactionExecutor {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        funder: Arc<WalletFunder>,
        contracts: ContractAddresses,
        policy: ConfirmationPolicy,
        token_decimals: u32,
    ) -> Self {
        Self {
            estimator: GasEstimator::new(chain.clone(), contracts.l1_gas_oracle),
            chain,
            funder,
            contracts,
            policy,
            token_decimals,
        }
    }

    /// Approve then supply the wallet's entire token balance.
    ///
    /// A zero balance submits nothing and returns `None`.
    #[instrument(skip(self, signer), fields(wallet = %signer.address()))]
    pub async fn deposit(&self, signer: &PrivateKeySigner) -> AppResult<Option<DepositReceipt>> {
        let owner = signer.address();
        let balance = self.chain.token_balance(self.contracts.token, owner).await?;

        if balance.is_zero() {
            info!("⏭️ Wallet {} has no token balance, nothing to deposit", owner);
            return Ok(None);
        }

        info!("🔄 Depositing {} token units from {}", balance, owner);

        let approve = ContractCall::approve(owner, self.contracts.token, self.contracts.pool, balance);
        let approve_tx = self.run_step(signer, approve).await?;

        let supply = ContractCall::supply(owner, self.contracts.pool, self.contracts.token, balance, owner);
        let supply_tx = self.run_step(signer, supply).await?;

        info!("✓ Deposit complete for {} (supply tx: {})", owner, supply_tx);

        Ok(Some(DepositReceipt {
            amount: balance,
            approve_tx,
            supply_tx,
        }))
    }

    /// Withdraw `amount` of the underlying token from the pool to `destination`.
    ///
    /// The address is validated and the pool balance checked before any gas
    /// is spent.
    #[instrument(skip(self, signer), fields(wallet = %signer.address()))]
    pub async fn withdraw(
        &self,
        signer: &PrivateKeySigner,
        amount: Decimal,
        destination: &str,
    ) -> AppResult<B256> {
        let to = parse_address(destination)?;
        let owner = signer.address();

        let deposited = self.chain.token_balance(self.contracts.pool_token, owner).await?;
        let requested = to_base_units(amount, self.token_decimals)?;

        if requested > deposited {
            warn!(
                "Withdrawal of {} rejected for {}: pool balance is {}",
                requested, owner, deposited
            );
            return Err(ChainError::InsufficientBalance {
                required: amount.to_string(),
                available: from_base_units(deposited, self.token_decimals)?.to_string(),
            }
            .into());
        }

        let call = ContractCall::withdraw(owner, self.contracts.pool, self.contracts.token, requested, to);
        let tx_hash = self.run_step(signer, call).await?;

        info!("✓ Withdrew {} from {} to {} (tx: {})", amount, owner, to, tx_hash);
        Ok(tx_hash)
    }

    /// Current value of the wallet's pool position, in token units
    pub async fn withdrawable_balance(&self, owner: Address) -> AppResult<Decimal> {
        let raw = self.chain.token_balance(self.contracts.pool_token, owner).await?;
        from_base_units(raw, self.token_decimals)
    }

    /// Move `amount` of the underlying token from the treasury into a fresh wallet
    pub async fn fund_principal(&self, owner: Address, amount: Decimal) -> AppResult<Option<B256>> {
        let required = to_base_units(amount, self.token_decimals)?;
        self.funder.ensure_token(self.contracts.token, owner, required).await
    }

    /// Smallest-unit precision of the underlying token
    pub fn token_decimals(&self) -> u32 {
        self.token_decimals
    }

    async fn run_step(&self, signer: &PrivateKeySigner, call: ContractCall) -> AppResult<B256> {
        let operation = call.operation;
        let estimate = self.estimator.estimate(&call).await?;

        self.funder.ensure_native(call.from, estimate.required).await?;

        let tx_hash = self.chain.submit(TxSender::Custodial(signer), call).await?;
        info!("📤 Submitted {} (tx: {})", operation, tx_hash);

        wait_for_confirmation(self.chain.as_ref(), tx_hash, self.policy).await?;
        Ok(tx_hash)
    }
}
