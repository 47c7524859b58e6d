use alloy::consensus::{SignableTransaction, TxEip1559};
use alloy::primitives::{utils::format_ether, Address, TxKind, U256};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::chain::{ChainClient, ContractCall, Operation};
use crate::error::{AppError, AppResult, ChainError};

/// L1 data-fee buffer: +0.5%
const L1_BUFFER_NUM: u64 = 1005;
const L1_BUFFER_DEN: u64 = 1000;

/// L2 gas-unit buffer: +20%
const L2_BUFFER_NUM: u64 = 120;
const L2_BUFFER_DEN: u64 = 100;

/// Funding needed to execute one call, with raw and buffered parts kept for audit logs.
/// All values are wei except the gas-unit counts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GasEstimate {
    pub operation: Operation,
    pub l1_fee: U256,
    pub l1_fee_buffered: U256,
    pub l2_gas: u64,
    pub l2_gas_buffered: U256,
    pub max_fee_per_gas: u128,
    pub required: U256,
}

impl GasEstimate {
    /// Pure fee arithmetic, integer-only
    pub fn compute(operation: Operation, l1_fee: U256, l2_gas: u64, max_fee_per_gas: u128) -> Self {
        let l1_fee_buffered = l1_fee * U256::from(L1_BUFFER_NUM) / U256::from(L1_BUFFER_DEN);
        let l2_gas_buffered = U256::from(l2_gas) * U256::from(L2_BUFFER_NUM) / U256::from(L2_BUFFER_DEN);
        let required = l1_fee_buffered + l2_gas_buffered * U256::from(max_fee_per_gas);

        Self {
            operation,
            l1_fee,
            l1_fee_buffered,
            l2_gas,
            l2_gas_buffered,
            max_fee_per_gas,
            required,
        }
    }
}

/// Combines the L1 data-fee oracle read with the L2 gas estimate
pub struct GasEstimator {
    chain: Arc<dyn ChainClient>,
    oracle: Address,
}

impl GasEstimator {
    pub fn new(chain: Arc<dyn ChainClient>, oracle: Address) -> Self {
        Self { chain, oracle }
    }

    /// Native-token amount the sender must hold to execute `call`.
    ///
    /// Any failing read aborts with `GasEstimationFailed` carrying the cause.
    /// A network without EIP-1559 fee data fails with `GasPriceUnavailable`.
    #[instrument(skip(self, call), fields(operation = %call.operation, from = %call.from))]
    pub async fn estimate(&self, call: &ContractCall) -> AppResult<GasEstimate> {
        let operation = call.operation;
        let failed = |source: AppError| -> AppError {
            ChainError::GasEstimationFailed {
                operation: operation.to_string(),
                source: Box::new(source),
            }
            .into()
        };

        let unsigned = self.unsigned_payload(call);
        let l1_fee = self
            .chain
            .l1_data_fee(self.oracle, unsigned.into())
            .await
            .map_err(failed)?;

        let l2_gas = self.chain.estimate_gas(call).await.map_err(failed)?;

        let max_fee_per_gas = self
            .chain
            .max_fee_per_gas()
            .await
            .map_err(failed)?
            .ok_or(ChainError::GasPriceUnavailable)?;

        let estimate = GasEstimate::compute(operation, l1_fee, l2_gas, max_fee_per_gas);

        debug!(
            "Gas estimate for {}: l1 {} -> {} wei, l2 {} -> {} units at {} wei/unit, required {} ETH",
            operation,
            estimate.l1_fee,
            estimate.l1_fee_buffered,
            estimate.l2_gas,
            estimate.l2_gas_buffered,
            estimate.max_fee_per_gas,
            format_ether(estimate.required)
        );

        Ok(estimate)
    }

    /// RLP payload of the unsigned transaction, as the fee oracle prices it
    fn unsigned_payload(&self, call: &ContractCall) -> Vec<u8> {
        let tx = TxEip1559 {
            chain_id: self.chain.chain_id(),
            to: TxKind::Call(call.to),
            value: call.value,
            input: call.input.clone(),
            ..Default::default()
        };
        tx.encoded_for_signing()
    }
}
