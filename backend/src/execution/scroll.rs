use alloy::consensus::BlockHeader;
use alloy::eips::BlockNumberOrTag;
use alloy::network::{EthereumWallet, ReceiptResponse, TransactionBuilder};
use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::providers::{DynProvider, Provider, ProviderBuilder};
use alloy::rpc::types::TransactionRequest;
use alloy::signers::local::PrivateKeySigner;
use alloy::sol_types::SolCall;
use alloy::transports::http::reqwest::Url;
use async_trait::async_trait;
use tracing::{debug, info};

use super::chain::{
    signer_from_key, ChainClient, ContractCall, IL1GasOracle, ILendingPool, TxSender, IERC20,
};
use crate::config::Config;
use crate::error::{AppError, AppResult, ChainError};

fn rpc_error(context: &str, e: impl std::fmt::Display) -> AppError {
    ChainError::UpstreamRpc(format!("{}: {}", context, e)).into()
}

/// JSON-RPC client for Scroll, holding the treasury signer.
///
/// Custodial transactions get a short-lived wallet provider per submission;
/// the treasury provider is built once.
pub struct ScrollClient {
    rpc_url: Url,
    chain_id: u64,
    treasury_address: Address,
    reader: DynProvider,
    treasury: DynProvider,
}

impl ScrollClient {
    pub fn new(rpc_url: &str, chain_id: u64, treasury_key: &str) -> AppResult<Self> {
        let rpc_url: Url = rpc_url
            .parse()
            .map_err(|e| AppError::Config(format!("Invalid RPC_URL: {}", e)))?;

        let treasury_signer = signer_from_key(treasury_key)
            .map_err(|_| AppError::Config("TREASURY_PRIVATE_KEY is not a valid key".to_string()))?;
        let treasury_address = treasury_signer.address();

        let reader = ProviderBuilder::new().connect_http(rpc_url.clone()).erased();
        let treasury = ProviderBuilder::new()
            .wallet(EthereumWallet::from(treasury_signer))
            .connect_http(rpc_url.clone())
            .erased();

        info!(
            "Scroll client ready (chain {}, treasury {})",
            chain_id, treasury_address
        );

        Ok(Self {
            rpc_url,
            chain_id,
            treasury_address,
            reader,
            treasury,
        })
    }

    pub fn from_config(config: &Config) -> AppResult<Self> {
        Self::new(&config.rpc_url, config.chain_id, &config.treasury_private_key)
    }

    fn custodial_provider(&self, signer: &PrivateKeySigner) -> DynProvider {
        ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer.clone()))
            .connect_http(self.rpc_url.clone())
            .erased()
    }

    fn request(call: &ContractCall) -> TransactionRequest {
        TransactionRequest::default()
            .with_from(call.from)
            .with_to(call.to)
            .with_input(call.input.clone())
            .with_value(call.value)
    }

    async fn view(&self, to: Address, input: Vec<u8>) -> AppResult<Bytes> {
        let request = TransactionRequest::default()
            .with_to(to)
            .with_input(Bytes::from(input));
        self.reader
            .call(request)
            .await
            .map_err(|e| rpc_error("eth_call failed", e))
    }
}

#[async_trait]
impl ChainClient for ScrollClient {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn treasury_address(&self) -> Address {
        self.treasury_address
    }

    async fn native_balance(&self, owner: Address) -> AppResult<U256> {
        self.reader
            .get_balance(owner)
            .await
            .map_err(|e| rpc_error("eth_getBalance failed", e))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> AppResult<U256> {
        let output = self
            .view(token, IERC20::balanceOfCall { owner }.abi_encode())
            .await?;
        IERC20::balanceOfCall::abi_decode_returns(&output)
            .map_err(|e| rpc_error("balanceOf decode failed", e))
    }

    async fn reserve_pool_token(&self, pool: Address, asset: Address) -> AppResult<Address> {
        let output = self
            .view(pool, ILendingPool::getReserveDataCall { asset }.abi_encode())
            .await?;
        let reserve = ILendingPool::getReserveDataCall::abi_decode_returns(&output)
            .map_err(|e| rpc_error("getReserveData decode failed", e))?;
        Ok(reserve.aTokenAddress)
    }

    async fn l1_data_fee(&self, oracle: Address, unsigned_tx: Bytes) -> AppResult<U256> {
        let output = self
            .view(oracle, IL1GasOracle::getL1FeeCall { data: unsigned_tx }.abi_encode())
            .await?;
        IL1GasOracle::getL1FeeCall::abi_decode_returns(&output)
            .map_err(|e| rpc_error("getL1Fee decode failed", e))
    }

    async fn estimate_gas(&self, call: &ContractCall) -> AppResult<u64> {
        self.reader
            .estimate_gas(Self::request(call))
            .await
            .map_err(|e| rpc_error("eth_estimateGas failed", e))
    }

    async fn max_fee_per_gas(&self) -> AppResult<Option<u128>> {
        let block = self
            .reader
            .get_block_by_number(BlockNumberOrTag::Latest)
            .await
            .map_err(|e| rpc_error("eth_getBlockByNumber failed", e))?;

        let base_fee = match block.and_then(|b| b.header.base_fee_per_gas()) {
            Some(base_fee) => base_fee,
            None => return Ok(None),
        };

        let priority_fee = self
            .reader
            .get_max_priority_fee_per_gas()
            .await
            .map_err(|e| rpc_error("eth_maxPriorityFeePerGas failed", e))?;

        Ok(Some(u128::from(base_fee) * 2 + priority_fee))
    }

    async fn submit(&self, sender: TxSender<'_>, call: ContractCall) -> AppResult<B256> {
        let operation = call.operation;
        let request = Self::request(&call);

        let pending = match sender {
            TxSender::Treasury => self.treasury.send_transaction(request).await,
            TxSender::Custodial(signer) => {
                self.custodial_provider(signer)
                    .send_transaction(request)
                    .await
            }
        }
        .map_err(|e| rpc_error(&format!("{} submission failed", operation), e))?;

        let tx_hash = *pending.tx_hash();
        debug!("{} broadcast from {} (tx: {})", operation, call.from, tx_hash);
        Ok(tx_hash)
    }

    async fn receipt_status(&self, tx_hash: B256) -> AppResult<Option<bool>> {
        let receipt = self
            .reader
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| rpc_error("eth_getTransactionReceipt failed", e))?;
        Ok(receipt.map(|r| r.status()))
    }
}
