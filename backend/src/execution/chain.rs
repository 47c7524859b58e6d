use alloy::primitives::{Address, Bytes, B256, U256};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;

use crate::config::Config;
use crate::error::{AppError, AppResult, ChainError};

// ABI bindings for the only contracts the service talks to
sol! {
    interface IERC20 {
        function balanceOf(address owner) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
        function transfer(address to, uint256 amount) external returns (bool);
    }

    struct ReserveConfigurationMap {
        uint256 data;
    }

    struct ReserveData {
        ReserveConfigurationMap configuration;
        uint128 liquidityIndex;
        uint128 currentLiquidityRate;
        uint128 variableBorrowIndex;
        uint128 currentVariableBorrowRate;
        uint128 currentStableBorrowRate;
        uint40 lastUpdateTimestamp;
        uint16 id;
        address aTokenAddress;
        address stableDebtTokenAddress;
        address variableDebtTokenAddress;
        address interestRateStrategyAddress;
        uint128 accruedToTreasury;
        uint128 unbacked;
        uint128 isolationModeTotalDebt;
    }

    interface ILendingPool {
        function getReserveData(address asset) external view returns (ReserveData memory);
        function supply(address asset, uint256 amount, address onBehalfOf, uint16 referralCode) external;
        function withdraw(address asset, uint256 amount, address to) external returns (uint256);
    }

    interface IL1GasOracle {
        function getL1Fee(bytes memory data) external view returns (uint256);
    }
}

/// Deployed addresses the service is bound to
#[derive(Debug, Clone, Copy)]
pub struct ContractAddresses {
    /// Underlying token (USDC)
    pub token: Address,
    /// Yield-bearing pool deposit token
    pub pool_token: Address,
    pub pool: Address,
    pub l1_gas_oracle: Address,
}

impl ContractAddresses {
    pub fn from_config(config: &Config) -> AppResult<Self> {
        let parse = |name: &str, value: &str| {
            Address::from_str(value)
                .map_err(|e| AppError::Config(format!("Invalid {} address {}: {}", name, value, e)))
        };

        Ok(Self {
            token: parse("USDC_ADDRESS", &config.usdc_address)?,
            pool_token: parse("ATOKEN_ADDRESS", &config.atoken_address)?,
            pool: parse("POOL_ADDRESS", &config.pool_address)?,
            l1_gas_oracle: parse("L1_GAS_ORACLE_ADDRESS", &config.l1_gas_oracle_address)?,
        })
    }
}

/// The operation kinds submitted on-chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Approve,
    Supply,
    Withdraw,
    TokenTransfer,
    NativeTransfer,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Approve => "approve",
            Operation::Supply => "supply",
            Operation::Withdraw => "withdraw",
            Operation::TokenTransfer => "transfer",
            Operation::NativeTransfer => "native-transfer",
        };
        f.write_str(name)
    }
}

/// One unsigned contract call (or plain value transfer)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractCall {
    pub operation: Operation,
    pub from: Address,
    pub to: Address,
    pub input: Bytes,
    pub value: U256,
}

impl ContractCall {
    pub fn approve(from: Address, token: Address, spender: Address, amount: U256) -> Self {
        let input = IERC20::approveCall { spender, amount }.abi_encode();
        Self {
            operation: Operation::Approve,
            from,
            to: token,
            input: input.into(),
            value: U256::ZERO,
        }
    }

    pub fn supply(from: Address, pool: Address, asset: Address, amount: U256, on_behalf_of: Address) -> Self {
        let input = ILendingPool::supplyCall {
            asset,
            amount,
            onBehalfOf: on_behalf_of,
            referralCode: 0,
        }
        .abi_encode();
        Self {
            operation: Operation::Supply,
            from,
            to: pool,
            input: input.into(),
            value: U256::ZERO,
        }
    }

    pub fn withdraw(from: Address, pool: Address, asset: Address, amount: U256, to: Address) -> Self {
        let input = ILendingPool::withdrawCall { asset, amount, to }.abi_encode();
        Self {
            operation: Operation::Withdraw,
            from,
            to: pool,
            input: input.into(),
            value: U256::ZERO,
        }
    }

    pub fn token_transfer(from: Address, token: Address, to: Address, amount: U256) -> Self {
        let input = IERC20::transferCall { to, amount }.abi_encode();
        Self {
            operation: Operation::TokenTransfer,
            from,
            to: token,
            input: input.into(),
            value: U256::ZERO,
        }
    }

    pub fn native_transfer(from: Address, to: Address, value: U256) -> Self {
        Self {
            operation: Operation::NativeTransfer,
            from,
            to,
            input: Bytes::new(),
            value,
        }
    }
}

/// Who signs a submitted transaction
pub enum TxSender<'a> {
    Treasury,
    Custodial(&'a PrivateKeySigner),
}

/// Blockchain RPC capability consumed by the orchestrator.
///
/// Implementations only translate; sequencing, funding and confirmation
/// policy live in the execution module.
#[async_trait]
pub trait ChainClient: Send + Sync {
    fn chain_id(&self) -> u64;

    fn treasury_address(&self) -> Address;

    async fn native_balance(&self, owner: Address) -> AppResult<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> AppResult<U256>;

    /// Deposit token the pool mints for `asset`, read from its reserve data
    async fn reserve_pool_token(&self, pool: Address, asset: Address) -> AppResult<Address>;

    /// L1 data fee the fee oracle charges for posting `unsigned_tx`
    async fn l1_data_fee(&self, oracle: Address, unsigned_tx: Bytes) -> AppResult<U256>;

    /// L2 gas units for the call
    async fn estimate_gas(&self, call: &ContractCall) -> AppResult<u64>;

    /// `None` when the node does not report EIP-1559 fee data
    async fn max_fee_per_gas(&self) -> AppResult<Option<u128>>;

    /// Sign and broadcast; returns once the node accepted the transaction
    async fn submit(&self, sender: TxSender<'_>, call: ContractCall) -> AppResult<B256>;

    /// `None` while pending, `Some(success)` once included
    async fn receipt_status(&self, tx_hash: B256) -> AppResult<Option<bool>>;
}

/// Parse a stored custodial key
pub fn signer_from_key(private_key: &str) -> AppResult<PrivateKeySigner> {
    PrivateKeySigner::from_str(private_key).map_err(|_| ChainError::InvalidKey.into())
}
