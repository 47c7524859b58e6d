//! Scripted collaborators for unit tests

use alloy::primitives::{address, Address, Bytes, B256, U256};
use alloy::sol_types::SolCall;
use async_trait::async_trait;
use parking_lot::Mutex;
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, AppResult, ChainError};
use crate::execution::chain::{
    ChainClient, ContractAddresses, ContractCall, ILendingPool, Operation, TxSender, IERC20,
};
use crate::execution::confirm::ConfirmationPolicy;
use crate::execution::{TransactionExecutor, WalletFunder};
use crate::ledger::memory::MemoryStore;
use crate::ledger::models::CustodialAccount;
use crate::ledger::CommitmentLedger;
use crate::messaging::Messenger;
use crate::wallet::AccountService;

pub const TREASURY: Address = address!("7e5f4552091a69125d5dfcb7b8c2659029395bdf");

pub fn test_contracts() -> ContractAddresses {
    ContractAddresses {
        token: address!("06efdbff2a14a7c8e15944d1f4a48f9f95f663a4"),
        pool_token: address!("1d738a3436a8c49ceffbab7fbf04b660fb528cbd"),
        pool: address!("11fcfe756c05ad438e312a7fd934381537d3cffe"),
        l1_gas_oracle: address!("5300000000000000000000000000000000000002"),
    }
}

pub fn fast_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        timeout: Duration::from_millis(200),
        poll_interval: Duration::from_millis(2),
    }
}

#[derive(Debug, Clone)]
pub struct Submission {
    pub sender: Address,
    pub call: ContractCall,
    pub tx_hash: B256,
}

struct MockState {
    native: HashMap<Address, U256>,
    tokens: HashMap<(Address, Address), U256>,
    l1_fee: U256,
    gas_units: u64,
    max_fee: Option<u128>,
    fail_all_estimates: bool,
    fail_estimates_for: HashSet<Operation>,
    failing_balance_owners: HashSet<Address>,
    balance_delay: Option<Duration>,
    hold_receipts: bool,
    revert_submissions: bool,
    estimate_calls: usize,
    last_l1_payload: Option<Bytes>,
    submissions: Vec<Submission>,
    receipts: HashMap<B256, bool>,
    treasury_inflight: HashSet<B256>,
    max_inflight_treasury: usize,
}

/// In-memory chain: balances move the way the real contracts move them and
/// every custodial submission burns its unbuffered gas cost.
pub struct MockChain {
    pub treasury: Address,
    pub contracts: ContractAddresses,
    state: Mutex<MockState>,
}

impl MockChain {
    pub fn new() -> Self {
        let contracts = test_contracts();
        let mut native = HashMap::new();
        native.insert(TREASURY, U256::from(10u64).pow(U256::from(21u64)));
        let mut tokens = HashMap::new();
        tokens.insert((contracts.token, TREASURY), U256::from(1_000_000_000_000u64));

        Self {
            treasury: TREASURY,
            contracts,
            state: Mutex::new(MockState {
                native,
                tokens,
                l1_fee: U256::from(1_000u64),
                gas_units: 21_000,
                max_fee: Some(1),
                fail_all_estimates: false,
                fail_estimates_for: HashSet::new(),
                failing_balance_owners: HashSet::new(),
                balance_delay: None,
                hold_receipts: false,
                revert_submissions: false,
                estimate_calls: 0,
                last_l1_payload: None,
                submissions: Vec::new(),
                receipts: HashMap::new(),
                treasury_inflight: HashSet::new(),
                max_inflight_treasury: 0,
            }),
        }
    }

    pub fn set_native(&self, owner: Address, amount: U256) {
        self.state.lock().native.insert(owner, amount);
    }

    pub fn set_token(&self, token: Address, owner: Address, amount: U256) {
        self.state.lock().tokens.insert((token, owner), amount);
    }

    pub fn native_of(&self, owner: Address) -> U256 {
        self.state.lock().native.get(&owner).copied().unwrap_or_default()
    }

    pub fn token_of(&self, token: Address, owner: Address) -> U256 {
        self.state
            .lock()
            .tokens
            .get(&(token, owner))
            .copied()
            .unwrap_or_default()
    }

    pub fn set_fees(&self, l1_fee: U256, gas_units: u64, max_fee: Option<u128>) {
        let mut state = self.state.lock();
        state.l1_fee = l1_fee;
        state.gas_units = gas_units;
        state.max_fee = max_fee;
    }

    pub fn fail_estimates(&self, fail: bool) {
        self.state.lock().fail_all_estimates = fail;
    }

    pub fn fail_estimates_for(&self, operation: Operation) {
        self.state.lock().fail_estimates_for.insert(operation);
    }

    pub fn clear_estimate_failures(&self) {
        let mut state = self.state.lock();
        state.fail_all_estimates = false;
        state.fail_estimates_for.clear();
    }

    pub fn fail_balance_reads_for(&self, owner: Address) {
        self.state.lock().failing_balance_owners.insert(owner);
    }

    /// Every token balance read sleeps this long first
    pub fn delay_balance_reads(&self, delay: Duration) {
        self.state.lock().balance_delay = Some(delay);
    }

    pub fn hold_receipts(&self, hold: bool) {
        self.state.lock().hold_receipts = hold;
    }

    pub fn revert_submissions(&self, revert: bool) {
        self.state.lock().revert_submissions = revert;
    }

    pub fn estimate_calls(&self) -> usize {
        self.state.lock().estimate_calls
    }

    pub fn last_l1_payload(&self) -> Option<Bytes> {
        self.state.lock().last_l1_payload.clone()
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.lock().submissions.clone()
    }

    pub fn submissions_of(&self, operation: Operation) -> Vec<Submission> {
        self.submissions()
            .into_iter()
            .filter(|s| s.call.operation == operation)
            .collect()
    }

    /// Most treasury transactions ever submitted but not yet confirmed at once
    pub fn max_inflight_treasury(&self) -> usize {
        self.state.lock().max_inflight_treasury
    }
}

impl Default for MockChain {
    fn default() -> Self {
        Self::new()
    }
}

fn debit(map: &mut HashMap<(Address, Address), U256>, key: (Address, Address), amount: U256) {
    let entry = map.entry(key).or_default();
    *entry = entry.saturating_sub(amount);
}

fn credit(map: &mut HashMap<(Address, Address), U256>, key: (Address, Address), amount: U256) {
    *map.entry(key).or_default() += amount;
}

impl MockState {
    fn apply(&mut self, contracts: &ContractAddresses, sender: Address, call: &ContractCall) {
        match call.operation {
            Operation::NativeTransfer => {
                let from = self.native.entry(sender).or_default();
                *from = from.saturating_sub(call.value);
                *self.native.entry(call.to).or_default() += call.value;
            }
            Operation::TokenTransfer => {
                if let Ok(transfer) = IERC20::transferCall::abi_decode(&call.input) {
                    debit(&mut self.tokens, (call.to, sender), transfer.amount);
                    credit(&mut self.tokens, (call.to, transfer.to), transfer.amount);
                }
            }
            Operation::Approve => {}
            Operation::Supply => {
                if let Ok(supply) = ILendingPool::supplyCall::abi_decode(&call.input) {
                    debit(&mut self.tokens, (supply.asset, sender), supply.amount);
                    credit(
                        &mut self.tokens,
                        (contracts.pool_token, supply.onBehalfOf),
                        supply.amount,
                    );
                }
            }
            Operation::Withdraw => {
                if let Ok(withdraw) = ILendingPool::withdrawCall::abi_decode(&call.input) {
                    debit(&mut self.tokens, (contracts.pool_token, sender), withdraw.amount);
                    credit(&mut self.tokens, (withdraw.asset, withdraw.to), withdraw.amount);
                }
            }
        }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    fn chain_id(&self) -> u64 {
        534352
    }

    fn treasury_address(&self) -> Address {
        self.treasury
    }

    async fn native_balance(&self, owner: Address) -> AppResult<U256> {
        Ok(self.native_of(owner))
    }

    async fn token_balance(&self, token: Address, owner: Address) -> AppResult<U256> {
        let delay = self.state.lock().balance_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.state.lock().failing_balance_owners.contains(&owner) {
            return Err(ChainError::UpstreamRpc("balance read failed".to_string()).into());
        }
        Ok(self.token_of(token, owner))
    }

    async fn reserve_pool_token(&self, _pool: Address, _asset: Address) -> AppResult<Address> {
        Ok(self.contracts.pool_token)
    }

    async fn l1_data_fee(&self, _oracle: Address, unsigned_tx: Bytes) -> AppResult<U256> {
        let mut state = self.state.lock();
        state.estimate_calls += 1;
        if state.fail_all_estimates {
            return Err(ChainError::UpstreamRpc("oracle unreachable".to_string()).into());
        }
        state.last_l1_payload = Some(unsigned_tx);
        Ok(state.l1_fee)
    }

    async fn estimate_gas(&self, call: &ContractCall) -> AppResult<u64> {
        let mut state = self.state.lock();
        state.estimate_calls += 1;
        if state.fail_all_estimates || state.fail_estimates_for.contains(&call.operation) {
            return Err(AppError::Chain(ChainError::UpstreamRpc(format!(
                "execution reverted: {}",
                call.operation
            ))));
        }
        Ok(state.gas_units)
    }

    async fn max_fee_per_gas(&self) -> AppResult<Option<u128>> {
        Ok(self.state.lock().max_fee)
    }

    async fn submit(&self, sender: TxSender<'_>, call: ContractCall) -> AppResult<B256> {
        let sender_address = match sender {
            TxSender::Treasury => self.treasury,
            TxSender::Custodial(signer) => signer.address(),
        };

        let mut state = self.state.lock();
        let tx_hash = B256::with_last_byte((state.submissions.len() + 1) as u8);

        if sender_address != self.treasury {
            let cost = state.l1_fee + U256::from(state.gas_units) * U256::from(state.max_fee.unwrap_or(0));
            let balance = state.native.entry(sender_address).or_default();
            *balance = balance.saturating_sub(cost);
        } else {
            state.treasury_inflight.insert(tx_hash);
            state.max_inflight_treasury = state.max_inflight_treasury.max(state.treasury_inflight.len());
        }

        let succeeded = !state.revert_submissions;
        if succeeded {
            state.apply(&self.contracts, sender_address, &call);
        }
        state.receipts.insert(tx_hash, succeeded);
        state.submissions.push(Submission {
            sender: sender_address,
            call,
            tx_hash,
        });
        Ok(tx_hash)
    }

    async fn receipt_status(&self, tx_hash: B256) -> AppResult<Option<bool>> {
        let mut state = self.state.lock();
        if state.hold_receipts {
            return Ok(None);
        }
        let status = state.receipts.get(&tx_hash).copied();
        if status.is_some() {
            state.treasury_inflight.remove(&tx_hash);
        }
        Ok(status)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub channel_id: String,
    pub text: String,
    pub message_id: String,
}

/// Records outbound messages and hands out sequential message ids
#[derive(Default)]
pub struct RecordingMessenger {
    sent: Mutex<Vec<SentMessage>>,
    fail_sends: Mutex<bool>,
}

impl RecordingMessenger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn sent_to(&self, channel_id: &str) -> Vec<SentMessage> {
        self.sent()
            .into_iter()
            .filter(|m| m.channel_id == channel_id)
            .collect()
    }

    pub fn last_text(&self) -> Option<String> {
        self.sent.lock().last().map(|m| m.text.clone())
    }

    pub fn fail_sends(&self, fail: bool) {
        *self.fail_sends.lock() = fail;
    }
}

#[async_trait]
impl Messenger for RecordingMessenger {
    async fn send(&self, channel_id: &str, text: &str) -> AppResult<String> {
        if *self.fail_sends.lock() {
            return Err(AppError::Messaging("channel unavailable".to_string()));
        }

        let mut sent = self.sent.lock();
        let message_id = (sent.len() + 1).to_string();
        sent.push(SentMessage {
            channel_id: channel_id.to_string(),
            text: text.to_string(),
            message_id: message_id.clone(),
        });
        Ok(message_id)
    }
}

/// Ledger, executor and account service wired over a [`MockChain`] and a [`MemoryStore`]
pub struct TestStack {
    pub chain: Arc<MockChain>,
    pub store: Arc<MemoryStore>,
    pub ledger: Arc<CommitmentLedger>,
    pub accounts: Arc<AccountService>,
    pub messenger: Arc<RecordingMessenger>,
}

impl TestStack {
    pub fn new() -> Self {
        let chain = Arc::new(MockChain::new());
        let store = Arc::new(MemoryStore::new());
        let ledger = Arc::new(CommitmentLedger::new(
            store.clone(),
            chrono::Duration::seconds(3600),
        ));
        let funder = Arc::new(WalletFunder::new(chain.clone(), fast_policy()));
        let executor = Arc::new(TransactionExecutor::new(
            chain.clone(),
            funder,
            chain.contracts,
            fast_policy(),
            6,
        ));
        let accounts = Arc::new(AccountService::new(
            ledger.clone(),
            executor,
            chrono::Duration::hours(24),
        ));

        Self {
            chain,
            store,
            ledger,
            accounts,
            messenger: Arc::new(RecordingMessenger::new()),
        }
    }

    /// Sign up `username` with 100 USDC and link it to `channel_id`
    pub async fn linked_account(&self, username: &str, channel_id: &str) -> CustodialAccount {
        let outcome = self
            .accounts
            .create_account(username, Decimal::from(100))
            .await
            .unwrap();
        self.ledger
            .link_channel(&outcome.account.access_key, channel_id, Utc::now())
            .await
            .unwrap()
    }

    /// Grow the account's pool position by `units` base units of interest
    pub fn accrue(&self, account: &CustodialAccount, units: u64) {
        let wallet = Address::from_str(&account.wallet_address).unwrap();
        let pool_token = self.chain.contracts.pool_token;
        let position = self.chain.token_of(pool_token, wallet);
        self.chain
            .set_token(pool_token, wallet, position + U256::from(units));
    }
}

impl Default for TestStack {
    fn default() -> Self {
        Self::new()
    }
}
