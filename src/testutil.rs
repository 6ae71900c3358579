//! In-memory chain, signer and relay fakes shared by unit tests

use crate::chain::{ChainEndpoint, ChainPair, ChainReader, ChainRegistry, GasPrice, TransactionSigner};
use crate::contracts::{
    AllowanceCall, ApproveCall, BalanceOfCall, ChildToRootTokenCall, DecimalsCall, DepositCall,
    ExitCall, GetTransactionCall, NameCall, RootToChildTokenCall, SymbolCall, TotalSupplyCall,
    TransactionRecord, WithdrawCall,
};
use crate::error::{BridgeError, BridgeResult};
use crate::events::{deposit_log, withdrawal_log};
use crate::relay::{RelayApi, RelayRequest, RelayStatus, TokenPairInfo};
use crate::types::{BridgeTransaction, NewBridgeTransaction};

use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Filter, Log, TransactionReceipt, H256, U256, U64};
use ethers::utils::keccak256;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const ROOT_CHAIN: u64 = 1;
pub const CHILD_CHAIN: u64 = 137;
pub const GAS_USED: u64 = 90_000;
pub const GAS_PRICE_WEI: u64 = 30_000_000_000;

pub fn usdc_root() -> Address {
    Address::repeat_byte(0xa0)
}

pub fn usdc_child() -> Address {
    Address::repeat_byte(0xc0)
}

pub fn user() -> Address {
    Address::repeat_byte(0x05)
}

pub fn recipient() -> Address {
    Address::repeat_byte(0x06)
}

#[derive(Default)]
struct ChainState {
    mappings: HashMap<Address, Address>,
    tokens: HashMap<Address, (String, String, u8, U256)>,
    balances: HashMap<(Address, Address), U256>,
    native: HashMap<Address, U256>,
    allowances: HashMap<(Address, Address, Address), U256>,
    records: HashMap<H256, TransactionRecord>,
    logs: Vec<Log>,
    nonce: u64,
    ignore_approvals: bool,
    revert_next: bool,
}

/// A chain with one bridge contract and a handful of ERC-20 tokens
pub struct FakeChain {
    chain_id: u64,
    bridge: Address,
    state: Mutex<ChainState>,
    calls: AtomicUsize,
    offline: AtomicBool,
}

impl FakeChain {
    pub fn new(chain_id: u64, bridge: Address) -> Arc<Self> {
        Arc::new(Self {
            chain_id,
            bridge,
            state: Mutex::new(ChainState::default()),
            calls: AtomicUsize::new(0),
            offline: AtomicBool::new(false),
        })
    }

    pub fn bridge(&self) -> Address {
        self.bridge
    }

    /// Number of read calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn map_token(&self, from: Address, to: Address) {
        self.state.lock().unwrap().mappings.insert(from, to);
    }

    pub fn unmap_token(&self, from: Address) {
        self.state.lock().unwrap().mappings.remove(&from);
    }

    pub fn add_token(&self, token: Address, name: &str, symbol: &str, decimals: u8) {
        self.state.lock().unwrap().tokens.insert(
            token,
            (name.to_string(), symbol.to_string(), decimals, U256::exp10(12)),
        );
    }

    pub fn set_balance(&self, token: Address, account: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .balances
            .insert((token, account), amount);
    }

    pub fn set_native_balance(&self, account: Address, amount: U256) {
        self.state.lock().unwrap().native.insert(account, amount);
    }

    pub fn set_allowance(&self, token: Address, owner: Address, spender: Address, amount: U256) {
        self.state
            .lock()
            .unwrap()
            .allowances
            .insert((token, owner, spender), amount);
    }

    pub fn set_record(&self, id: H256, record: TransactionRecord) {
        self.state.lock().unwrap().records.insert(id, record);
    }

    pub fn push_log(&self, log: Log) {
        self.state.lock().unwrap().logs.push(log);
    }

    /// Approvals are mined but leave the allowance untouched
    pub fn ignore_approvals(&self) {
        self.state.lock().unwrap().ignore_approvals = true;
    }

    /// The next executed transaction reverts
    pub fn revert_next(&self) {
        self.state.lock().unwrap().revert_next = true;
    }

    fn receipt(&self, state: &mut ChainState, status: u64, logs: Vec<Log>) -> TransactionReceipt {
        state.nonce += 1;
        TransactionReceipt {
            transaction_hash: H256::from(keccak256(
                [self.chain_id.to_be_bytes(), state.nonce.to_be_bytes()].concat(),
            )),
            status: Some(U64::from(status)),
            logs,
            gas_used: Some(U256::from(GAS_USED)),
            effective_gas_price: Some(U256::from(GAS_PRICE_WEI)),
            block_number: Some(U64::from(1_000 + state.nonce)),
            ..Default::default()
        }
    }

    fn next_id(&self, state: &ChainState) -> H256 {
        H256::from(keccak256(
            [b"bridge".to_vec(), self.chain_id.to_be_bytes().to_vec(), state.nonce.to_be_bytes().to_vec()]
                .concat(),
        ))
    }

    /// Apply a signed transaction the way the contracts would
    fn execute(&self, from: Address, tx: &TypedTransaction) -> TransactionReceipt {
        let mut state = self.state.lock().unwrap();
        if state.revert_next {
            state.revert_next = false;
            return self.receipt(&mut state, 0, Vec::new());
        }

        let to = tx.to_addr().copied().unwrap_or_default();
        let data = tx.data().cloned().unwrap_or_default();

        if let Ok(call) = ApproveCall::decode(&data) {
            if !state.ignore_approvals {
                state.allowances.insert((to, from, call.spender), call.amount);
            }
            return self.receipt(&mut state, 1, Vec::new());
        }

        if let Ok(call) = DepositCall::decode(&data) {
            if !call.token.is_zero() {
                let allowance = state
                    .allowances
                    .get(&(call.token, from, self.bridge))
                    .copied()
                    .unwrap_or_default();
                if allowance < call.amount {
                    return self.receipt(&mut state, 0, Vec::new());
                }
            }
            let id = self.next_id(&state);
            state.records.insert(
                id,
                TransactionRecord {
                    token: call.token,
                    sender: from,
                    recipient: call.recipient,
                    amount: call.amount,
                    status: 1,
                },
            );
            let log = deposit_log(self.bridge, call.token, from, call.amount, id, CHILD_CHAIN);
            return self.receipt(&mut state, 1, vec![log]);
        }

        if let Ok(call) = WithdrawCall::decode(&data) {
            let id = self.next_id(&state);
            state.records.insert(
                id,
                TransactionRecord {
                    token: call.token,
                    sender: from,
                    recipient: call.recipient,
                    amount: call.amount,
                    status: 1,
                },
            );
            let log = withdrawal_log(self.bridge, call.token, call.recipient, call.amount, id);
            return self.receipt(&mut state, 1, vec![log]);
        }

        if ExitCall::decode(&data).is_ok() {
            return self.receipt(&mut state, 1, Vec::new());
        }

        self.receipt(&mut state, 1, Vec::new())
    }

    fn ensure_online(&self) -> BridgeResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(BridgeError::ChainConnection {
                chain_id: self.chain_id,
                message: "connection refused".into(),
            });
        }
        Ok(())
    }
}

fn reverted() -> BridgeError {
    BridgeError::Contract("execution reverted".into())
}

#[async_trait]
impl ChainReader for FakeChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        self.ensure_online()?;
        let state = self.state.lock().unwrap();

        if let Ok(call) = RootToChildTokenCall::decode(&data) {
            let mapped = state.mappings.get(&call.root_token).copied().unwrap_or_default();
            return Ok(mapped.encode().into());
        }
        if let Ok(call) = ChildToRootTokenCall::decode(&data) {
            let mapped = state.mappings.get(&call.child_token).copied().unwrap_or_default();
            return Ok(mapped.encode().into());
        }
        if let Ok(call) = GetTransactionCall::decode(&data) {
            let record = state
                .records
                .get(&H256::from(call.transaction_id))
                .cloned()
                .unwrap_or(TransactionRecord {
                    token: Address::zero(),
                    sender: Address::zero(),
                    recipient: Address::zero(),
                    amount: U256::zero(),
                    status: 0,
                });
            return Ok(record.encode_return());
        }

        let (name, symbol, decimals, supply) = state.tokens.get(&to).cloned().ok_or_else(reverted)?;
        if NameCall::decode(&data).is_ok() {
            return Ok(name.encode().into());
        }
        if SymbolCall::decode(&data).is_ok() {
            return Ok(symbol.encode().into());
        }
        if DecimalsCall::decode(&data).is_ok() {
            return Ok(decimals.encode().into());
        }
        if TotalSupplyCall::decode(&data).is_ok() {
            return Ok(supply.encode().into());
        }
        if let Ok(call) = BalanceOfCall::decode(&data) {
            let balance = state
                .balances
                .get(&(to, call.account))
                .copied()
                .unwrap_or_default();
            return Ok(balance.encode().into());
        }
        if let Ok(call) = AllowanceCall::decode(&data) {
            let allowance = state
                .allowances
                .get(&(to, call.owner, call.spender))
                .copied()
                .unwrap_or_default();
            return Ok(allowance.encode().into());
        }

        Err(reverted())
    }

    async fn native_balance(&self, account: Address) -> BridgeResult<U256> {
        self.ensure_online()?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .native
            .get(&account)
            .copied()
            .unwrap_or_default())
    }

    async fn estimate_gas(&self, _tx: &TypedTransaction) -> BridgeResult<U256> {
        self.ensure_online()?;
        Ok(U256::from(GAS_USED))
    }

    async fn gas_price(&self) -> BridgeResult<GasPrice> {
        self.ensure_online()?;
        Ok(GasPrice::Legacy(U256::from(GAS_PRICE_WEI)))
    }

    async fn block_number(&self) -> BridgeResult<u64> {
        self.ensure_online()?;
        Ok(100_000)
    }

    async fn get_logs(&self, _filter: &Filter) -> BridgeResult<Vec<Log>> {
        self.ensure_online()?;
        Ok(self.state.lock().unwrap().logs.clone())
    }
}

/// Signs by executing directly against a `FakeChain`
pub struct FakeSigner {
    chain: Arc<FakeChain>,
    address: Address,
    sent: Mutex<Vec<TypedTransaction>>,
}

impl FakeSigner {
    pub fn new(chain: &Arc<FakeChain>, address: Address) -> Self {
        Self {
            chain: chain.clone(),
            address,
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn sent(&self) -> Vec<TypedTransaction> {
        self.sent.lock().unwrap().clone()
    }

    /// Function selectors of the sent transactions, in order
    pub fn sent_selectors(&self) -> Vec<[u8; 4]> {
        self.sent()
            .iter()
            .filter_map(|tx| tx.data())
            .filter(|data| data.len() >= 4)
            .map(|data| [data[0], data[1], data[2], data[3]])
            .collect()
    }
}

#[async_trait]
impl TransactionSigner for FakeSigner {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        self.chain.chain_id
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> BridgeResult<TransactionReceipt> {
        let receipt = self.chain.execute(self.address, &tx);
        self.sent.lock().unwrap().push(tx);
        Ok(receipt)
    }
}

/// Relay service stub that processes each transaction id once
#[derive(Default)]
pub struct CountingRelay {
    relay_calls: AtomicUsize,
    processed: Mutex<HashSet<H256>>,
}

impl CountingRelay {
    pub fn relay_calls(&self) -> usize {
        self.relay_calls.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> usize {
        self.processed.lock().unwrap().len()
    }
}

#[async_trait]
impl RelayApi for CountingRelay {
    async fn supported_tokens(&self) -> BridgeResult<Vec<TokenPairInfo>> {
        Ok(Vec::new())
    }

    async fn token_mapping(&self, _address: Address) -> BridgeResult<Option<TokenPairInfo>> {
        Ok(None)
    }

    async fn request_relay(&self, request: &RelayRequest) -> BridgeResult<()> {
        self.relay_calls.fetch_add(1, Ordering::SeqCst);
        self.processed
            .lock()
            .unwrap()
            .insert(request.transaction_id);
        Ok(())
    }

    async fn transaction_status(&self, _id: H256) -> BridgeResult<Option<RelayStatus>> {
        Ok(None)
    }

    async fn transactions(&self, _address: Address) -> BridgeResult<Vec<BridgeTransaction>> {
        Ok(Vec::new())
    }

    async fn exitable_transactions(
        &self,
        _address: Address,
    ) -> BridgeResult<Vec<BridgeTransaction>> {
        Ok(Vec::new())
    }

    async fn health(&self) -> BridgeResult<bool> {
        Ok(true)
    }
}

/// Root and child chains bridging a 6-decimal USDC pair
pub fn usdc_pair() -> (Arc<FakeChain>, Arc<FakeChain>) {
    let root = FakeChain::new(ROOT_CHAIN, Address::repeat_byte(0x10));
    let child = FakeChain::new(CHILD_CHAIN, Address::repeat_byte(0x20));

    root.add_token(usdc_root(), "USD Coin", "USDC", 6);
    root.map_token(usdc_root(), usdc_child());
    child.add_token(usdc_child(), "USD Coin (PoS)", "USDC", 6);
    child.map_token(usdc_child(), usdc_root());

    (root, child)
}

pub fn registry(root: &Arc<FakeChain>, child: &Arc<FakeChain>, checkpointed: bool) -> ChainRegistry {
    let endpoint = |chain: &Arc<FakeChain>, name: &str, symbol: &str| ChainEndpoint {
        chain_id: chain.chain_id,
        name: name.to_string(),
        bridge_address: chain.bridge,
        native_symbol: symbol.to_string(),
        reader: chain.clone() as Arc<dyn ChainReader>,
    };

    ChainRegistry::new(
        ChainPair {
            root_chain_id: ROOT_CHAIN,
            child_chain_id: CHILD_CHAIN,
            checkpointed,
        },
        vec![
            endpoint(root, "ethereum", "ETH"),
            endpoint(child, "polygon", "POL"),
        ],
    )
    .unwrap()
}

/// A freshly submitted deposit of 10 USDC
pub fn pending_transaction(id: H256) -> BridgeTransaction {
    BridgeTransaction::new(NewBridgeTransaction {
        id,
        source_chain: ROOT_CHAIN,
        target_chain: CHILD_CHAIN,
        source_token: usdc_root(),
        target_token: usdc_child(),
        sender: user(),
        recipient: recipient(),
        amount: U256::from(10_000_000u64),
        source_tx_hash: H256::repeat_byte(0xee),
        fee: None,
    })
}

/// A child-chain withdrawal as the relay reports it
pub fn withdrawal_transaction(id: H256) -> BridgeTransaction {
    BridgeTransaction::new(NewBridgeTransaction {
        id,
        source_chain: CHILD_CHAIN,
        target_chain: ROOT_CHAIN,
        source_token: usdc_child(),
        target_token: usdc_root(),
        sender: user(),
        recipient: user(),
        amount: U256::from(10_000_000u64),
        source_tx_hash: H256::repeat_byte(0xdd),
        fee: None,
    })
}
