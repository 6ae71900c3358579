//! Chain module - read and write access to the two bridged chains
//!
//! This module provides:
//! - The `ChainReader` capability for read-only calls, gas data and logs
//! - Multi-RPC provider management with automatic failover
//! - The `TransactionSigner` capability consumed for approvals, bridge calls and exits
//! - A registry mapping chain ids to bridge contract addresses

pub mod provider;
pub mod signer;

pub use provider::ChainProvider;
pub use signer::{TransactionSigner, WalletSigner};

use crate::error::{BridgeError, BridgeResult};
use crate::types::BridgeDirection;

use async_trait::async_trait;
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Filter, Log, U256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::error;

/// Read-only access to a single chain
#[async_trait]
pub trait ChainReader: Send + Sync {
    fn chain_id(&self) -> u64;

    /// `eth_call` against the latest block
    async fn call(&self, to: Address, data: Bytes) -> BridgeResult<Bytes>;

    /// Native currency balance
    async fn native_balance(&self, account: Address) -> BridgeResult<U256>;

    /// Simulate a transaction and return its gas usage
    async fn estimate_gas(&self, tx: &TypedTransaction) -> BridgeResult<U256>;

    async fn gas_price(&self) -> BridgeResult<GasPrice>;

    async fn block_number(&self) -> BridgeResult<u64>;

    async fn get_logs(&self, filter: &Filter) -> BridgeResult<Vec<Log>>;
}

/// Gas price types
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GasPrice {
    Legacy(U256),
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

impl GasPrice {
    /// Upper bound on the price paid per gas unit
    pub fn per_gas(&self) -> U256 {
        match self {
            GasPrice::Legacy(price) => *price,
            GasPrice::Eip1559 { max_fee_per_gas, .. } => *max_fee_per_gas,
        }
    }
}

/// One side of the bridge: a chain and its bridge contract
#[derive(Clone)]
pub struct ChainEndpoint {
    pub chain_id: u64,
    pub name: String,
    pub bridge_address: Address,
    /// Symbol of the chain's native currency
    pub native_symbol: String,
    pub reader: Arc<dyn ChainReader>,
}

impl std::fmt::Debug for ChainEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainEndpoint")
            .field("chain_id", &self.chain_id)
            .field("name", &self.name)
            .field("bridge_address", &self.bridge_address)
            .finish()
    }
}

/// The root/child pairing of two chains
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainPair {
    /// Lock side
    pub root_chain_id: u64,
    /// Burn side
    pub child_chain_id: u64,
    /// Withdrawals need an exit transaction on the root chain
    pub checkpointed: bool,
}

impl ChainPair {
    /// Direction of a transfer leaving `source_chain`
    pub fn direction(&self, source_chain: u64) -> BridgeResult<BridgeDirection> {
        if source_chain == self.root_chain_id {
            Ok(BridgeDirection::Deposit)
        } else if source_chain == self.child_chain_id {
            Ok(BridgeDirection::Withdraw)
        } else {
            Err(BridgeError::ChainNotFound {
                chain_id: source_chain,
            })
        }
    }

    /// The other chain of the pair
    pub fn counterpart(&self, chain_id: u64) -> BridgeResult<u64> {
        match self.direction(chain_id)? {
            BridgeDirection::Deposit => Ok(self.child_chain_id),
            BridgeDirection::Withdraw => Ok(self.root_chain_id),
        }
    }
}

/// Bridge endpoints indexed by chain id
#[derive(Debug, Clone)]
pub struct ChainRegistry {
    pair: ChainPair,
    endpoints: HashMap<u64, ChainEndpoint>,
}

impl ChainRegistry {
    /// Create a registry; both chains of `pair` must have an endpoint
    pub fn new(pair: ChainPair, endpoints: Vec<ChainEndpoint>) -> BridgeResult<Self> {
        let endpoints: HashMap<u64, ChainEndpoint> =
            endpoints.into_iter().map(|e| (e.chain_id, e)).collect();

        for chain_id in [pair.root_chain_id, pair.child_chain_id] {
            if !endpoints.contains_key(&chain_id) {
                return Err(BridgeError::ChainNotFound { chain_id });
            }
        }

        Ok(Self { pair, endpoints })
    }

    pub fn pair(&self) -> ChainPair {
        self.pair
    }

    /// Get the endpoint for a specific chain
    pub fn get(&self, chain_id: u64) -> BridgeResult<&ChainEndpoint> {
        self.endpoints
            .get(&chain_id)
            .ok_or(BridgeError::ChainNotFound { chain_id })
    }

    pub fn root(&self) -> BridgeResult<&ChainEndpoint> {
        self.get(self.pair.root_chain_id)
    }

    pub fn child(&self) -> BridgeResult<&ChainEndpoint> {
        self.get(self.pair.child_chain_id)
    }

    /// Source endpoint, target endpoint and direction for a transfer
    pub fn route(
        &self,
        source_chain: u64,
    ) -> BridgeResult<(&ChainEndpoint, &ChainEndpoint, BridgeDirection)> {
        let direction = self.pair.direction(source_chain)?;
        let target_chain = self.pair.counterpart(source_chain)?;
        Ok((self.get(source_chain)?, self.get(target_chain)?, direction))
    }

    /// Health check for all chains
    pub async fn health_check(&self) -> Vec<(u64, bool)> {
        let mut results = Vec::new();

        for (chain_id, endpoint) in &self.endpoints {
            let healthy = match endpoint.reader.block_number().await {
                Ok(_) => true,
                Err(e) => {
                    error!("Health check failed for chain {}: {}", chain_id, e);
                    false
                }
            };
            results.push((*chain_id, healthy));

            crate::metrics::record_chain_health(*chain_id, healthy);
        }

        results.sort_by_key(|(id, _)| *id);
        results
    }
}
