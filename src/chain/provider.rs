//! Chain provider with multi-RPC support and automatic failover

use super::{ChainReader, GasPrice};
use crate::config::{ChainConfig, GasPriceStrategy};
use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

/// Multi-provider wrapper with automatic failover
pub struct ChainProvider {
    /// Chain configuration
    config: ChainConfig,
    /// HTTP providers (multiple for failover)
    http_providers: Vec<Provider<Http>>,
    /// Current active provider index
    current_provider: AtomicUsize,
}

impl ChainProvider {
    /// Create a new chain provider
    pub fn new(config: ChainConfig) -> BridgeResult<Self> {
        let mut http_providers = Vec::new();

        for url in &config.rpc_urls {
            match Provider::<Http>::try_from(url.as_str()) {
                Ok(provider) => {
                    let provider = provider.interval(Duration::from_millis(100));
                    http_providers.push(provider);
                    debug!("Added HTTP provider for chain {}: {}", config.chain_id, url);
                }
                Err(e) => {
                    warn!("Failed to create provider for {}: {}", url, e);
                }
            }
        }

        if http_providers.is_empty() {
            return Err(BridgeError::ChainConnection {
                chain_id: config.chain_id,
                message: "No valid RPC providers".to_string(),
            });
        }

        Ok(Self {
            config,
            http_providers,
            current_provider: AtomicUsize::new(0),
        })
    }

    /// Get the active HTTP provider
    pub fn http(&self) -> &Provider<Http> {
        let idx = self.current_provider.load(Ordering::Relaxed);
        &self.http_providers[idx % self.http_providers.len()]
    }

    /// Switch to next available provider
    pub fn failover(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.http_providers.len();
        self.current_provider.store(next, Ordering::Relaxed);
        warn!(
            "Chain {} failover to provider {}",
            self.config.chain_id, next
        );
    }

    /// URL of the provider currently in use
    pub fn rpc_url(&self) -> String {
        self.http().as_ref().url().to_string()
    }

    fn all_failed(&self, what: &str) -> BridgeError {
        BridgeError::ChainConnection {
            chain_id: self.config.chain_id,
            message: format!("All providers failed to {}", what),
        }
    }

    /// Estimate EIP-1559 fees
    async fn estimate_eip1559_fees(&self) -> BridgeResult<(U256, U256)> {
        let block = self
            .http()
            .get_block(BlockNumber::Latest)
            .await
            .map_err(|e| self.connection_error(e))?
            .ok_or_else(|| BridgeError::Contract("No latest block".to_string()))?;

        let base_fee = block
            .base_fee_per_gas
            .ok_or_else(|| BridgeError::Contract("No base fee in block".to_string()))?;

        // 2 gwei tip
        let priority_fee = U256::from(2_000_000_000u64);

        // Max fee = 2 * base_fee + priority_fee (buffer for block variability)
        let max_fee = base_fee * 2 + priority_fee;

        // Cap at configured max
        let max_gwei = U256::from(self.config.max_gas_price_gwei) * U256::from(1_000_000_000u64);
        let max_fee = std::cmp::min(max_fee, max_gwei);

        Ok((max_fee, priority_fee))
    }

    fn connection_error(&self, e: ProviderError) -> BridgeError {
        BridgeError::ChainConnection {
            chain_id: self.config.chain_id,
            message: e.to_string(),
        }
    }
}

/// An RPC node answering with an error object has executed the request;
/// anything else is a transport failure worth failing over for.
fn is_execution_error(e: &ProviderError) -> bool {
    RpcError::as_error_response(e).is_some()
}

#[async_trait]
impl ChainReader for ChainProvider {
    fn chain_id(&self) -> u64 {
        self.config.chain_id
    }

    async fn call(&self, to: Address, data: Bytes) -> BridgeResult<Bytes> {
        let tx: TypedTransaction = TransactionRequest::new().to(to).data(data).into();

        for _ in 0..self.http_providers.len() {
            match self.http().call(&tx, None).await {
                Ok(result) => return Ok(result),
                Err(e) if is_execution_error(&e) => {
                    return Err(BridgeError::Contract(format!("call to {:?} failed: {}", to, e)));
                }
                Err(e) => {
                    warn!("eth_call failed on chain {}: {}", self.config.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(self.all_failed("execute eth_call"))
    }

    async fn native_balance(&self, account: Address) -> BridgeResult<U256> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_balance(account, None).await {
                Ok(balance) => return Ok(balance),
                Err(e) => {
                    warn!("Failed to get balance on chain {}: {}", self.config.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(self.all_failed("get balance"))
    }

    async fn estimate_gas(&self, tx: &TypedTransaction) -> BridgeResult<U256> {
        for _ in 0..self.http_providers.len() {
            match self.http().estimate_gas(tx, None).await {
                Ok(gas) => return Ok(gas),
                Err(e) if is_execution_error(&e) => {
                    return Err(BridgeError::Contract(format!("gas estimation reverted: {}", e)));
                }
                Err(e) => {
                    warn!("Gas estimation failed on chain {}: {}", self.config.chain_id, e);
                    self.failover();
                }
            }
        }

        Err(self.all_failed("estimate gas"))
    }

    /// Get current gas price based on chain strategy
    async fn gas_price(&self) -> BridgeResult<GasPrice> {
        match self.config.gas_price_strategy {
            GasPriceStrategy::Legacy => {
                let price = self
                    .http()
                    .get_gas_price()
                    .await
                    .map_err(|e| self.connection_error(e))?;
                Ok(GasPrice::Legacy(price))
            }
            GasPriceStrategy::Eip1559 => {
                let (max_fee, priority_fee) = self.estimate_eip1559_fees().await?;
                Ok(GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee,
                    max_priority_fee_per_gas: priority_fee,
                })
            }
        }
    }

    /// Get current block number with failover
    async fn block_number(&self) -> BridgeResult<u64> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_block_number().await {
                Ok(block) => return Ok(block.as_u64()),
                Err(e) => {
                    warn!(
                        "Failed to get block number from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.all_failed("get block number"))
    }

    /// Get logs for a filter
    async fn get_logs(&self, filter: &Filter) -> BridgeResult<Vec<Log>> {
        for _ in 0..self.http_providers.len() {
            match self.http().get_logs(filter).await {
                Ok(logs) => return Ok(logs),
                Err(e) => {
                    warn!(
                        "Failed to get logs from chain {}: {}",
                        self.config.chain_id, e
                    );
                    self.failover();
                }
            }
        }

        Err(self.all_failed("get logs"))
    }
}
