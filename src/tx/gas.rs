//! Gas estimation and transaction preparation for either gas market

use crate::chain::{ChainReader, GasPrice};
use crate::error::{BridgeError, BridgeResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, Eip1559TransactionRequest, TransactionRequest, U256};
use tracing::{debug, warn};

/// Gas estimator for bridge transactions
#[derive(Debug, Clone)]
pub struct GasEstimator {
    /// Buffer percentage for gas limit (e.g., 20 = 20% buffer)
    gas_limit_buffer_percent: u64,
    /// Buffer percentage for gas price
    gas_price_buffer_percent: u64,
}

impl GasEstimator {
    /// Create a new gas estimator
    pub fn new(gas_limit_buffer_percent: u64) -> Self {
        Self {
            gas_limit_buffer_percent,
            gas_price_buffer_percent: 10,
        }
    }

    /// Add the configured buffer to a simulated gas usage
    pub fn buffered_limit(&self, estimate: U256) -> U256 {
        estimate + estimate * self.gas_limit_buffer_percent / 100
    }

    /// Get buffered gas price for a chain
    pub async fn gas_price(&self, reader: &dyn ChainReader) -> BridgeResult<GasPrice> {
        let gas_price = reader.gas_price().await?;

        let buffered = match gas_price {
            GasPrice::Legacy(price) => {
                let buffer = price * self.gas_price_buffer_percent / 100;
                GasPrice::Legacy(price + buffer)
            }
            GasPrice::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            } => {
                let fee_buffer = max_fee_per_gas * self.gas_price_buffer_percent / 100;
                let priority_buffer =
                    max_priority_fee_per_gas * self.gas_price_buffer_percent / 100;
                GasPrice::Eip1559 {
                    max_fee_per_gas: max_fee_per_gas + fee_buffer,
                    max_priority_fee_per_gas: max_priority_fee_per_gas + priority_buffer,
                }
            }
        };

        debug!("Gas price for chain {}: {:?}", reader.chain_id(), buffered);
        Ok(buffered)
    }

    /// Build a priced transaction and size its gas limit by simulation.
    ///
    /// A reverting simulation uses `fallback_limit` when given and fails the
    /// preparation otherwise. Nothing is broadcast.
    pub async fn prepare(
        &self,
        reader: &dyn ChainReader,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
        fallback_limit: Option<U256>,
    ) -> BridgeResult<TypedTransaction> {
        let price = self.gas_price(reader).await?;
        let mut tx = build_transaction(reader.chain_id(), from, to, data, value, &price);

        let gas_limit = match reader.estimate_gas(&tx).await {
            Ok(estimate) => self.buffered_limit(estimate),
            Err(BridgeError::Contract(reason)) => match fallback_limit {
                Some(limit) => {
                    warn!(
                        "Simulation on chain {} reverted ({}), using gas limit {}",
                        reader.chain_id(),
                        reason,
                        limit
                    );
                    limit
                }
                None => {
                    return Err(BridgeError::failed(format!(
                        "simulation reverted: {}",
                        reason
                    )))
                }
            },
            Err(e) => return Err(e),
        };

        tx.set_gas(gas_limit);
        Ok(tx)
    }

    /// Calculate total cost in wei
    pub fn calculate_cost(gas_limit: U256, price_per_gas: U256) -> BridgeResult<U256> {
        gas_limit.checked_mul(price_per_gas).ok_or_else(|| {
            BridgeError::Unknown(format!(
                "gas cost overflows: {} gas at {} wei",
                gas_limit, price_per_gas
            ))
        })
    }
}

fn build_transaction(
    chain_id: u64,
    from: Address,
    to: Address,
    data: Bytes,
    value: U256,
    price: &GasPrice,
) -> TypedTransaction {
    match price {
        GasPrice::Legacy(gas_price) => TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .value(value)
            .gas_price(*gas_price)
            .chain_id(chain_id)
            .into(),
        GasPrice::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => Eip1559TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .value(value)
            .max_fee_per_gas(*max_fee_per_gas)
            .max_priority_fee_per_gas(*max_priority_fee_per_gas)
            .chain_id(chain_id)
            .into(),
    }
}
