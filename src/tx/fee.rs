//! Fee estimation and time-bounded quotes

use super::GasEstimator;
use crate::chain::ChainRegistry;
use crate::config::EngineConfig;
use crate::contracts::{calldata, DepositCall, WithdrawCall};
use crate::error::{BridgeError, BridgeResult};
use crate::token::NATIVE_TOKEN;
use crate::types::{BridgeDirection, BridgeQuote, FeeEstimate};

use chrono::{Duration, Utc};
use ethers::types::{Address, U256, U512};
use std::sync::Arc;
use tracing::debug;

/// Stand-in sender and recipient for simulated bridge calls
const PLACEHOLDER_ACCOUNT: Address = ethers::types::H160([
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00,
    0x00, 0x00, 0x00, 0xde, 0xad,
]);

const BPS_DENOMINATOR: u64 = 10_000;

/// Computes gas cost and protocol fees for a prospective transfer
pub struct FeeEstimator {
    registry: Arc<ChainRegistry>,
    gas: GasEstimator,
    config: EngineConfig,
}

impl FeeEstimator {
    pub fn new(registry: Arc<ChainRegistry>, config: EngineConfig) -> Self {
        Self {
            registry,
            gas: GasEstimator::new(config.gas_limit_buffer_percent),
            config,
        }
    }

    /// Estimate the cost of bridging `amount` (smallest unit) of `token`.
    ///
    /// The bridge call is simulated with a placeholder account; nothing is
    /// submitted. A reverting simulation falls back to the configured limit.
    pub async fn estimate(
        &self,
        token: Address,
        amount: U256,
        source_chain: u64,
    ) -> BridgeResult<FeeEstimate> {
        let (source, _, direction) = self.registry.route(source_chain)?;

        let data = match direction {
            BridgeDirection::Deposit => calldata(DepositCall {
                token,
                amount,
                recipient: PLACEHOLDER_ACCOUNT,
            }),
            BridgeDirection::Withdraw => calldata(WithdrawCall {
                token,
                amount,
                recipient: PLACEHOLDER_ACCOUNT,
            }),
        };
        let value = if token == NATIVE_TOKEN {
            amount
        } else {
            U256::zero()
        };

        let tx = self
            .gas
            .prepare(
                source.reader.as_ref(),
                PLACEHOLDER_ACCOUNT,
                source.bridge_address,
                data,
                value,
                Some(U256::from(self.config.default_gas_limit)),
            )
            .await?;

        let gas_limit = tx.gas().copied().unwrap_or_default();
        let gas_price = tx.gas_price().unwrap_or_default();
        let gas_estimate = GasEstimator::calculate_cost(gas_limit, gas_price)?;

        let bridge_fee = bps_fee(amount, self.config.bridge_fee_bps)?;
        let relayer_fee = bps_fee(amount, self.config.relayer_fee_bps)?;
        let total_fee = bridge_fee
            .checked_add(relayer_fee)
            .and_then(|fees| fees.checked_add(gas_estimate))
            .ok_or_else(|| BridgeError::InvalidAmount(format!("fees for {} overflow", amount)))?;

        debug!(
            "Estimated {} of {:?} on chain {}: gas {} at {}",
            direction.name(),
            token,
            source_chain,
            gas_limit,
            gas_price
        );

        Ok(FeeEstimate {
            bridge_fee,
            relayer_fee,
            gas_limit,
            gas_price,
            gas_estimate,
            total_fee,
        })
    }

    /// Estimate plus the amount expected on the target chain, valid for the quote TTL
    pub async fn quote(
        &self,
        token: Address,
        amount: U256,
        source_chain: u64,
    ) -> BridgeResult<BridgeQuote> {
        let fee = self.estimate(token, amount, source_chain).await?;
        let expected_received = amount
            .saturating_sub(fee.bridge_fee)
            .saturating_sub(fee.relayer_fee);

        Ok(BridgeQuote {
            source_chain,
            token,
            amount,
            fee,
            expected_received,
            valid_until: Utc::now() + Duration::seconds(self.config.quote_ttl_secs as i64),
        })
    }
}

/// `amount * bps / 10_000`, computed without intermediate overflow
fn bps_fee(amount: U256, bps: u32) -> BridgeResult<U256> {
    let fee = amount.full_mul(U256::from(bps)) / U512::from(BPS_DENOMINATOR);
    U256::try_from(fee).map_err(|_| {
        BridgeError::InvalidAmount(format!("{} bps of {} overflows", bps, amount))
    })
}
