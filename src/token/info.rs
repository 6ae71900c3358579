//! ERC-20 metadata, balance and allowance reads

use super::NATIVE_TOKEN;
use crate::chain::{ChainReader, ChainRegistry};
use crate::contracts::{
    calldata, decode_return, AllowanceCall, BalanceOfCall, DecimalsCall, NameCall, SymbolCall,
    TotalSupplyCall,
};
use crate::error::BridgeResult;

use dashmap::DashMap;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::EthCall;
use ethers::types::{Address, U256};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Token metadata as reported by the token contract
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    /// Zero for the native currency, whose supply is not readable
    #[serde(with = "crate::types::u256_dec")]
    pub total_supply: U256,
}

/// Read-only token queries on either chain of the pair
pub struct TokenInfoService {
    registry: Arc<ChainRegistry>,
    metadata: DashMap<(u64, Address), TokenMetadata>,
}

impl TokenInfoService {
    pub fn new(registry: Arc<ChainRegistry>) -> Self {
        Self {
            registry,
            metadata: DashMap::new(),
        }
    }

    /// Name, symbol, decimals and total supply, cached per chain and token
    pub async fn metadata(&self, chain_id: u64, token: Address) -> BridgeResult<TokenMetadata> {
        if let Some(cached) = self.metadata.get(&(chain_id, token)) {
            return Ok(cached.clone());
        }

        let endpoint = self.registry.get(chain_id)?;
        let metadata = if token == NATIVE_TOKEN {
            TokenMetadata {
                name: format!("{} native currency", endpoint.name),
                symbol: endpoint.native_symbol.clone(),
                decimals: 18,
                total_supply: U256::zero(),
            }
        } else {
            let reader = endpoint.reader.as_ref();
            let (name, symbol, decimals, total_supply) = futures::try_join!(
                read::<String, _>(reader, token, NameCall, "name"),
                read::<String, _>(reader, token, SymbolCall, "symbol"),
                read::<u8, _>(reader, token, DecimalsCall, "decimals"),
                read::<U256, _>(reader, token, TotalSupplyCall, "totalSupply"),
            )?;
            TokenMetadata {
                name,
                symbol,
                decimals,
                total_supply,
            }
        };

        debug!(
            "Token {:?} on chain {} is {} ({} decimals)",
            token, chain_id, metadata.symbol, metadata.decimals
        );
        self.metadata.insert((chain_id, token), metadata.clone());
        Ok(metadata)
    }

    pub async fn balance_of(
        &self,
        chain_id: u64,
        token: Address,
        account: Address,
    ) -> BridgeResult<U256> {
        let reader = self.registry.get(chain_id)?.reader.as_ref();
        if token == NATIVE_TOKEN {
            return reader.native_balance(account).await;
        }
        read(reader, token, BalanceOfCall { account }, "balanceOf").await
    }

    /// Allowance granted by `owner` to `spender`; unbounded for the native currency
    pub async fn allowance(
        &self,
        chain_id: u64,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> BridgeResult<U256> {
        if token == NATIVE_TOKEN {
            return Ok(U256::MAX);
        }
        let reader = self.registry.get(chain_id)?.reader.as_ref();
        read(reader, token, AllowanceCall { owner, spender }, "allowance").await
    }
}

async fn read<T: AbiDecode, C: EthCall + AbiEncode>(
    reader: &dyn ChainReader,
    to: Address,
    call: C,
    function: &str,
) -> BridgeResult<T> {
    let data = reader.call(to, calldata(call)).await?;
    decode_return(function, &data)
}
