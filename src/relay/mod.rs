//! Off-chain relay service integration
//!
//! The relay service indexes token mappings, forwards transactions to the
//! target chain and reports their status. Every call is idempotent, so the
//! engine retries freely and keeps no "already requested" bookkeeping.

mod client;
mod coordinator;

pub use client::RelayClient;
pub use coordinator::{RelayCoordinator, SweepReport};

use crate::error::BridgeResult;
use crate::types::{u256_dec, BridgeStatus, BridgeTransaction};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};

/// HTTP surface of the relay service
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// `GET /supported-tokens`
    async fn supported_tokens(&self) -> BridgeResult<Vec<TokenPairInfo>>;

    /// `GET /token-mapping?address=`; `None` when the service has no mapping
    async fn token_mapping(&self, address: Address) -> BridgeResult<Option<TokenPairInfo>>;

    /// `POST /relay`
    async fn request_relay(&self, request: &RelayRequest) -> BridgeResult<()>;

    /// `GET /transaction-status?id=`; `None` when the service has not indexed it yet
    async fn transaction_status(&self, id: H256) -> BridgeResult<Option<RelayStatus>>;

    /// `GET /transactions?address=`
    async fn transactions(&self, address: Address) -> BridgeResult<Vec<BridgeTransaction>>;

    /// `GET /exitable-transactions?address=`
    async fn exitable_transactions(&self, address: Address)
        -> BridgeResult<Vec<BridgeTransaction>>;

    /// `GET /health`
    async fn health(&self) -> BridgeResult<bool>;
}

/// A token pair as indexed by the relay service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPairInfo {
    pub root_token: Address,
    pub child_token: Address,
    #[serde(default)]
    pub symbol: Option<String>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default, with = "u256_dec::option")]
    pub min_amount: Option<U256>,
    #[serde(default, with = "u256_dec::option")]
    pub max_amount: Option<U256>,
    #[serde(default)]
    pub native: bool,
}

/// Body of `POST /relay`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayRequest {
    pub transaction_id: H256,
    pub source_chain: u64,
}

/// Response of `GET /transaction-status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelayStatus {
    pub id: H256,
    pub status: BridgeStatus,
    /// The checkpoint covering this withdrawal has been posted to the root chain
    #[serde(default)]
    pub checkpointed: bool,
    #[serde(default, with = "u256_dec::option")]
    pub amount: Option<U256>,
    #[serde(default)]
    pub recipient: Option<Address>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exit_tx_hash: Option<H256>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_request_wire_shape() {
        let request = RelayRequest {
            transaction_id: H256::repeat_byte(0x01),
            source_chain: 137,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["sourceChain"], 137);
        assert!(json["transactionId"].as_str().unwrap().starts_with("0x0101"));
    }

    #[test]
    fn test_status_defaults_optional_fields() {
        let status: RelayStatus = serde_json::from_str(&format!(
            r#"{{"id":"{:?}","status":"PROCESSING"}}"#,
            H256::repeat_byte(0x02)
        ))
        .unwrap();
        assert_eq!(status.status, BridgeStatus::Processing);
        assert!(!status.checkpointed);
        assert!(status.amount.is_none());
    }
}
