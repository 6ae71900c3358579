//! Status module - lifecycle tracking of submitted transfers
//!
//! The relay service is the preferred source. When it is unreachable or has
//! not indexed a transfer yet, the source chain's bridge contract answers
//! with a coarser status that cannot tell `PROCESSING` from `PENDING`.

mod tracker;

pub use crate::types::BridgeStatus;
pub use tracker::StatusTracker;

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::Serialize;

/// Where a status answer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusSource {
    Relay,
    /// Degraded confidence
    OnChain,
}

impl StatusSource {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusSource::Relay => "relay",
            StatusSource::OnChain => "onchain",
        }
    }
}

/// Current view of one transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub id: H256,
    pub status: BridgeStatus,
    pub source: StatusSource,
    /// Whether the withdrawal's checkpoint is on the root chain
    pub checkpointed: bool,
    #[serde(with = "crate::types::u256_dec::option")]
    pub amount: Option<U256>,
    pub recipient: Option<Address>,
    pub completed_at: Option<DateTime<Utc>>,
    pub exit_tx_hash: Option<H256>,
}

impl StatusReport {
    pub fn is_degraded(&self) -> bool {
        self.source == StatusSource::OnChain
    }
}
