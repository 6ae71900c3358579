//! Core data model shared by the engine components

use crate::error::{BridgeError, BridgeResult};

use chrono::{DateTime, Utc};
use ethers::types::{Address, H256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a bridge transaction
///
/// `Pending -> Processing -> Completed`, with `Failed` and `Canceled`
/// reachable from either non-terminal state. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BridgeStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Canceled,
}

impl BridgeStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            BridgeStatus::Completed | BridgeStatus::Failed | BridgeStatus::Canceled
        )
    }

    /// Whether `next` is a legal successor of `self`
    pub fn can_transition_to(self, next: BridgeStatus) -> bool {
        if self == next {
            return true;
        }
        match self {
            BridgeStatus::Pending => true,
            BridgeStatus::Processing => next != BridgeStatus::Pending,
            _ => false,
        }
    }

    /// Apply an observed status, keeping the current one if it would regress
    pub fn advance(self, observed: BridgeStatus) -> BridgeStatus {
        if self.can_transition_to(observed) {
            observed
        } else {
            self
        }
    }

    /// Map the bridge contract's transaction record status code.
    /// The contract does not distinguish `Processing`. A fresh record carries
    /// the zero code.
    pub fn from_contract_code(code: u8) -> Option<BridgeStatus> {
        match code {
            0 | 1 => Some(BridgeStatus::Pending),
            2 => Some(BridgeStatus::Completed),
            3 => Some(BridgeStatus::Failed),
            4 => Some(BridgeStatus::Canceled),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BridgeStatus::Pending => "PENDING",
            BridgeStatus::Processing => "PROCESSING",
            BridgeStatus::Completed => "COMPLETED",
            BridgeStatus::Failed => "FAILED",
            BridgeStatus::Canceled => "CANCELED",
        }
    }
}

impl fmt::Display for BridgeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which contract call moves the funds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeDirection {
    /// Root (lock side) to child
    Deposit,
    /// Child (burn side) to root
    Withdraw,
}

impl BridgeDirection {
    pub fn name(self) -> &'static str {
        match self {
            BridgeDirection::Deposit => "deposit",
            BridgeDirection::Withdraw => "withdraw",
        }
    }
}

/// Immutable description of a token pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeToken {
    pub symbol: String,
    pub decimals: u8,
    pub root_address: Address,
    pub child_address: Address,
    #[serde(with = "u256_dec::option")]
    pub min_amount: Option<U256>,
    #[serde(with = "u256_dec::option")]
    pub max_amount: Option<U256>,
    pub native: bool,
}

impl BridgeToken {
    /// Token address on the side funds leave from
    pub fn source_address(&self, direction: BridgeDirection) -> Address {
        match direction {
            BridgeDirection::Deposit => self.root_address,
            BridgeDirection::Withdraw => self.child_address,
        }
    }

    /// Token address on the side funds arrive at
    pub fn target_address(&self, direction: BridgeDirection) -> Address {
        match direction {
            BridgeDirection::Deposit => self.child_address,
            BridgeDirection::Withdraw => self.root_address,
        }
    }

    /// Reject amounts outside the configured transfer limits
    pub fn check_limits(&self, amount: U256) -> BridgeResult<()> {
        if let Some(min) = self.min_amount {
            if amount < min {
                return Err(BridgeError::InvalidAmount(format!(
                    "{} is below the {} minimum of {}",
                    amount, self.symbol, min
                )));
            }
        }
        if let Some(max) = self.max_amount {
            if amount > max {
                return Err(BridgeError::InvalidAmount(format!(
                    "{} is above the {} maximum of {}",
                    amount, self.symbol, max
                )));
            }
        }
        Ok(())
    }
}

/// A cross-chain transfer tracked from submission to settlement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeTransaction {
    id: H256,
    source_chain: u64,
    target_chain: u64,
    source_token: Address,
    target_token: Address,
    sender: Address,
    recipient: Address,
    #[serde(with = "u256_dec")]
    amount: U256,
    status: BridgeStatus,
    source_tx_hash: H256,
    #[serde(default)]
    exit_tx_hash: Option<H256>,
    created_at: DateTime<Utc>,
    #[serde(default)]
    completed_at: Option<DateTime<Utc>>,
    #[serde(default, with = "u256_dec::option")]
    fee: Option<U256>,
    /// Set by the relay once the checkpoint containing a withdrawal is posted
    #[serde(default)]
    checkpointed: bool,
}

/// Fields known when a bridge transaction is first observed
#[derive(Debug, Clone)]
pub struct NewBridgeTransaction {
    pub id: H256,
    pub source_chain: u64,
    pub target_chain: u64,
    pub source_token: Address,
    pub target_token: Address,
    pub sender: Address,
    pub recipient: Address,
    pub amount: U256,
    pub source_tx_hash: H256,
    pub fee: Option<U256>,
}

impl BridgeTransaction {
    pub fn new(new: NewBridgeTransaction) -> Self {
        Self {
            id: new.id,
            source_chain: new.source_chain,
            target_chain: new.target_chain,
            source_token: new.source_token,
            target_token: new.target_token,
            sender: new.sender,
            recipient: new.recipient,
            amount: new.amount,
            status: BridgeStatus::Pending,
            source_tx_hash: new.source_tx_hash,
            exit_tx_hash: None,
            created_at: Utc::now(),
            completed_at: None,
            fee: new.fee,
            checkpointed: false,
        }
    }

    pub fn id(&self) -> H256 {
        self.id
    }

    pub fn source_chain(&self) -> u64 {
        self.source_chain
    }

    pub fn target_chain(&self) -> u64 {
        self.target_chain
    }

    pub fn source_token(&self) -> Address {
        self.source_token
    }

    pub fn target_token(&self) -> Address {
        self.target_token
    }

    pub fn sender(&self) -> Address {
        self.sender
    }

    pub fn recipient(&self) -> Address {
        self.recipient
    }

    pub fn amount(&self) -> U256 {
        self.amount
    }

    pub fn status(&self) -> BridgeStatus {
        self.status
    }

    pub fn source_tx_hash(&self) -> H256 {
        self.source_tx_hash
    }

    pub fn exit_tx_hash(&self) -> Option<H256> {
        self.exit_tx_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn fee(&self) -> Option<U256> {
        self.fee
    }

    pub fn is_checkpointed(&self) -> bool {
        self.checkpointed
    }

    /// Hex form of the protocol transaction id
    pub fn id_hex(&self) -> String {
        format!("0x{}", hex::encode(self.id.as_bytes()))
    }

    /// Apply an observed status. Returns true if the status changed.
    pub(crate) fn apply_status(&mut self, observed: BridgeStatus, at: DateTime<Utc>) -> bool {
        let next = self.status.advance(observed);
        if next == self.status {
            return false;
        }
        self.status = next;
        if next == BridgeStatus::Completed && self.completed_at.is_none() {
            self.completed_at = Some(at);
        }
        true
    }

    pub(crate) fn mark_checkpointed(&mut self) {
        self.checkpointed = true;
    }

    pub(crate) fn record_exit(&mut self, tx_hash: H256) {
        self.exit_tx_hash = Some(tx_hash);
    }
}

/// Cost breakdown for a prospective transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
    #[serde(with = "u256_dec")]
    pub bridge_fee: U256,
    #[serde(with = "u256_dec")]
    pub relayer_fee: U256,
    /// Gas units for the bridge call
    #[serde(with = "u256_dec")]
    pub gas_limit: U256,
    #[serde(with = "u256_dec")]
    pub gas_price: U256,
    /// `gas_limit * gas_price`, in native currency
    #[serde(with = "u256_dec")]
    pub gas_estimate: U256,
    #[serde(with = "u256_dec")]
    pub total_fee: U256,
}

/// Time-bounded estimate for a prospective transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeQuote {
    pub source_chain: u64,
    pub token: Address,
    #[serde(with = "u256_dec")]
    pub amount: U256,
    pub fee: FeeEstimate,
    #[serde(with = "u256_dec")]
    pub expected_received: U256,
    pub valid_until: DateTime<Utc>,
}

impl BridgeQuote {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }

    pub fn ensure_valid(&self, now: DateTime<Utc>) -> BridgeResult<()> {
        if self.is_expired(now) {
            return Err(BridgeError::QuoteExpired {
                valid_until: self.valid_until.to_rfc3339(),
            });
        }
        Ok(())
    }
}

/// Serde helpers encoding `U256` as a base-10 string
pub mod u256_dec {
    use ethers::types::U256;
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw).map_err(|e| D::Error::custom(format!("{}: {}", raw, e)))
    }

    pub mod option {
        use super::*;

        pub fn serialize<S: Serializer>(
            value: &Option<U256>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(v) => serializer.serialize_some(&v.to_string()),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<U256>, D::Error> {
            Option::<String>::deserialize(deserializer)?
                .map(|raw| {
                    U256::from_dec_str(&raw).map_err(|e| D::Error::custom(format!("{}: {}", raw, e)))
                })
                .transpose()
        }
    }
}
