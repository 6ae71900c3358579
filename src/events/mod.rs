//! Bridge contract event types and receipt parsing
//!
//! The protocol transaction id only exists in the `Deposit` / `Withdrawal`
//! events. Logs are matched by event signature, never by position, since
//! bridge implementations emit token transfer logs in differing order.

use crate::error::{BridgeError, BridgeResult};
use crate::types::BridgeDirection;

use ethers::abi::RawLog;
use ethers::contract::EthEvent;
use ethers::types::{Address, Log, TransactionReceipt, H256, U256};
use tracing::debug;

/// `Deposit(token, sender, amount, transactionId, destinationChainId)`
#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "Deposit", abi = "Deposit(address,address,uint256,bytes32,uint256)")]
pub struct DepositEvent {
    #[ethevent(indexed)]
    pub token: Address,
    #[ethevent(indexed)]
    pub sender: Address,
    pub amount: U256,
    pub transaction_id: [u8; 32],
    pub destination_chain_id: U256,
}

/// `Withdrawal(token, recipient, amount, transactionId)`
#[derive(Clone, Debug, PartialEq, Eq, EthEvent)]
#[ethevent(name = "Withdrawal", abi = "Withdrawal(address,address,uint256,bytes32)")]
pub struct WithdrawalEvent {
    #[ethevent(indexed)]
    pub token: Address,
    #[ethevent(indexed)]
    pub recipient: Address,
    pub amount: U256,
    pub transaction_id: [u8; 32],
}

/// A decoded bridge event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    Deposit {
        token: Address,
        sender: Address,
        amount: U256,
        transaction_id: H256,
        destination_chain_id: U256,
        block_number: u64,
        tx_hash: H256,
    },
    Withdrawal {
        token: Address,
        recipient: Address,
        amount: U256,
        transaction_id: H256,
        block_number: u64,
        tx_hash: H256,
    },
}

impl BridgeEvent {
    pub fn transaction_id(&self) -> H256 {
        match self {
            BridgeEvent::Deposit { transaction_id, .. } => *transaction_id,
            BridgeEvent::Withdrawal { transaction_id, .. } => *transaction_id,
        }
    }

    pub fn amount(&self) -> U256 {
        match self {
            BridgeEvent::Deposit { amount, .. } => *amount,
            BridgeEvent::Withdrawal { amount, .. } => *amount,
        }
    }

    pub fn tx_hash(&self) -> H256 {
        match self {
            BridgeEvent::Deposit { tx_hash, .. } => *tx_hash,
            BridgeEvent::Withdrawal { tx_hash, .. } => *tx_hash,
        }
    }

    /// Get event name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            BridgeEvent::Deposit { .. } => "Deposit",
            BridgeEvent::Withdrawal { .. } => "Withdrawal",
        }
    }

    /// The direction whose submission emits this event
    pub fn direction(&self) -> BridgeDirection {
        match self {
            BridgeEvent::Deposit { .. } => BridgeDirection::Deposit,
            BridgeEvent::Withdrawal { .. } => BridgeDirection::Withdraw,
        }
    }
}

/// Topic0 of the event emitted for a direction
pub fn topic_for(direction: BridgeDirection) -> H256 {
    match direction {
        BridgeDirection::Deposit => DepositEvent::signature(),
        BridgeDirection::Withdraw => WithdrawalEvent::signature(),
    }
}

/// Decode a log if it is a bridge event; other logs yield `None`
pub fn parse_log(log: &Log) -> Option<BridgeEvent> {
    let topic = log.topics.first().copied()?;
    let block_number = log.block_number.map(|b| b.as_u64()).unwrap_or(0);
    let tx_hash = log.transaction_hash.unwrap_or_default();
    let raw = RawLog {
        topics: log.topics.clone(),
        data: log.data.to_vec(),
    };

    if topic == DepositEvent::signature() {
        match DepositEvent::decode_log(&raw) {
            Ok(ev) => Some(BridgeEvent::Deposit {
                token: ev.token,
                sender: ev.sender,
                amount: ev.amount,
                transaction_id: H256::from(ev.transaction_id),
                destination_chain_id: ev.destination_chain_id,
                block_number,
                tx_hash,
            }),
            Err(e) => {
                debug!("Log matched Deposit topic but failed to decode: {}", e);
                None
            }
        }
    } else if topic == WithdrawalEvent::signature() {
        match WithdrawalEvent::decode_log(&raw) {
            Ok(ev) => Some(BridgeEvent::Withdrawal {
                token: ev.token,
                recipient: ev.recipient,
                amount: ev.amount,
                transaction_id: H256::from(ev.transaction_id),
                block_number,
                tx_hash,
            }),
            Err(e) => {
                debug!("Log matched Withdrawal topic but failed to decode: {}", e);
                None
            }
        }
    } else {
        None
    }
}

/// Find the bridge event for `direction` anywhere in a receipt.
///
/// A successful receipt without the event means a contract-level revert
/// or an ABI mismatch and is reported as `TransactionFailed`.
pub fn find_bridge_event(
    receipt: &TransactionReceipt,
    direction: BridgeDirection,
) -> BridgeResult<BridgeEvent> {
    receipt
        .logs
        .iter()
        .filter_map(parse_log)
        .find(|ev| ev.direction() == direction)
        .ok_or_else(|| BridgeError::TransactionFailed {
            reason: format!(
                "receipt {:?} has no {} event",
                receipt.transaction_hash,
                match direction {
                    BridgeDirection::Deposit => "Deposit",
                    BridgeDirection::Withdraw => "Withdrawal",
                }
            ),
            receipt: Some(Box::new(receipt.clone())),
        })
}

/// Build a `Deposit` log as the bridge contract emits it
#[cfg(test)]
pub(crate) fn deposit_log(
    bridge: Address,
    token: Address,
    sender: Address,
    amount: U256,
    transaction_id: H256,
    destination_chain_id: u64,
) -> Log {
    use ethers::abi::{encode, Token};

    Log {
        address: bridge,
        topics: vec![
            DepositEvent::signature(),
            H256::from(token),
            H256::from(sender),
        ],
        data: encode(&[
            Token::Uint(amount),
            Token::FixedBytes(transaction_id.as_bytes().to_vec()),
            Token::Uint(U256::from(destination_chain_id)),
        ])
        .into(),
        ..Default::default()
    }
}

/// Build a `Withdrawal` log as the bridge contract emits it
#[cfg(test)]
pub(crate) fn withdrawal_log(
    bridge: Address,
    token: Address,
    recipient: Address,
    amount: U256,
    transaction_id: H256,
) -> Log {
    use ethers::abi::{encode, Token};

    Log {
        address: bridge,
        topics: vec![
            WithdrawalEvent::signature(),
            H256::from(token),
            H256::from(recipient),
        ],
        data: encode(&[
            Token::Uint(amount),
            Token::FixedBytes(transaction_id.as_bytes().to_vec()),
        ])
        .into(),
        ..Default::default()
    }
}
