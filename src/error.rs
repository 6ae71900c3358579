//! Error types for the bridge engine

use ethers::types::TransactionReceipt;
use thiserror::Error;

/// Main error type for bridge operations
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Invalid transaction id: {0}")]
    InvalidTransactionId(String),

    #[error("No mapping found for token {token} on chain {chain_id}")]
    NoMappingFound { token: String, chain_id: u64 },

    #[error("Insufficient allowance: have {have}, need {need}")]
    InsufficientAllowance { have: String, need: String },

    #[error("Insufficient funds: have {have}, need {need}")]
    InsufficientFunds { have: String, need: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed {
        reason: String,
        receipt: Option<Box<TransactionReceipt>>,
    },

    #[error("Relay service unreachable: {0}")]
    RelayUnreachable(String),

    #[error("Quote expired at {valid_until}")]
    QuoteExpired { valid_until: String },

    #[error("Transaction {id} is not exitable: {reason}")]
    NotExitable { id: String, reason: String },

    #[error("Chain {chain_id} not found")]
    ChainNotFound { chain_id: u64 },

    #[error("Chain connection error for chain {chain_id}: {message}")]
    ChainConnection { chain_id: u64, message: String },

    #[error("Contract error: {0}")]
    Contract(String),

    #[error("Signer error: {0}")]
    Signer(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl BridgeError {
    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::RelayUnreachable(_) | BridgeError::ChainConnection { .. }
        )
    }

    /// Check if error was raised by input validation, before any network call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidAddress(_)
                | BridgeError::InvalidAmount(_)
                | BridgeError::InvalidTransactionId(_)
                | BridgeError::QuoteExpired { .. }
        )
    }

    /// Receipt attached to a failed submission, if any
    pub fn receipt(&self) -> Option<&TransactionReceipt> {
        match self {
            BridgeError::TransactionFailed { receipt, .. } => receipt.as_deref(),
            _ => None,
        }
    }

    pub(crate) fn failed(reason: impl Into<String>) -> Self {
        BridgeError::TransactionFailed {
            reason: reason.into(),
            receipt: None,
        }
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(e: reqwest::Error) -> Self {
        BridgeError::RelayUnreachable(e.to_string())
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;
