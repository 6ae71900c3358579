//! Transaction signing capability
//!
//! The engine never holds keys itself: it hands prepared transactions to a
//! `TransactionSigner` supplied by the host application.

use crate::error::{BridgeError, BridgeResult};

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use std::time::Duration;
use tracing::{debug, info};

/// Signs and submits transactions on one chain
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    /// Address transactions are sent from
    fn address(&self) -> Address;

    /// Chain the signer submits to
    fn chain_id(&self) -> u64;

    /// Sign, broadcast and wait for inclusion
    async fn send_transaction(&self, tx: TypedTransaction) -> BridgeResult<TransactionReceipt>;
}

/// Local private-key signer backed by an HTTP RPC node
pub struct WalletSigner {
    client: SignerMiddleware<Provider<Http>, LocalWallet>,
    chain_id: u64,
}

impl WalletSigner {
    pub fn new(rpc_url: &str, wallet: LocalWallet, chain_id: u64) -> BridgeResult<Self> {
        let provider = Provider::<Http>::try_from(rpc_url)
            .map_err(|e| BridgeError::Config(format!("Invalid RPC URL {}: {}", rpc_url, e)))?
            .interval(Duration::from_millis(500));
        let wallet = wallet.with_chain_id(chain_id);

        info!(
            "Signer initialized for chain {} with wallet: {:?}",
            chain_id,
            wallet.address()
        );

        Ok(Self {
            client: SignerMiddleware::new(provider, wallet),
            chain_id,
        })
    }

    /// Load the private key from an environment variable
    pub fn from_env(var: &str, rpc_url: &str, chain_id: u64) -> BridgeResult<Self> {
        let key = std::env::var(var).map_err(|_| {
            BridgeError::Signer(format!("No wallet configured. Set {}", var))
        })?;
        let wallet = key
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Signer(format!("Invalid private key: {}", e)))?;

        Self::new(rpc_url, wallet, chain_id)
    }
}

#[async_trait]
impl TransactionSigner for WalletSigner {
    fn address(&self) -> Address {
        self.client.address()
    }

    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn send_transaction(&self, tx: TypedTransaction) -> BridgeResult<TransactionReceipt> {
        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| classify_send_error(e.to_string()))?;

        let tx_hash = pending.tx_hash();
        debug!("Transaction sent on chain {}: {:?}", self.chain_id, tx_hash);

        pending
            .await
            .map_err(|e| BridgeError::ChainConnection {
                chain_id: self.chain_id,
                message: format!("waiting for {:?}: {}", tx_hash, e),
            })?
            .ok_or_else(|| BridgeError::failed(format!("transaction {:?} was dropped", tx_hash)))
    }
}

fn classify_send_error(message: String) -> BridgeError {
    if message.contains("insufficient funds") {
        BridgeError::InsufficientFunds {
            have: "unknown".to_string(),
            need: "unknown".to_string(),
        }
    } else {
        BridgeError::failed(message)
    }
}
