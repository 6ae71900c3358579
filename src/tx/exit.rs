//! Second-phase exit for checkpointed withdrawals
//!
//! A withdrawal burned on the child chain is claimable on the root chain
//! once the checkpoint containing it has been posted. The claim never
//! expires and is never submitted automatically, so exitable withdrawals
//! must stay discoverable.

use super::{submit, GasEstimator};
use crate::chain::{ChainRegistry, TransactionSigner};
use crate::contracts::{calldata, ExitCall};
use crate::error::{BridgeError, BridgeResult};
use crate::history::BridgeTransactionHistory;
use crate::relay::RelayCoordinator;
use crate::status::StatusTracker;
use crate::types::BridgeTransaction;
use crate::validation::parse_address;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use ethers::types::{Address, H256, U256};
use std::sync::Arc;
use tracing::info;

/// Exit flow for pairs whose withdrawals are checkpointed
pub struct ExitFlowManager {
    registry: Arc<ChainRegistry>,
    tracker: Arc<StatusTracker>,
    history: Arc<BridgeTransactionHistory>,
    relay: RelayCoordinator,
    gas: GasEstimator,
    /// Exits reserved or submitted by this process and not yet recorded by the relay
    exits: DashMap<H256, ExitState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitState {
    InFlight,
    Submitted(H256),
}

impl ExitFlowManager {
    pub fn new(
        registry: Arc<ChainRegistry>,
        tracker: Arc<StatusTracker>,
        history: Arc<BridgeTransactionHistory>,
        relay: RelayCoordinator,
        gas: GasEstimator,
    ) -> Self {
        Self {
            registry,
            tracker,
            history,
            relay,
            gas,
            exits: DashMap::new(),
        }
    }

    /// Submit the exit for withdrawal `id` on the root chain.
    ///
    /// The id is reserved before any network call, so concurrent exits of
    /// the same withdrawal submit at most one transaction.
    pub async fn exit(
        &self,
        id: H256,
        recipient: &str,
        signer: &dyn TransactionSigner,
    ) -> BridgeResult<H256> {
        let recipient = parse_address(recipient)?;
        let root_chain = self.registry.root()?.chain_id;

        if signer.chain_id() != root_chain {
            return Err(BridgeError::Signer(format!(
                "exits are submitted on chain {}, signer is on chain {}",
                root_chain,
                signer.chain_id()
            )));
        }

        match self.exits.entry(id) {
            Entry::Occupied(entry) => {
                let reason = match *entry.get() {
                    ExitState::InFlight => "exit already in progress".to_string(),
                    ExitState::Submitted(hash) => format!("exit already submitted in {:?}", hash),
                };
                return Err(not_exitable(id, reason));
            }
            Entry::Vacant(entry) => {
                entry.insert(ExitState::InFlight);
            }
        }

        match self.submit_exit(id, recipient, signer).await {
            Ok(exit_hash) => {
                self.exits.insert(id, ExitState::Submitted(exit_hash));
                Ok(exit_hash)
            }
            Err(e) => {
                self.exits.remove(&id);
                Err(e)
            }
        }
    }

    async fn submit_exit(
        &self,
        id: H256,
        recipient: Address,
        signer: &dyn TransactionSigner,
    ) -> BridgeResult<H256> {
        let pair = self.registry.pair();
        let root = self.registry.root()?;

        let report = self.tracker.get_status(id, pair.child_chain_id).await?;
        if report.exit_tx_hash.is_some() {
            return Err(not_exitable(id, "exit already recorded by the relay service"));
        }
        if !report.checkpointed {
            return Err(not_exitable(id, "checkpoint not posted yet"));
        }
        let amount = report
            .amount
            .ok_or_else(|| not_exitable(id, "amount is unknown"))?;

        let tx = self
            .gas
            .prepare(
                root.reader.as_ref(),
                signer.address(),
                root.bridge_address,
                calldata(ExitCall {
                    transaction_id: id.0,
                    recipient,
                    amount,
                }),
                U256::zero(),
                None,
            )
            .await?;
        let receipt = submit(signer, tx, "exit").await?;
        let exit_hash = receipt.transaction_hash;

        crate::metrics::record_exit(root.chain_id);
        info!(
            "Exit for {:?} submitted on chain {}: {:?}",
            id, root.chain_id, exit_hash
        );

        self.relay.request_relay_detached(id, pair.child_chain_id);

        Ok(exit_hash)
    }

    /// Exit `transaction` and record the exit hash on it
    pub async fn exit_transaction(
        &self,
        transaction: &mut BridgeTransaction,
        recipient: &str,
        signer: &dyn TransactionSigner,
    ) -> BridgeResult<H256> {
        let hash = self.exit(transaction.id(), recipient, signer).await?;
        transaction.record_exit(hash);
        Ok(hash)
    }

    /// Checkpointed withdrawals of `address` still waiting for an exit
    pub async fn list_exitable(&self, address: Address) -> BridgeResult<Vec<BridgeTransaction>> {
        let child_chain = self.registry.pair().child_chain_id;
        let indexed = self.history.indexed_exitable(address).await?;

        // Once the relay has recorded an exit, local bookkeeping is no longer needed
        for tx in indexed.iter().filter(|tx| tx.exit_tx_hash().is_some()) {
            self.exits
                .remove_if(&tx.id(), |_, state| matches!(state, ExitState::Submitted(_)));
        }

        Ok(indexed
            .into_iter()
            .filter(|tx| tx.exit_tx_hash().is_none())
            .filter(|tx| tx.source_chain() == child_chain)
            .filter(|tx| !self.exits.contains_key(&tx.id()))
            .collect())
    }

    /// Number of exits this process is still tracking
    pub fn tracked_exits(&self) -> usize {
        self.exits.len()
    }
}

fn not_exitable(id: H256, reason: impl Into<String>) -> BridgeError {
    BridgeError::NotExitable {
        id: format!("{:?}", id),
        reason: reason.into(),
    }
}
