//! Transaction history per address
//!
//! The relay service owns the indexed history. When it cannot be reached,
//! bridge event logs within the configured look-back window are scanned
//! on both chains instead. Scanned entries are always `PENDING` and carry
//! no fee; refresh them through the status tracker for a real status.

use crate::chain::{ChainEndpoint, ChainRegistry};
use crate::error::BridgeResult;
use crate::events::{parse_log, topic_for, BridgeEvent};
use crate::relay::RelayApi;
use crate::token::TokenMappingResolver;
use crate::types::{BridgeDirection, BridgeTransaction, NewBridgeTransaction};

use ethers::types::{Address, Filter, H256};
use std::sync::Arc;
use tracing::{debug, warn};

/// Lists past, pending and exitable transfers of an address
pub struct BridgeTransactionHistory {
    registry: Arc<ChainRegistry>,
    relay: Arc<dyn RelayApi>,
    resolver: Arc<TokenMappingResolver>,
    lookback_blocks: u64,
}

impl BridgeTransactionHistory {
    pub fn new(
        registry: Arc<ChainRegistry>,
        relay: Arc<dyn RelayApi>,
        resolver: Arc<TokenMappingResolver>,
        lookback_blocks: u64,
    ) -> Self {
        Self {
            registry,
            relay,
            resolver,
            lookback_blocks,
        }
    }

    /// All known transfers involving `address`
    pub async fn list(&self, address: Address) -> BridgeResult<Vec<BridgeTransaction>> {
        match self.relay.transactions(address).await {
            Ok(transactions) => Ok(transactions),
            Err(e) => {
                warn!(
                    "Relay history for {:?} unavailable ({}), scanning bridge logs",
                    address, e
                );
                self.scan(address).await
            }
        }
    }

    /// Transfers not yet in a terminal state
    pub async fn list_pending(&self, address: Address) -> BridgeResult<Vec<BridgeTransaction>> {
        Ok(self
            .list(address)
            .await?
            .into_iter()
            .filter(|tx| !tx.status().is_terminal())
            .collect())
    }

    /// Checkpointed withdrawals awaiting an exit, as indexed by the relay.
    ///
    /// There is no log-scan fallback: logs cannot tell whether a checkpoint
    /// has been posted.
    pub async fn exitable(&self, address: Address) -> BridgeResult<Vec<BridgeTransaction>> {
        Ok(self
            .indexed_exitable(address)
            .await?
            .into_iter()
            .filter(|tx| tx.exit_tx_hash().is_none())
            .collect())
    }

    /// The relay's exitable list as returned, including entries it has seen exited
    pub(crate) async fn indexed_exitable(
        &self,
        address: Address,
    ) -> BridgeResult<Vec<BridgeTransaction>> {
        self.relay.exitable_transactions(address).await
    }

    async fn scan(&self, address: Address) -> BridgeResult<Vec<BridgeTransaction>> {
        let root = self.registry.root()?;
        let child = self.registry.child()?;

        let (deposits, withdrawals) = futures::try_join!(
            self.scan_chain(root, BridgeDirection::Deposit, address),
            self.scan_chain(child, BridgeDirection::Withdraw, address),
        )?;

        let mut transactions = Vec::with_capacity(deposits.len() + withdrawals.len());
        for (chain_id, event) in deposits.into_iter().chain(withdrawals) {
            transactions.push(self.from_event(chain_id, event).await?);
        }
        Ok(transactions)
    }

    async fn scan_chain(
        &self,
        endpoint: &ChainEndpoint,
        direction: BridgeDirection,
        address: Address,
    ) -> BridgeResult<Vec<(u64, BridgeEvent)>> {
        let latest = endpoint.reader.block_number().await?;
        let from = latest.saturating_sub(self.lookback_blocks);

        // Deposit indexes the sender and Withdrawal the recipient, both as topic 2
        let filter = Filter::new()
            .address(endpoint.bridge_address)
            .topic0(topic_for(direction))
            .topic2(H256::from(address))
            .from_block(from)
            .to_block(latest);

        let logs = endpoint.reader.get_logs(&filter).await?;
        let events: Vec<_> = logs
            .iter()
            .filter_map(parse_log)
            .filter(|ev| ev.direction() == direction && involves(ev, address))
            .map(|ev| (endpoint.chain_id, ev))
            .collect();

        debug!(
            "Found {} {} events for {:?} on chain {} in blocks {}..={}",
            events.len(),
            direction.name(),
            address,
            endpoint.chain_id,
            from,
            latest
        );
        Ok(events)
    }

    async fn from_event(&self, chain_id: u64, event: BridgeEvent) -> BridgeResult<BridgeTransaction> {
        let pair = self.registry.pair();
        let target_chain = pair.counterpart(chain_id)?;

        let (token, sender, recipient) = match &event {
            // The deposit event does not carry the recipient
            BridgeEvent::Deposit { token, sender, .. } => (*token, *sender, *sender),
            BridgeEvent::Withdrawal {
                token, recipient, ..
            } => (*token, *recipient, *recipient),
        };

        let target_token = match self.resolver.resolve(token, chain_id).await {
            Ok(target) => target,
            Err(e) => {
                debug!("No counterpart for {:?} on chain {}: {}", token, chain_id, e);
                Address::zero()
            }
        };

        Ok(BridgeTransaction::new(NewBridgeTransaction {
            id: event.transaction_id(),
            source_chain: chain_id,
            target_chain,
            source_token: token,
            target_token,
            sender,
            recipient,
            amount: event.amount(),
            source_tx_hash: event.tx_hash(),
            fee: None,
        }))
    }
}

fn involves(event: &BridgeEvent, address: Address) -> bool {
    match event {
        BridgeEvent::Deposit { sender, .. } => *sender == address,
        BridgeEvent::Withdrawal { recipient, .. } => *recipient == address,
    }
}
