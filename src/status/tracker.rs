use super::{BridgeStatus, StatusReport, StatusSource};
use crate::chain::ChainRegistry;
use crate::contracts::{calldata, GetTransactionCall, TransactionRecord};
use crate::error::{BridgeError, BridgeResult};
use crate::relay::{RelayApi, RelayStatus};
use crate::types::BridgeTransaction;

use chrono::Utc;
use ethers::types::H256;
use std::sync::Arc;
use tracing::{debug, warn};

/// Resolves the current status of bridge transactions.
///
/// Polling is left to the caller. `get_status` reports what the sources
/// say right now; `refresh` applies it to a transaction, whose status
/// never regresses.
pub struct StatusTracker {
    registry: Arc<ChainRegistry>,
    relay: Arc<dyn RelayApi>,
}

impl StatusTracker {
    pub fn new(registry: Arc<ChainRegistry>, relay: Arc<dyn RelayApi>) -> Self {
        Self { registry, relay }
    }

    /// Status of `id`, submitted on `source_chain`, as currently reported
    pub async fn get_status(&self, id: H256, source_chain: u64) -> BridgeResult<StatusReport> {
        let endpoint = self.registry.get(source_chain)?;

        let report = match self.relay.transaction_status(id).await {
            Ok(Some(status)) => from_relay(status),
            Ok(None) => {
                debug!("Relay has not indexed {:?}, reading chain {}", id, source_chain);
                self.from_chain(id, source_chain).await?
            }
            Err(e) => {
                warn!(
                    "Relay status for {:?} unavailable ({}), falling back to chain {}",
                    id, e, source_chain
                );
                self.from_chain(id, source_chain).await?
            }
        };
        crate::metrics::record_status_query(endpoint.chain_id, report.source.as_str());

        Ok(report)
    }

    /// Poll `transaction` once and apply the observed status to it.
    ///
    /// The returned report carries the transaction's status after the
    /// update, so a stale answer never shows as a regression.
    pub async fn refresh(&self, transaction: &mut BridgeTransaction) -> BridgeResult<StatusReport> {
        let mut report = self
            .get_status(transaction.id(), transaction.source_chain())
            .await?;

        let at = report.completed_at.unwrap_or_else(Utc::now);
        if transaction.apply_status(report.status, at) {
            debug!(
                "Transaction {} is now {}",
                transaction.id_hex(),
                transaction.status()
            );
        } else if report.status != transaction.status() {
            debug!(
                "Ignoring {} for {}, already {}",
                report.status,
                transaction.id_hex(),
                transaction.status()
            );
        }
        report.status = transaction.status();
        if report.checkpointed {
            transaction.mark_checkpointed();
        }
        if let (None, Some(hash)) = (transaction.exit_tx_hash(), report.exit_tx_hash) {
            transaction.record_exit(hash);
        }

        Ok(report)
    }

    async fn from_chain(&self, id: H256, source_chain: u64) -> BridgeResult<StatusReport> {
        let endpoint = self.registry.get(source_chain)?;
        let raw = endpoint
            .reader
            .call(
                endpoint.bridge_address,
                calldata(GetTransactionCall {
                    transaction_id: id.0,
                }),
            )
            .await?;
        let record = TransactionRecord::decode_return(&raw)?;
        let unknown = || {
            BridgeError::Unknown(format!(
                "transaction {:?} is unknown to the bridge on chain {}",
                id, source_chain
            ))
        };
        if !record.exists() {
            return Err(unknown());
        }

        let status = BridgeStatus::from_contract_code(record.status).ok_or_else(unknown)?;

        Ok(StatusReport {
            id,
            status,
            source: StatusSource::OnChain,
            checkpointed: false,
            amount: Some(record.amount),
            recipient: Some(record.recipient),
            completed_at: None,
            exit_tx_hash: None,
        })
    }
}

fn from_relay(status: RelayStatus) -> StatusReport {
    StatusReport {
        id: status.id,
        status: status.status,
        source: StatusSource::Relay,
        checkpointed: status.checkpointed,
        amount: status.amount,
        recipient: status.recipient,
        completed_at: status.completed_at,
        exit_tx_hash: status.exit_tx_hash,
    }
}
