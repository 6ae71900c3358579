//! Relay request coordination
//!
//! Relay requests are fire-and-forget from the initiator's point of view:
//! the source transaction has already succeeded, so a relay failure is
//! logged and left for the next sweep.

use super::{RelayApi, RelayRequest};
use crate::error::BridgeResult;
use crate::types::{BridgeStatus, BridgeTransaction};

use ethers::types::H256;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Outcome of a sweep over stuck transactions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub requested: usize,
    pub failed: usize,
}

/// Requests relay of submitted transactions
#[derive(Clone)]
pub struct RelayCoordinator {
    relay: Arc<dyn RelayApi>,
}

impl RelayCoordinator {
    pub fn new(relay: Arc<dyn RelayApi>) -> Self {
        Self { relay }
    }

    /// Ask the relay service to forward a transaction.
    ///
    /// Safe to repeat: the service ignores ids it has already relayed.
    pub async fn request_relay(&self, id: H256, source_chain: u64) -> BridgeResult<()> {
        let request = RelayRequest {
            transaction_id: id,
            source_chain,
        };

        match self.relay.request_relay(&request).await {
            Ok(()) => {
                debug!("Relay requested for {:?} from chain {}", id, source_chain);
                crate::metrics::record_relay_request("accepted");
                Ok(())
            }
            Err(e) => {
                crate::metrics::record_relay_request("failed");
                Err(e)
            }
        }
    }

    /// Request relay on the caller's runtime without waiting for the outcome.
    ///
    /// Failures are logged only. Returns `None` when called outside a tokio runtime.
    pub fn request_relay_detached(&self, id: H256, source_chain: u64) -> Option<JoinHandle<()>> {
        let handle = match Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No runtime to relay {:?}; leaving it for the next sweep", id);
                return None;
            }
        };

        let coordinator = self.clone();
        Some(handle.spawn(async move {
            if let Err(e) = coordinator.request_relay(id, source_chain).await {
                warn!(
                    "Relay request for {:?} failed, will retry on sweep: {}",
                    id, e
                );
            }
        }))
    }

    /// Re-request relay for every transaction still `PENDING`
    pub async fn sweep(&self, transactions: &[BridgeTransaction]) -> SweepReport {
        let pending: Vec<_> = transactions
            .iter()
            .filter(|tx| tx.status() == BridgeStatus::Pending)
            .collect();

        let results = join_all(
            pending
                .iter()
                .map(|tx| self.request_relay(tx.id(), tx.source_chain())),
        )
        .await;

        let failed = results.iter().filter(|r| r.is_err()).count();
        let report = SweepReport {
            requested: results.len(),
            failed,
        };

        if report.requested > 0 {
            info!(
                "Relay sweep requested {} transactions ({} failed)",
                report.requested, report.failed
            );
        }

        report
    }
}
