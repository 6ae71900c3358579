//! Transaction module - fee estimation, bridge submission and the exit flow

mod exit;
mod fee;
mod gas;
mod initiator;

pub use exit::ExitFlowManager;
pub use fee::FeeEstimator;
pub use gas::GasEstimator;
pub use initiator::{BridgeRequest, BridgeTransactionInitiator};

use crate::chain::TransactionSigner;
use crate::error::{BridgeError, BridgeResult};

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{TransactionReceipt, U64};
use tracing::{debug, error};

/// Send a prepared transaction and reject reverted receipts.
///
/// Submissions are never retried here: a failed state-changing call may
/// still have landed.
pub(crate) async fn submit(
    signer: &dyn TransactionSigner,
    tx: TypedTransaction,
    what: &str,
) -> BridgeResult<TransactionReceipt> {
    let chain_id = signer.chain_id();

    let receipt = match signer.send_transaction(tx).await {
        Ok(receipt) => receipt,
        Err(e) => {
            error!("Failed to send {} on chain {}: {}", what, chain_id, e);
            crate::metrics::record_tx_failed(chain_id);
            return Err(e);
        }
    };

    if receipt.status == Some(U64::zero()) {
        error!(
            "{} transaction {:?} reverted on chain {}",
            what, receipt.transaction_hash, chain_id
        );
        crate::metrics::record_tx_failed(chain_id);
        return Err(BridgeError::TransactionFailed {
            reason: format!("{} transaction {:?} reverted", what, receipt.transaction_hash),
            receipt: Some(Box::new(receipt)),
        });
    }

    debug!(
        "{} transaction {:?} included on chain {}",
        what, receipt.transaction_hash, chain_id
    );
    Ok(receipt)
}
