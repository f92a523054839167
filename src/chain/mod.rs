//! Network collaborators: broadcaster and block-header service
//!
//! Services depend on [`Broadcaster`] and [`MerkleRootsVerifier`]; the HTTP
//! implementations live behind the `http` feature.

pub mod models;

#[cfg(feature = "http")]
pub mod arc;
#[cfg(feature = "http")]
pub mod bhs;

pub use models::*;

#[cfg(feature = "http")]
pub use arc::ArcClient;
#[cfg(feature = "http")]
pub use bhs::BlockHeadersClient;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    bsv::{hash::TxId, spv::SpvTransaction},
    cancellation::TokioCancellationToken,
    errors::{WalletError, WalletResult},
};

#[async_trait]
pub trait Broadcaster: Send + Sync {
    /// Submit a signed transaction; problematic statuses are errors
    async fn broadcast(
        &self,
        token: &TokioCancellationToken,
        tx: &SpvTransaction,
    ) -> WalletResult<TxInfo>;

    /// Current status of a transaction; `None` when the network does not know it
    async fn query_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Option<TxInfo>>;
}

#[async_trait]
pub trait MerkleRootsVerifier: Send + Sync {
    async fn verify_merkle_roots(
        &self,
        token: &TokioCancellationToken,
        roots: &[MerkleRootConfirmationRequest],
    ) -> WalletResult<MerkleRootsConfirmations>;
}

const MISSING_INPUTS: &str = "missing inputs";

/// Broadcast, asking the network about the transaction before giving up on a
/// `missing inputs` rejection
///
/// A resubmitted transaction is rejected that way once its inputs are spent by
/// itself, so a known, non-problematic status counts as success.
pub async fn broadcast_with_fallback(
    broadcaster: &dyn Broadcaster,
    token: &TokioCancellationToken,
    tx: &SpvTransaction,
) -> WalletResult<TxInfo> {
    let tx_id = tx.txid();
    match broadcaster.broadcast(token, tx).await {
        Ok(info) => Ok(info),
        Err(WalletError::Cancelled) => Err(WalletError::Cancelled),
        Err(e) if e.to_string().to_lowercase().contains(MISSING_INPUTS) => {
            info!(tx_id = %tx_id, "Broadcast reported missing inputs, querying transaction");
            match broadcaster.query_transaction(token, &tx_id).await {
                Ok(Some(known)) if !known.tx_status.is_problematic() => Ok(known),
                Ok(_) => Err(e),
                Err(query_err) => {
                    warn!(tx_id = %tx_id, error = %query_err, "Mempool query failed");
                    Err(e)
                }
            }
        }
        Err(e) => Err(e),
    }
}

/// Fail on `INVALID`, warn on `UNABLE_TO_VERIFY`
pub async fn verify_merkle_roots_of(
    verifier: &dyn MerkleRootsVerifier,
    token: &TokioCancellationToken,
    tx: &SpvTransaction,
) -> WalletResult<()> {
    let roots: Vec<MerkleRootConfirmationRequest> = tx
        .merkle_roots()?
        .into_iter()
        .map(|(merkle_root, block_height)| MerkleRootConfirmationRequest {
            merkle_root,
            block_height,
        })
        .collect();
    if roots.is_empty() {
        return Ok(());
    }

    let response = verifier.verify_merkle_roots(token, &roots).await?;
    match response.confirmation_state {
        MerkleRootConfirmationState::Confirmed => Ok(()),
        MerkleRootConfirmationState::UnableToVerify => {
            warn!(
                tx_id = %tx.txid(),
                "Block header service could not verify merkle roots, continuing"
            );
            Ok(())
        }
        MerkleRootConfirmationState::Invalid => {
            let invalid: Vec<String> = response
                .confirmations
                .iter()
                .filter(|c| c.confirmation == MerkleRootConfirmationState::Invalid)
                .map(|c| format!("{}@{}", c.merkle_root, c.block_height))
                .collect();
            Err(WalletError::MerkleRootsInvalid(invalid.join(", ")))
        }
    }
}
