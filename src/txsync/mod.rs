//! Broadcaster callbacks
//!
//! ARC reports status changes of broadcast transactions. A `MINED` callback
//! carries the merkle path, which turns the stored transaction into a
//! proof-carrying one.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    bsv::{hash::TxId, merkle_path::MerklePath, spv::SpvTransaction, transaction::Transaction},
    cancellation::TokioCancellationToken,
    chain::TxInfo,
    data_structures::{TrackedTransaction, TxStatus},
    errors::{WalletError, WalletResult},
    storage::TransactionRepository,
};

#[derive(Clone)]
pub struct CallbackSyncService {
    transactions: Arc<dyn TransactionRepository>,
}

impl CallbackSyncService {
    pub fn new(transactions: Arc<dyn TransactionRepository>) -> Self {
        Self { transactions }
    }

    pub async fn handle(&self, token: &TokioCancellationToken, info: &TxInfo) -> WalletResult<()> {
        if info.tx_id.is_empty() {
            return Err(WalletError::InvalidCallback(
                "callback without transaction id".to_string(),
            ));
        }
        let tx_id = TxId::from_hex(&info.tx_id)
            .map_err(|e| WalletError::InvalidCallback(format!("transaction id {}: {e}", info.tx_id)))?;

        let stored = self
            .transactions
            .get_transaction(token, &tx_id)
            .await?
            .ok_or_else(|| WalletError::ResourceNotFound(format!("transaction {tx_id}")))?;

        if stored.updated_at > info.timestamp {
            debug!(
                tx_id = %tx_id,
                stored_at = %stored.updated_at,
                callback_at = %info.timestamp,
                "Dropping out-of-order callback"
            );
            return Ok(());
        }

        if info.tx_status.is_problematic() {
            let mut updated = stored;
            updated.status = TxStatus::Problematic;
            updated.updated_at = info.timestamp;
            self.transactions.update_transaction(token, &updated).await?;
            warn!(tx_id = %tx_id, status = ?info.tx_status, "Transaction marked problematic");
            return Ok(());
        }

        if !info.tx_status.is_mined() {
            debug!(tx_id = %tx_id, status = ?info.tx_status, "Callback status needs no update");
            return Ok(());
        }

        let updated = mined(stored, &tx_id, info)?;
        self.transactions.update_transaction(token, &updated).await?;
        info!(
            tx_id = %tx_id,
            block_height = ?updated.block_height,
            "Transaction mined"
        );
        Ok(())
    }
}

/// Stored transaction with the callback's merkle path attached
fn mined(
    stored: TrackedTransaction,
    tx_id: &TxId,
    info: &TxInfo,
) -> WalletResult<TrackedTransaction> {
    let path_hex = info.merkle_path.as_deref().ok_or_else(|| {
        WalletError::MerklePathInvalid(format!("MINED callback for {tx_id} has no merkle path"))
    })?;
    let path = MerklePath::from_hex(path_hex)
        .map_err(|e| WalletError::MerklePathInvalid(format!("merkle path of {tx_id}: {e}")))?;

    let block_height = info.block_height.ok_or_else(|| {
        WalletError::MerklePathInvalid(format!("MINED callback for {tx_id} has no block height"))
    })?;
    if path.block_height != block_height {
        return Err(WalletError::MerklePathInvalid(format!(
            "merkle path of {tx_id} is for block {}, callback says {block_height}",
            path.block_height
        )));
    }
    path.compute_root(tx_id)?;

    if let (Some(previous), Some(current)) = (&stored.block_hash, &info.block_hash) {
        if previous != current {
            warn!(
                tx_id = %tx_id,
                previous = %previous,
                current = %current,
                "Transaction moved to another block, overwriting"
            );
        }
    }

    let mut spv = match (&stored.beef_hex, &stored.raw_hex) {
        (Some(beef), _) if !beef.is_empty() => SpvTransaction::from_beef_hex(beef)?,
        (_, Some(raw)) if !raw.is_empty() => SpvTransaction::new(Transaction::from_hex(raw)?),
        _ => {
            return Err(WalletError::InternalError(format!(
                "stored transaction {tx_id} has no serial form"
            )))
        }
    };
    spv.merkle_path = Some(path);

    let mut updated = stored.with_beef_hex(spv.to_beef_hex());
    updated.status = TxStatus::Mined;
    updated.block_hash = info.block_hash.clone();
    updated.block_height = Some(block_height);
    updated.updated_at = info.timestamp;
    Ok(updated)
}
