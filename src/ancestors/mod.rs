//! Ancestry resolution for spending transactions
//!
//! Source transactions are looked up level by level, one batched query per
//! level. A stored proof-carrying row ends its branch: the BEEF already holds
//! everything needed to verify it. Raw rows are walked further through their
//! own inputs.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::{
    bsv::{
        hash::TxId,
        spv::{SpvTransaction, TxArena},
        transaction::Transaction,
        verify::{verify_scripts, P2pkhScriptVerifier, ScriptVerifier},
    },
    cancellation::TokioCancellationToken,
    data_structures::TrackedTransaction,
    errors::{WalletError, WalletResult},
    storage::TransactionRepository,
};

pub const DEFAULT_LEVEL_BOUND: usize = 16;

#[derive(Clone)]
pub struct AncestorResolver {
    transactions: Arc<dyn TransactionRepository>,
    verifier: Arc<dyn ScriptVerifier>,
    level_bound: usize,
}

impl AncestorResolver {
    pub fn new(transactions: Arc<dyn TransactionRepository>, level_bound: usize) -> Self {
        Self {
            transactions,
            verifier: Arc::new(P2pkhScriptVerifier),
            level_bound,
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn ScriptVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Attach every missing source of `spv` from stored transactions and
    /// verify the unmined ancestors
    ///
    /// The subject itself is not verified; outlines are still unsigned.
    pub async fn attach_sources(
        &self,
        token: &TokioCancellationToken,
        spv: &mut SpvTransaction,
    ) -> WalletResult<()> {
        self.walk(token, spv).await?;
        verify_ancestors(self.verifier.as_ref(), &spv.ancestors)
    }

    /// Attach sources, then verify the ancestors and the signed subject
    pub async fn attach_and_verify(
        &self,
        token: &TokioCancellationToken,
        spv: &mut SpvTransaction,
    ) -> WalletResult<()> {
        self.walk(token, spv).await?;
        verify_ancestors(self.verifier.as_ref(), &spv.ancestors)?;
        verify_scripts(self.verifier.as_ref(), spv).map_err(|e| {
            WalletError::InvalidTransactionInput(format!("subject {}: {e}", spv.txid()))
        })
    }

    async fn walk(
        &self,
        token: &TokioCancellationToken,
        spv: &mut SpvTransaction,
    ) -> WalletResult<()> {
        let mut visited: HashSet<TxId> = spv.ancestors.iter().map(|(id, _)| *id).collect();
        let mut frontier = spv.missing_sources();
        let mut level = 0;

        while !frontier.is_empty() {
            if level >= self.level_bound {
                return Err(WalletError::InvalidTransactionInput(format!(
                    "ancestry of {} is deeper than {} levels",
                    spv.txid(),
                    self.level_bound
                )));
            }
            level += 1;
            visited.extend(frontier.iter().copied());

            let rows = self.transactions.get_transactions(token, &frontier).await?;
            let mut next = Vec::new();
            for row in &rows {
                for source in merge_row(&mut spv.ancestors, row)? {
                    if !visited.contains(&source) && !next.contains(&source) {
                        next.push(source);
                    }
                }
            }
            debug!(
                tx_id = %spv.txid(),
                level,
                requested = frontier.len(),
                found = rows.len(),
                "Ancestor level resolved"
            );
            frontier = next
                .into_iter()
                .filter(|id| !spv.ancestors.contains(id))
                .collect();
        }

        let missing = spv.missing_sources();
        if !missing.is_empty() {
            let ids: Vec<String> = missing.iter().map(TxId::to_hex).collect();
            return Err(WalletError::InvalidTransactionInput(format!(
                "source transactions not found: {}",
                ids.join(", ")
            )));
        }
        Ok(())
    }
}

/// Insert a stored transaction into the arena, returning the sources still
/// to be fetched for it
fn merge_row(arena: &mut TxArena, row: &TrackedTransaction) -> WalletResult<Vec<TxId>> {
    if let Some(beef_hex) = row.beef_hex.as_deref().filter(|h| !h.is_empty()) {
        let stored = SpvTransaction::from_beef_hex(beef_hex).map_err(|e| {
            WalletError::InvalidTransactionInput(format!("stored BEEF of {}: {e}", row.id))
        })?;
        ensure_id(row, &stored.tx)?;
        for (_, ancestor) in stored.ancestors.iter() {
            arena.insert(ancestor.tx.clone(), ancestor.merkle_path.clone());
        }
        arena.insert(stored.tx, stored.merkle_path);
        return Ok(Vec::new());
    }

    let raw_hex = row.raw_hex.as_deref().ok_or_else(|| {
        WalletError::InvalidTransactionInput(format!("transaction {} has no serial form", row.id))
    })?;
    let tx = Transaction::from_hex(raw_hex).map_err(|e| {
        WalletError::InvalidTransactionInput(format!("stored raw transaction {}: {e}", row.id))
    })?;
    ensure_id(row, &tx)?;
    let sources = tx.inputs.iter().map(|input| input.source_txid).collect();
    arena.insert(tx, None);
    Ok(sources)
}

fn ensure_id(row: &TrackedTransaction, tx: &Transaction) -> WalletResult<()> {
    let parsed = tx.txid();
    if parsed != row.id {
        return Err(WalletError::InvalidTransactionInput(format!(
            "stored transaction {} decodes to {parsed}",
            row.id
        )));
    }
    Ok(())
}

/// Check every unmined ancestor's inputs against their sources in the arena
pub fn verify_ancestors(verifier: &dyn ScriptVerifier, arena: &TxArena) -> WalletResult<()> {
    for (txid, ancestor) in arena.iter() {
        if ancestor.is_mined() {
            continue;
        }
        for (index, input) in ancestor.tx.inputs.iter().enumerate() {
            let source = arena
                .get(&input.source_txid)
                .and_then(|source| source.tx.outputs.get(input.source_vout as usize))
                .ok_or_else(|| {
                    WalletError::InvalidTransactionInput(format!(
                        "ancestor {txid} input {index} spends unknown output {}:{}",
                        input.source_txid, input.source_vout
                    ))
                })?;
            verifier
                .verify_input(&ancestor.tx, index, source)
                .map_err(|e| {
                    WalletError::InvalidTransactionInput(format!("ancestor {txid}: {e}"))
                })?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsv::{
        address::Address,
        merkle_path::{MerklePath, PathElement},
        script::Script,
        transaction::{TxInput, TxOutput},
    };
    use crate::data_structures::TxStatus;
    use crate::errors::ErrorKind;
    use crate::mocks::MockTransactionRepository;
    use secp256k1::{PublicKey, SecretKey, SECP256K1};

    fn address() -> Address {
        let secret = SecretKey::from_slice(&[3u8; 32]).unwrap();
        Address::from_public_key(&PublicKey::from_secret_key(SECP256K1, &secret))
    }

    fn coinbase_like(sats: u64) -> Transaction {
        let mut tx = Transaction::new();
        tx.inputs.push(TxInput::new(TxId::from_internal_bytes([9u8; 32]), 0));
        tx.outputs.push(TxOutput::new(sats, address().locking_script()));
        tx
    }

    fn spending(source: &Transaction, sats: u64) -> Transaction {
        let mut tx = Transaction::new();
        tx.inputs.push(TxInput::new(source.txid(), 0));
        tx.outputs.push(TxOutput::new(sats, Script::data_carrier(&[b"x"]).unwrap()));
        tx
    }

    fn mined_row(tx: &Transaction) -> TrackedTransaction {
        let mut spv = SpvTransaction::new(tx.clone());
        spv.merkle_path = Some(MerklePath::new(
            100,
            vec![vec![PathElement::txid(0, &tx.txid())]],
        ));
        TrackedTransaction::new(tx.txid(), TxStatus::Mined).with_beef_hex(spv.to_beef_hex())
    }

    #[tokio::test]
    async fn test_proof_carrying_row_ends_the_walk() {
        let funding = coinbase_like(1_000);
        let repo = Arc::new(MockTransactionRepository::new());
        repo.insert(mined_row(&funding)).await;

        let resolver = AncestorResolver::new(repo.clone(), DEFAULT_LEVEL_BOUND);
        let mut spv = SpvTransaction::new(spending(&funding, 900));
        resolver
            .attach_sources(&TokioCancellationToken::new(), &mut spv)
            .await
            .unwrap();

        assert!(spv.ancestors.get(&funding.txid()).unwrap().is_mined());
        assert!(spv.missing_sources().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_source_is_invalid_input() {
        let repo = Arc::new(MockTransactionRepository::new());
        let resolver = AncestorResolver::new(repo, DEFAULT_LEVEL_BOUND);
        let mut spv = SpvTransaction::new(spending(&coinbase_like(5), 1));

        let err = resolver
            .attach_sources(&TokioCancellationToken::new(), &mut spv)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransactionInput);
    }

    #[tokio::test]
    async fn test_level_bound_stops_long_raw_chains() {
        let repo = Arc::new(MockTransactionRepository::new());
        let mut tip = coinbase_like(100);
        repo.insert(
            TrackedTransaction::new(tip.txid(), TxStatus::Broadcasted).with_raw_hex(tip.to_hex()),
        )
        .await;
        for sats in (90..99).rev() {
            let next = spending(&tip, sats);
            repo.insert(
                TrackedTransaction::new(next.txid(), TxStatus::Broadcasted)
                    .with_raw_hex(next.to_hex()),
            )
            .await;
            tip = next;
        }

        let resolver = AncestorResolver::new(repo, 3);
        let mut spv = SpvTransaction::new(spending(&tip, 1));
        let err = resolver
            .attach_sources(&TokioCancellationToken::new(), &mut spv)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidTransactionInput);
        assert!(err.to_string().contains("deeper than 3 levels"));
    }
}
