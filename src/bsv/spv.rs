//! A transaction together with the ancestry needed to verify it
//!
//! Ancestors live in an arena keyed by transaction id: one object per id,
//! shared by every input that spends from it. Walks over the graph keep a
//! visited set so malformed data with cycles still terminates.

use std::collections::{BTreeMap, HashSet};

use crate::bsv::beef::{Beef, BeefTx};
use crate::bsv::hash::TxId;
use crate::bsv::merkle_path::MerklePath;
use crate::bsv::transaction::{Transaction, TxInput, TxOutput};
use crate::errors::{WalletError, WalletResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorTx {
    pub tx: Transaction,
    pub merkle_path: Option<MerklePath>,
}

impl AncestorTx {
    pub fn is_mined(&self) -> bool {
        self.merkle_path.is_some()
    }
}

/// Ancestor transactions indexed by id
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TxArena {
    entries: BTreeMap<TxId, AncestorTx>,
}

impl TxArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless present; a proof-carrying entry replaces a proofless one
    pub fn insert(&mut self, tx: Transaction, merkle_path: Option<MerklePath>) -> TxId {
        let txid = tx.txid();
        match self.entries.get_mut(&txid) {
            Some(existing) => {
                if existing.merkle_path.is_none() && merkle_path.is_some() {
                    existing.merkle_path = merkle_path;
                }
            }
            None => {
                self.entries.insert(txid, AncestorTx { tx, merkle_path });
            }
        }
        txid
    }

    pub fn get(&self, txid: &TxId) -> Option<&AncestorTx> {
        self.entries.get(txid)
    }

    pub fn contains(&self, txid: &TxId) -> bool {
        self.entries.contains_key(txid)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TxId, &AncestorTx)> {
        self.entries.iter()
    }
}

/// Subject transaction plus its ancestor arena
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpvTransaction {
    pub tx: Transaction,
    /// Set once the subject itself is mined
    pub merkle_path: Option<MerklePath>,
    pub ancestors: TxArena,
}

impl SpvTransaction {
    pub fn new(tx: Transaction) -> Self {
        Self {
            tx,
            merkle_path: None,
            ancestors: TxArena::new(),
        }
    }

    pub fn txid(&self) -> TxId {
        self.tx.txid()
    }

    /// Output spent by `input`, when its source is in the arena
    pub fn source_output(&self, input: &TxInput) -> Option<&TxOutput> {
        self.ancestors
            .get(&input.source_txid)
            .and_then(|source| source.tx.outputs.get(input.source_vout as usize))
    }

    /// Ids of sources not present in the arena
    pub fn missing_sources(&self) -> Vec<TxId> {
        let mut seen = HashSet::new();
        self.tx
            .inputs
            .iter()
            .map(|input| input.source_txid)
            .filter(|id| !self.ancestors.contains(id) && seen.insert(*id))
            .collect()
    }

    pub fn total_input_satoshis(&self) -> WalletResult<u64> {
        self.tx.inputs.iter().try_fold(0u64, |sum, input| {
            let source = self.source_output(input).ok_or_else(|| {
                WalletError::InvalidTransactionInput(format!(
                    "source output {}:{} is unknown",
                    input.source_txid, input.source_vout
                ))
            })?;
            Ok(sum + source.satoshis)
        })
    }

    /// Extended Format hex, when every input's source is attached
    pub fn to_extended_format_hex(&self) -> Option<String> {
        self.tx
            .to_extended_format(|input| self.source_output(input))
            .map(hex::encode)
    }

    /// Ancestors reachable from the subject, parents first
    ///
    /// Recursion stops at ancestors carrying a merkle path.
    fn ordered_ancestors(&self) -> Vec<TxId> {
        let mut visited = HashSet::new();
        let mut ordered = Vec::new();
        for input in &self.tx.inputs {
            self.visit(input.source_txid, &mut visited, &mut ordered);
        }
        ordered
    }

    fn visit(&self, txid: TxId, visited: &mut HashSet<TxId>, ordered: &mut Vec<TxId>) {
        if !visited.insert(txid) {
            return;
        }
        let Some(entry) = self.ancestors.get(&txid) else {
            return;
        };
        if !entry.is_mined() {
            for input in &entry.tx.inputs {
                self.visit(input.source_txid, visited, ordered);
            }
        }
        ordered.push(txid);
    }

    pub fn to_beef(&self) -> Beef {
        fn add_bump(beef: &mut Beef, path: &MerklePath) -> usize {
            match beef.bumps.iter().position(|existing| existing == path) {
                Some(index) => index,
                None => {
                    beef.bumps.push(path.clone());
                    beef.bumps.len() - 1
                }
            }
        }

        let mut beef = Beef::default();
        for txid in self.ordered_ancestors() {
            if let Some(entry) = self.ancestors.get(&txid) {
                let bump_index = entry
                    .merkle_path
                    .as_ref()
                    .map(|path| add_bump(&mut beef, path));
                beef.transactions.push(BeefTx {
                    tx: entry.tx.clone(),
                    bump_index,
                });
            }
        }

        let bump_index = self
            .merkle_path
            .as_ref()
            .map(|path| add_bump(&mut beef, path));
        beef.transactions.push(BeefTx {
            tx: self.tx.clone(),
            bump_index,
        });
        beef
    }

    pub fn to_beef_hex(&self) -> String {
        self.to_beef().to_hex()
    }

    /// Subject is the last transaction; all others become ancestors
    pub fn from_beef(beef: &Beef) -> WalletResult<Self> {
        let (subject, rest) = beef.transactions.split_last().ok_or_else(|| {
            WalletError::SerializationError("BEEF contains no transactions".to_string())
        })?;

        let mut ancestors = TxArena::new();
        for entry in rest {
            ancestors.insert(entry.tx.clone(), beef.bump_of(entry).cloned());
        }

        Ok(Self {
            tx: subject.tx.clone(),
            merkle_path: beef.bump_of(subject).cloned(),
            ancestors,
        })
    }

    pub fn from_beef_hex(hex_str: &str) -> WalletResult<Self> {
        Self::from_beef(&Beef::from_hex(hex_str)?)
    }

    /// `(merkle root hex, block height)` for every proof in the ancestry
    pub fn merkle_roots(&self) -> WalletResult<Vec<(String, u64)>> {
        let mut roots = Vec::new();
        for (txid, entry) in self.ancestors.iter() {
            if let Some(path) = &entry.merkle_path {
                let root = path.compute_root_hex(txid)?;
                if !roots.contains(&(root.clone(), path.block_height)) {
                    roots.push((root, path.block_height));
                }
            }
        }
        if let Some(path) = &self.merkle_path {
            let root = path.compute_root_hex(&self.txid())?;
            if !roots.contains(&(root.clone(), path.block_height)) {
                roots.push((root, path.block_height));
            }
        }
        Ok(roots)
    }
}
