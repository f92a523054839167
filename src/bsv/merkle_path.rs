//! BRC-74 merkle paths ("BUMP")
//!
//! Binary layout: `block height (varint) | tree height (u8)` followed, for each
//! level, by `leaf count (varint)` and the leaves. A leaf is
//! `offset (varint) | flags (u8) | hash (32 bytes, omitted for duplicates)`.

use std::collections::HashMap;

use crate::bsv::encoding::{write_varint, ByteReader};
use crate::bsv::hash::{sha256d, TxId};
use crate::errors::{WalletError, WalletResult};

const FLAG_DUPLICATE: u8 = 0x01;
const FLAG_TXID: u8 = 0x02;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathElement {
    pub offset: u64,
    /// Hash in internal byte order; absent for duplicates
    pub hash: Option<[u8; 32]>,
    /// Leaf is a transaction the path was built for
    pub txid: bool,
    /// Leaf duplicates its sibling
    pub duplicate: bool,
}

impl PathElement {
    pub fn hash(offset: u64, hash: [u8; 32]) -> Self {
        Self {
            offset,
            hash: Some(hash),
            txid: false,
            duplicate: false,
        }
    }

    pub fn txid(offset: u64, txid: &TxId) -> Self {
        Self {
            offset,
            hash: Some(*txid.as_internal_bytes()),
            txid: true,
            duplicate: false,
        }
    }

    pub fn duplicate(offset: u64) -> Self {
        Self {
            offset,
            hash: None,
            txid: false,
            duplicate: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerklePath {
    pub block_height: u64,
    /// Level 0 holds the leaves; each further level moves one step up the tree
    pub path: Vec<Vec<PathElement>>,
}

fn merkle_parent(left: &[u8; 32], right: &[u8; 32]) -> [u8; 32] {
    let mut concat = [0u8; 64];
    concat[..32].copy_from_slice(left);
    concat[32..].copy_from_slice(right);
    sha256d(&concat)
}

impl MerklePath {
    pub fn new(block_height: u64, path: Vec<Vec<PathElement>>) -> Self {
        Self { block_height, path }
    }

    pub fn read(reader: &mut ByteReader<'_>) -> WalletResult<Self> {
        let block_height = reader.read_varint()?;
        let tree_height = reader.read_u8()? as usize;
        let mut path = Vec::with_capacity(tree_height);
        for _ in 0..tree_height {
            let leaves = reader.read_length()?;
            let mut level = Vec::with_capacity(leaves);
            for _ in 0..leaves {
                let offset = reader.read_varint()?;
                let flags = reader.read_u8()?;
                let duplicate = flags & FLAG_DUPLICATE != 0;
                let hash = if duplicate {
                    None
                } else {
                    Some(reader.read_array::<32>()?)
                };
                level.push(PathElement {
                    offset,
                    hash,
                    txid: flags & FLAG_TXID != 0,
                    duplicate,
                });
            }
            path.push(level);
        }
        Ok(Self { block_height, path })
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        write_varint(buf, self.block_height);
        buf.push(self.path.len() as u8);
        for level in &self.path {
            write_varint(buf, level.len() as u64);
            for leaf in level {
                write_varint(buf, leaf.offset);
                let mut flags = 0u8;
                if leaf.duplicate {
                    flags |= FLAG_DUPLICATE;
                }
                if leaf.txid {
                    flags |= FLAG_TXID;
                }
                buf.push(flags);
                if let Some(hash) = &leaf.hash {
                    buf.extend_from_slice(hash);
                }
            }
        }
    }

    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let path = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(WalletError::MerklePathInvalid(format!(
                "{} trailing bytes after merkle path",
                reader.remaining()
            )));
        }
        Ok(path)
    }

    pub fn from_hex(hex_str: &str) -> WalletResult<Self> {
        let bytes = hex::decode(hex_str.trim())
            .map_err(|e| WalletError::MerklePathInvalid(format!("invalid hex: {e}")))?;
        Self::from_bytes(&bytes).map_err(|e| match e {
            WalletError::MerklePathInvalid(_) => e,
            other => WalletError::MerklePathInvalid(other.to_string()),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write(&mut buf);
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Whether `txid` is one of the leaves on level 0
    pub fn contains(&self, txid: &TxId) -> bool {
        self.leaf_offset(txid).is_some()
    }

    fn leaf_offset(&self, txid: &TxId) -> Option<u64> {
        self.path.first()?.iter().find_map(|leaf| {
            (leaf.hash.as_ref() == Some(txid.as_internal_bytes())).then_some(leaf.offset)
        })
    }

    /// Merkle root (internal byte order) for a transaction in this path
    pub fn compute_root(&self, txid: &TxId) -> WalletResult<[u8; 32]> {
        let index = self.leaf_offset(txid).ok_or_else(|| {
            WalletError::MerklePathInvalid(format!("transaction {txid} is not part of the path"))
        })?;

        let indexed: Vec<HashMap<u64, &PathElement>> = self
            .path
            .iter()
            .map(|level| level.iter().map(|leaf| (leaf.offset, leaf)).collect())
            .collect();

        // Single-transaction block: the txid is the root.
        if self.path.len() == 1 && self.path[0].len() == 1 {
            return Ok(*txid.as_internal_bytes());
        }

        let mut working = *txid.as_internal_bytes();
        for height in 0..self.path.len() {
            let sibling_offset = (index >> height) ^ 1;
            let sibling = self.find_or_compute(&indexed, height, sibling_offset)?;
            working = match sibling {
                None => merkle_parent(&working, &working),
                Some(hash) if sibling_offset % 2 != 0 => merkle_parent(&working, &hash),
                Some(hash) => merkle_parent(&hash, &working),
            };
        }
        Ok(working)
    }

    /// Root in display (byte-reversed) hex, the form block headers use
    pub fn compute_root_hex(&self, txid: &TxId) -> WalletResult<String> {
        let mut root = self.compute_root(txid)?;
        root.reverse();
        Ok(hex::encode(root))
    }

    /// Hash at (height, offset); `None` means "duplicate of the sibling"
    fn find_or_compute(
        &self,
        indexed: &[HashMap<u64, &PathElement>],
        height: usize,
        offset: u64,
    ) -> WalletResult<Option<[u8; 32]>> {
        if let Some(leaf) = indexed[height].get(&offset) {
            if leaf.duplicate {
                return Ok(None);
            }
            return leaf.hash.map(Some).ok_or_else(|| {
                WalletError::MerklePathInvalid(format!(
                    "leaf at height {height} offset {offset} has no hash"
                ))
            });
        }
        if height == 0 {
            return Err(WalletError::MerklePathInvalid(format!(
                "missing hash at height 0 offset {offset}"
            )));
        }
        let left = self.find_or_compute(indexed, height - 1, offset * 2)?;
        let right = self.find_or_compute(indexed, height - 1, offset * 2 + 1)?;
        match (left, right) {
            (Some(l), Some(r)) => Ok(Some(merkle_parent(&l, &r))),
            (Some(l), None) => Ok(Some(merkle_parent(&l, &l))),
            _ => Err(WalletError::MerklePathInvalid(format!(
                "cannot compute hash at height {height} offset {offset}"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_leaf_path(subject: &TxId, sibling: [u8; 32]) -> MerklePath {
        MerklePath::new(
            885803,
            vec![vec![
                PathElement::txid(0, subject),
                PathElement::hash(1, sibling),
            ]],
        )
    }

    #[test]
    fn test_compute_root_two_leaves() {
        let subject = TxId::from_internal_bytes([1u8; 32]);
        let path = two_leaf_path(&subject, [2u8; 32]);
        let root = path.compute_root(&subject).unwrap();
        assert_eq!(root, merkle_parent(&[1u8; 32], &[2u8; 32]));
    }

    #[test]
    fn test_subject_at_odd_offset_hashes_sibling_first() {
        let subject = TxId::from_internal_bytes([1u8; 32]);
        let path = MerklePath::new(
            10,
            vec![vec![
                PathElement::hash(0, [2u8; 32]),
                PathElement::txid(1, &subject),
            ]],
        );
        assert_eq!(
            path.compute_root(&subject).unwrap(),
            merkle_parent(&[2u8; 32], &[1u8; 32])
        );
    }

    #[test]
    fn test_duplicate_sibling() {
        let subject = TxId::from_internal_bytes([5u8; 32]);
        let path = MerklePath::new(
            3,
            vec![vec![PathElement::txid(2, &subject), PathElement::duplicate(3)], vec![PathElement::hash(0, [6u8; 32])]],
        );
        let level1 = merkle_parent(&[5u8; 32], &[5u8; 32]);
        assert_eq!(
            path.compute_root(&subject).unwrap(),
            merkle_parent(&[6u8; 32], &level1)
        );
    }

    #[test]
    fn test_binary_round_trip() {
        let subject = TxId::from_internal_bytes([1u8; 32]);
        let path = two_leaf_path(&subject, [2u8; 32]);
        let bytes = path.to_bytes();
        let parsed = MerklePath::from_bytes(&bytes).unwrap();
        assert_eq!(parsed, path);
        assert_eq!(parsed.to_bytes(), bytes);
    }

    #[test]
    fn test_tx_outside_path_is_rejected() {
        let subject = TxId::from_internal_bytes([1u8; 32]);
        let other = TxId::from_internal_bytes([9u8; 32]);
        let path = two_leaf_path(&subject, [2u8; 32]);
        assert!(!path.contains(&other));
        assert!(matches!(
            path.compute_root(&other),
            Err(WalletError::MerklePathInvalid(_))
        ));
    }
}
