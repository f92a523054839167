//! BEEF V1 (BRC-62) envelopes
//!
//! `magic 0100BEEF | nBUMPs | BUMP... | nTxs | (raw tx | has-bump | bump index?)...`
//! Transactions are ordered parents first; the last one is the subject.
//! Parsing keeps the original order so that re-serialising a parsed envelope
//! yields the same bytes.

use crate::bsv::encoding::{write_varint, ByteReader};
use crate::bsv::hash::TxId;
use crate::bsv::merkle_path::MerklePath;
use crate::bsv::transaction::Transaction;
use crate::errors::{WalletError, WalletResult};

/// Version 1 magic as it appears on the wire
pub const BEEF_V1_MAGIC: [u8; 4] = [0x01, 0x00, 0xBE, 0xEF];
/// Version 2 magic; recognised only to give a clear error
pub const BEEF_V2_MAGIC: [u8; 4] = [0x02, 0x00, 0xBE, 0xEF];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BeefTx {
    pub tx: Transaction,
    pub bump_index: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Beef {
    pub bumps: Vec<MerklePath>,
    pub transactions: Vec<BeefTx>,
}

/// Whether the hex string starts with a BEEF magic (case-insensitive)
pub fn is_beef_hex(hex_str: &str) -> bool {
    let prefix = hex_str.trim().get(..8).map(|p| p.to_ascii_lowercase());
    matches!(prefix.as_deref(), Some("0100beef") | Some("0200beef"))
}

impl Beef {
    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let magic: [u8; 4] = reader.read_array()?;
        if magic == BEEF_V2_MAGIC {
            return Err(WalletError::UnsupportedTransactionFormat(
                "BEEF V2 is not supported".to_string(),
            ));
        }
        if magic != BEEF_V1_MAGIC {
            return Err(WalletError::UnsupportedTransactionFormat(format!(
                "unexpected BEEF magic {}",
                hex::encode(magic)
            )));
        }

        let bump_count = reader.read_length()?;
        let mut bumps = Vec::with_capacity(bump_count);
        for _ in 0..bump_count {
            bumps.push(MerklePath::read(&mut reader)?);
        }

        let tx_count = reader.read_length()?;
        let mut transactions = Vec::with_capacity(tx_count);
        for _ in 0..tx_count {
            let tx = Transaction::read(&mut reader)?;
            let bump_index = match reader.read_u8()? {
                0 => None,
                1 => {
                    let index = reader.read_varint()? as usize;
                    if index >= bumps.len() {
                        return Err(WalletError::SerializationError(format!(
                            "BUMP index {index} out of range ({} BUMPs)",
                            bumps.len()
                        )));
                    }
                    Some(index)
                }
                flag => {
                    return Err(WalletError::SerializationError(format!(
                        "invalid has-bump flag {flag}"
                    )))
                }
            };
            transactions.push(BeefTx { tx, bump_index });
        }

        if !reader.is_empty() {
            return Err(WalletError::SerializationError(format!(
                "{} trailing bytes after BEEF",
                reader.remaining()
            )));
        }
        if transactions.is_empty() {
            return Err(WalletError::SerializationError(
                "BEEF contains no transactions".to_string(),
            ));
        }

        Ok(Self {
            bumps,
            transactions,
        })
    }

    pub fn from_hex(hex_str: &str) -> WalletResult<Self> {
        Self::from_bytes(&hex::decode(hex_str.trim())?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&BEEF_V1_MAGIC);
        write_varint(&mut buf, self.bumps.len() as u64);
        for bump in &self.bumps {
            bump.write(&mut buf);
        }
        write_varint(&mut buf, self.transactions.len() as u64);
        for entry in &self.transactions {
            entry.tx.write(&mut buf);
            match entry.bump_index {
                Some(index) => {
                    buf.push(1);
                    write_varint(&mut buf, index as u64);
                }
                None => buf.push(0),
            }
        }
        buf
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// The last transaction of the envelope
    pub fn subject(&self) -> Option<&BeefTx> {
        self.transactions.last()
    }

    pub fn subject_txid(&self) -> Option<TxId> {
        self.subject().map(|entry| entry.tx.txid())
    }

    /// Merkle path attached to an entry, if any
    pub fn bump_of(&self, entry: &BeefTx) -> Option<&MerklePath> {
        entry.bump_index.and_then(|index| self.bumps.get(index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsv::merkle_path::PathElement;
    use crate::bsv::script::Script;
    use crate::bsv::transaction::{TxInput, TxOutput};

    fn parent_and_child() -> (Transaction, Transaction) {
        let mut parent = Transaction::new();
        parent
            .inputs
            .push(TxInput::new(TxId::from_internal_bytes([7u8; 32]), 0));
        parent
            .outputs
            .push(TxOutput::new(100, Script::p2pkh(&[1u8; 20])));

        let mut child = Transaction::new();
        child.inputs.push(TxInput::new(parent.txid(), 0));
        child
            .outputs
            .push(TxOutput::new(90, Script::p2pkh(&[2u8; 20])));
        (parent, child)
    }

    #[test]
    fn test_round_trip_is_byte_identical() {
        let (parent, child) = parent_and_child();
        let bump = MerklePath::new(
            100,
            vec![vec![
                PathElement::txid(0, &parent.txid()),
                PathElement::hash(1, [4u8; 32]),
            ]],
        );
        let beef = Beef {
            bumps: vec![bump],
            transactions: vec![
                BeefTx {
                    tx: parent,
                    bump_index: Some(0),
                },
                BeefTx {
                    tx: child.clone(),
                    bump_index: None,
                },
            ],
        };

        let hex = beef.to_hex();
        assert!(hex.starts_with("0100beef"));
        assert!(is_beef_hex(&hex.to_uppercase()));

        let parsed = Beef::from_hex(&hex).unwrap();
        assert_eq!(parsed, beef);
        assert_eq!(parsed.to_hex(), hex);
        assert_eq!(parsed.subject_txid(), Some(child.txid()));
    }

    #[test]
    fn test_rejects_raw_transaction_hex() {
        let (parent, _) = parent_and_child();
        assert!(!is_beef_hex(&parent.to_hex()));
        assert!(Beef::from_hex(&parent.to_hex()).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_bump_index() {
        let (parent, _) = parent_and_child();
        let mut bytes = BEEF_V1_MAGIC.to_vec();
        bytes.push(0);
        bytes.push(1);
        parent.write(&mut bytes);
        bytes.push(1);
        bytes.push(0);
        assert!(Beef::from_bytes(&bytes).is_err());
    }
}
