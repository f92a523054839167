//! Signature hash with the BSV fork id (BIP143-style preimage)

use bitcoin::consensus::encode::serialize;

use crate::bsv::hash::sha256d;
use crate::bsv::transaction::{Transaction, TxOutput};
use crate::errors::{WalletError, WalletResult};

pub const SIGHASH_ALL: u32 = 0x01;
pub const SIGHASH_NONE: u32 = 0x02;
pub const SIGHASH_SINGLE: u32 = 0x03;
pub const SIGHASH_FORKID: u32 = 0x40;
pub const SIGHASH_ANYONECANPAY: u32 = 0x80;

/// `SIGHASH_ALL | SIGHASH_FORKID`, the only type wallets produce
pub const SIGHASH_ALL_FORKID: u32 = SIGHASH_ALL | SIGHASH_FORKID;

/// Preimage of input `input_index` spending `source`
pub fn preimage(
    tx: &Transaction,
    input_index: usize,
    source: &TxOutput,
    sighash_type: u32,
) -> WalletResult<Vec<u8>> {
    let input = tx.inputs.get(input_index).ok_or_else(|| {
        WalletError::InvalidArgument(format!("input index {input_index} out of range"))
    })?;
    if sighash_type & SIGHASH_FORKID == 0 {
        return Err(WalletError::TxValidation(format!(
            "sighash type 0x{sighash_type:02x} is missing SIGHASH_FORKID"
        )));
    }

    let base_type = sighash_type & 0x1f;
    let anyone_can_pay = sighash_type & SIGHASH_ANYONECANPAY != 0;

    let hash_prevouts = if anyone_can_pay {
        [0u8; 32]
    } else {
        let mut buf = Vec::with_capacity(tx.inputs.len() * 36);
        for i in &tx.inputs {
            buf.extend_from_slice(&serialize(&i.to_bitcoin().previous_output));
        }
        sha256d(&buf)
    };

    let hash_sequence =
        if anyone_can_pay || base_type == SIGHASH_SINGLE || base_type == SIGHASH_NONE {
            [0u8; 32]
        } else {
            let mut buf = Vec::with_capacity(tx.inputs.len() * 4);
            for i in &tx.inputs {
                buf.extend_from_slice(&i.sequence.to_le_bytes());
            }
            sha256d(&buf)
        };

    let hash_outputs = if base_type != SIGHASH_SINGLE && base_type != SIGHASH_NONE {
        let mut buf = Vec::new();
        for output in &tx.outputs {
            output.write(&mut buf);
        }
        sha256d(&buf)
    } else if base_type == SIGHASH_SINGLE && input_index < tx.outputs.len() {
        let mut buf = Vec::new();
        tx.outputs[input_index].write(&mut buf);
        sha256d(&buf)
    } else {
        [0u8; 32]
    };

    let mut buf = Vec::with_capacity(160 + source.locking_script.len());
    buf.extend_from_slice(&tx.version.to_le_bytes());
    buf.extend_from_slice(&hash_prevouts);
    buf.extend_from_slice(&hash_sequence);
    buf.extend_from_slice(&serialize(&input.to_bitcoin().previous_output));
    buf.extend_from_slice(&serialize(source.locking_script.as_script_buf()));
    buf.extend_from_slice(&source.satoshis.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());
    buf.extend_from_slice(&hash_outputs);
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());
    buf.extend_from_slice(&sighash_type.to_le_bytes());
    Ok(buf)
}

/// Digest that is signed for input `input_index`
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    source: &TxOutput,
    sighash_type: u32,
) -> WalletResult<[u8; 32]> {
    Ok(sha256d(&preimage(tx, input_index, source, sighash_type)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsv::hash::TxId;
    use crate::bsv::script::Script;
    use crate::bsv::transaction::TxInput;

    fn tx() -> Transaction {
        let mut tx = Transaction::new();
        tx.inputs.push(TxInput::new(TxId::from_internal_bytes([1u8; 32]), 0));
        tx.inputs.push(TxInput::new(TxId::from_internal_bytes([2u8; 32]), 3));
        tx.outputs.push(TxOutput::new(5, Script::p2pkh(&[3u8; 20])));
        tx
    }

    #[test]
    fn test_forkid_required() {
        let source = TxOutput::new(10, Script::p2pkh(&[1u8; 20]));
        assert!(signature_hash(&tx(), 0, &source, SIGHASH_ALL).is_err());
    }

    #[test]
    fn test_hash_depends_on_input_and_value() {
        let source = TxOutput::new(10, Script::p2pkh(&[1u8; 20]));
        let richer = TxOutput::new(11, Script::p2pkh(&[1u8; 20]));
        let a = signature_hash(&tx(), 0, &source, SIGHASH_ALL_FORKID).unwrap();
        let b = signature_hash(&tx(), 1, &source, SIGHASH_ALL_FORKID).unwrap();
        let c = signature_hash(&tx(), 0, &richer, SIGHASH_ALL_FORKID).unwrap();
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_preimage_layout_length() {
        let source = TxOutput::new(10, Script::p2pkh(&[1u8; 20]));
        let preimage = preimage(&tx(), 0, &source, SIGHASH_ALL_FORKID).unwrap();
        assert_eq!(preimage.len(), 4 + 32 + 32 + 36 + 1 + 25 + 8 + 4 + 32 + 4 + 4);
    }
}
