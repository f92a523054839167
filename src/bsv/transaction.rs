//! Transactions in the legacy consensus format
//!
//! Inputs and outputs are encoded by the `bitcoin` consensus codec. The
//! envelope is assembled field by field so that zero-input transactions keep
//! the legacy layout instead of being read as segwit.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::serialize;
use bitcoin::transaction::Version;
use bitcoin::{Amount, OutPoint, Sequence, TxIn, TxOut, Witness};

use crate::bsv::encoding::{varint_size, write_var_bytes, write_varint, ByteReader};
use crate::bsv::hash::TxId;
use crate::bsv::script::Script;
use crate::errors::{WalletError, WalletResult};

pub const DEFAULT_SEQUENCE: u32 = 0xffff_ffff;
pub const DEFAULT_VERSION: u32 = 1;

/// Version and lock time: 4 + 4 bytes
pub const ENVELOPE_SIZE: usize = 8;

/// Marker that follows the version in Extended Format (BRC-30)
const EXTENDED_FORMAT_MARKER: [u8; 6] = [0x00, 0x00, 0x00, 0x00, 0x00, 0xEF];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxInput {
    pub source_txid: TxId,
    pub source_vout: u32,
    pub unlocking_script: Script,
    pub sequence: u32,
}

impl TxInput {
    /// Unsigned input spending `source_txid:source_vout`
    pub fn new(source_txid: TxId, source_vout: u32) -> Self {
        Self {
            source_txid,
            source_vout,
            unlocking_script: Script::default(),
            sequence: DEFAULT_SEQUENCE,
        }
    }

    pub fn to_bitcoin(&self) -> TxIn {
        TxIn {
            previous_output: OutPoint::new(self.source_txid.as_txid(), self.source_vout),
            script_sig: self.unlocking_script.as_script_buf().clone(),
            sequence: Sequence(self.sequence),
            witness: Witness::default(),
        }
    }

    fn size(&self) -> usize {
        32 + 4 + varint_size(self.unlocking_script.len() as u64) + self.unlocking_script.len() + 4
    }
}

impl TryFrom<TxIn> for TxInput {
    type Error = WalletError;

    fn try_from(input: TxIn) -> WalletResult<Self> {
        if !input.witness.is_empty() {
            return Err(WalletError::SerializationError(
                "Witness data is not part of the BSV transaction format".to_string(),
            ));
        }
        Ok(Self {
            source_txid: input.previous_output.txid.into(),
            source_vout: input.previous_output.vout,
            unlocking_script: input.script_sig.into(),
            sequence: input.sequence.0,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOutput {
    pub satoshis: u64,
    pub locking_script: Script,
}

impl TxOutput {
    pub fn new(satoshis: u64, locking_script: Script) -> Self {
        Self {
            satoshis,
            locking_script,
        }
    }

    /// Serialised size: 8 + varint(script length) + script
    pub fn size(&self) -> usize {
        8 + varint_size(self.locking_script.len() as u64) + self.locking_script.len()
    }

    pub fn to_bitcoin(&self) -> TxOut {
        TxOut {
            value: Amount::from_sat(self.satoshis),
            script_pubkey: self.locking_script.as_script_buf().clone(),
        }
    }

    pub(crate) fn write(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&serialize(&self.to_bitcoin()));
    }
}

impl From<TxOut> for TxOutput {
    fn from(output: TxOut) -> Self {
        Self {
            satoshis: output.value.to_sat(),
            locking_script: output.script_pubkey.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    pub lock_time: u32,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            version: DEFAULT_VERSION,
            inputs: Vec::new(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    pub fn to_bitcoin(&self) -> bitcoin::Transaction {
        bitcoin::Transaction {
            version: Version(self.version as i32),
            lock_time: LockTime::from_consensus(self.lock_time),
            input: self.inputs.iter().map(TxInput::to_bitcoin).collect(),
            output: self.outputs.iter().map(TxOutput::to_bitcoin).collect(),
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        self.write(&mut buf);
        buf
    }

    pub fn write(&self, buf: &mut Vec<u8>) {
        let tx = self.to_bitcoin();
        buf.extend_from_slice(&serialize(&tx.version));
        buf.extend_from_slice(&serialize(&tx.input));
        buf.extend_from_slice(&serialize(&tx.output));
        buf.extend_from_slice(&serialize(&tx.lock_time));
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    /// Parse exactly one transaction; trailing bytes are an error
    pub fn from_bytes(bytes: &[u8]) -> WalletResult<Self> {
        let mut reader = ByteReader::new(bytes);
        let tx = Self::read(&mut reader)?;
        if !reader.is_empty() {
            return Err(WalletError::SerializationError(format!(
                "{} trailing bytes after transaction",
                reader.remaining()
            )));
        }
        Ok(tx)
    }

    pub fn from_hex(hex_str: &str) -> WalletResult<Self> {
        Self::from_bytes(&hex::decode(hex_str.trim())?)
    }

    /// Read one transaction from a stream
    pub fn read(reader: &mut ByteReader<'_>) -> WalletResult<Self> {
        let version: Version = reader.read_consensus()?;
        let inputs: Vec<TxIn> = reader.read_consensus()?;
        let outputs: Vec<TxOut> = reader.read_consensus()?;
        let lock_time: LockTime = reader.read_consensus()?;
        Self::try_from(bitcoin::Transaction {
            version,
            lock_time,
            input: inputs,
            output: outputs,
        })
    }

    pub fn txid(&self) -> TxId {
        self.to_bitcoin().compute_txid().into()
    }

    pub fn size(&self) -> usize {
        let inputs: usize = self.inputs.iter().map(TxInput::size).sum();
        let outputs: usize = self.outputs.iter().map(TxOutput::size).sum();
        ENVELOPE_SIZE
            + varint_size(self.inputs.len() as u64)
            + inputs
            + varint_size(self.outputs.len() as u64)
            + outputs
    }

    pub fn total_output_satoshis(&self) -> u64 {
        self.outputs.iter().map(|o| o.satoshis).sum()
    }

    /// Extended Format (BRC-30): every input also carries its source output
    ///
    /// `source_of` must return the output spent by each input; `None` for any
    /// input makes the encoding impossible.
    pub fn to_extended_format<'a, F>(&self, mut source_of: F) -> Option<Vec<u8>>
    where
        F: FnMut(&TxInput) -> Option<&'a TxOutput>,
    {
        let tx = self.to_bitcoin();
        let mut buf = Vec::with_capacity(self.size() * 2);
        buf.extend_from_slice(&serialize(&tx.version));
        buf.extend_from_slice(&EXTENDED_FORMAT_MARKER);
        write_varint(&mut buf, tx.input.len() as u64);
        for (input, raw) in self.inputs.iter().zip(&tx.input) {
            let source = source_of(input)?;
            buf.extend_from_slice(&serialize(raw));
            buf.extend_from_slice(&source.satoshis.to_le_bytes());
            write_var_bytes(&mut buf, source.locking_script.as_bytes());
        }
        buf.extend_from_slice(&serialize(&tx.output));
        buf.extend_from_slice(&serialize(&tx.lock_time));
        Some(buf)
    }
}

impl TryFrom<bitcoin::Transaction> for Transaction {
    type Error = WalletError;

    fn try_from(tx: bitcoin::Transaction) -> WalletResult<Self> {
        Ok(Self {
            version: tx.version.0 as u32,
            inputs: tx
                .input
                .into_iter()
                .map(TxInput::try_from)
                .collect::<WalletResult<_>>()?,
            outputs: tx.output.into_iter().map(TxOutput::from).collect(),
            lock_time: tx.lock_time.to_consensus_u32(),
        })
    }
}
