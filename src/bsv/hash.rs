//! Hash helpers and the transaction identifier type

use std::fmt;
use std::str::FromStr;

use bitcoin::hashes::{hash160 as h160, sha256, sha256d as h256d, Hash};
use bitcoin::Txid;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{WalletError, WalletResult};

pub fn sha256(data: &[u8]) -> [u8; 32] {
    sha256::Hash::hash(data).to_byte_array()
}

/// Double SHA-256
pub fn sha256d(data: &[u8]) -> [u8; 32] {
    h256d::Hash::hash(data).to_byte_array()
}

/// RIPEMD-160 of SHA-256, used for public key hashes
pub fn hash160(data: &[u8]) -> [u8; 20] {
    h160::Hash::hash(data).to_byte_array()
}

/// Transaction identifier
///
/// Stored in internal byte order (as hashed); rendered byte-reversed in hex,
/// which is the form block explorers and broadcasters use.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TxId(Txid);

impl TxId {
    /// Build from bytes in internal (hash) order
    pub fn from_internal_bytes(bytes: [u8; 32]) -> Self {
        Self(Txid::from_byte_array(bytes))
    }

    /// Hash of a serialised transaction
    pub fn from_raw_tx(raw: &[u8]) -> Self {
        Self(Txid::from_raw_hash(h256d::Hash::hash(raw)))
    }

    pub fn as_internal_bytes(&self) -> &[u8; 32] {
        self.0.as_byte_array()
    }

    /// Parse from display (byte-reversed) hex
    pub fn from_hex(hex_str: &str) -> WalletResult<Self> {
        Txid::from_str(hex_str.trim())
            .map(Self)
            .map_err(|e| WalletError::SerializationError(format!("Invalid transaction id: {e}")))
    }

    /// Display (byte-reversed) hex
    pub fn to_hex(&self) -> String {
        self.0.to_string()
    }

    pub fn as_txid(&self) -> Txid {
        self.0
    }
}

impl Default for TxId {
    fn default() -> Self {
        Self(Txid::all_zeros())
    }
}

impl From<Txid> for TxId {
    fn from(txid: Txid) -> Self {
        Self(txid)
    }
}

impl From<TxId> for Txid {
    fn from(id: TxId) -> Self {
        id.0
    }
}

impl fmt::Display for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for TxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxId({})", self.0)
    }
}

impl FromStr for TxId {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl Serialize for TxId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for TxId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        TxId::from_hex(&s).map_err(serde::de::Error::custom)
    }
}
