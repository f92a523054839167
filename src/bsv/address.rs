//! Base58Check P2PKH addresses

use std::fmt;
use std::str::FromStr;

use secp256k1::PublicKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::bsv::hash::hash160;
use crate::bsv::script::Script;
use crate::errors::{WalletError, WalletResult};

pub const MAINNET_P2PKH_PREFIX: u8 = 0x00;
pub const TESTNET_P2PKH_PREFIX: u8 = 0x6f;

/// P2PKH address: version byte plus the hash160 of a compressed public key
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Address {
    encoded: String,
    pubkey_hash: [u8; 20],
}

impl Address {
    /// Mainnet address of a compressed public key
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self::from_pubkey_hash(hash160(&public_key.serialize()), MAINNET_P2PKH_PREFIX)
    }

    pub fn from_pubkey_hash(pubkey_hash: [u8; 20], prefix: u8) -> Self {
        let encoded = bs58::encode(pubkey_hash)
            .with_check_version(prefix)
            .into_string();
        Self {
            encoded,
            pubkey_hash,
        }
    }

    /// Address paid by a P2PKH locking script
    pub fn from_locking_script(script: &Script) -> Option<Self> {
        script
            .p2pkh_pubkey_hash()
            .map(|hash| Self::from_pubkey_hash(hash, MAINNET_P2PKH_PREFIX))
    }

    pub fn parse(encoded: &str) -> WalletResult<Self> {
        let decoded = bs58::decode(encoded)
            .with_check(None)
            .into_vec()
            .map_err(|e| WalletError::InvalidArgument(format!("Invalid address {encoded}: {e}")))?;
        if decoded.len() != 21 {
            return Err(WalletError::InvalidArgument(format!(
                "Invalid address {encoded}: unexpected payload length {}",
                decoded.len()
            )));
        }
        if decoded[0] != MAINNET_P2PKH_PREFIX && decoded[0] != TESTNET_P2PKH_PREFIX {
            return Err(WalletError::InvalidArgument(format!(
                "Invalid address {encoded}: unsupported version byte {}",
                decoded[0]
            )));
        }
        let mut pubkey_hash = [0u8; 20];
        pubkey_hash.copy_from_slice(&decoded[1..]);
        Ok(Self {
            encoded: encoded.to_string(),
            pubkey_hash,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn pubkey_hash(&self) -> &[u8; 20] {
        &self.pubkey_hash
    }

    pub fn locking_script(&self) -> Script {
        Script::p2pkh(&self.pubkey_hash)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encoded)
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.encoded)
    }
}

impl FromStr for Address {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.encoded)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Address::parse(&s).map_err(serde::de::Error::custom)
    }
}
