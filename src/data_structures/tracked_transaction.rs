use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bsv::hash::TxId;
use crate::errors::WalletError;

/// Lifecycle of a recorded transaction
///
/// `Created -> Broadcasted -> Mined`, with `Problematic` reachable from any
/// unmined state and left again by a later `Mined` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Created,
    Broadcasted,
    Mined,
    Problematic,
}

impl TxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TxStatus::Created => "CREATED",
            TxStatus::Broadcasted => "BROADCASTED",
            TxStatus::Mined => "MINED",
            TxStatus::Problematic => "PROBLEMATIC",
        }
    }
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TxStatus {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CREATED" => Ok(TxStatus::Created),
            "BROADCASTED" => Ok(TxStatus::Broadcasted),
            "MINED" => Ok(TxStatus::Mined),
            "PROBLEMATIC" => Ok(TxStatus::Problematic),
            other => Err(WalletError::SerializationError(format!(
                "unknown transaction status {other}"
            ))),
        }
    }
}

/// Transaction persisted by the wallet
///
/// Exactly one of `beef_hex` and `raw_hex` is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedTransaction {
    pub id: TxId,
    pub status: TxStatus,
    pub beef_hex: Option<String>,
    pub raw_hex: Option<String>,
    pub block_hash: Option<String>,
    pub block_height: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedTransaction {
    pub fn new(id: TxId, status: TxStatus) -> Self {
        let now = Utc::now();
        Self {
            id,
            status,
            beef_hex: None,
            raw_hex: None,
            block_hash: None,
            block_height: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_beef_hex(mut self, beef_hex: String) -> Self {
        self.beef_hex = Some(beef_hex);
        self.raw_hex = None;
        self
    }

    pub fn with_raw_hex(mut self, raw_hex: String) -> Self {
        self.raw_hex = Some(raw_hex);
        self.beef_hex = None;
        self
    }

    /// Serial form stored for this transaction
    pub fn hex(&self) -> Option<&str> {
        self.beef_hex
            .as_deref()
            .filter(|h| !h.is_empty())
            .or(self.raw_hex.as_deref().filter(|h| !h.is_empty()))
    }

    pub fn has_proof_form(&self) -> bool {
        self.beef_hex.as_deref().is_some_and(|h| !h.is_empty())
    }

    pub fn validate(&self) -> Result<(), String> {
        let beef = self.beef_hex.as_deref().is_some_and(|h| !h.is_empty());
        let raw = self.raw_hex.as_deref().is_some_and(|h| !h.is_empty());
        if beef == raw {
            return Err(format!(
                "transaction {} must carry exactly one of beef_hex and raw_hex",
                self.id
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        for status in [
            TxStatus::Created,
            TxStatus::Broadcasted,
            TxStatus::Mined,
            TxStatus::Problematic,
        ] {
            assert_eq!(status.as_str().parse::<TxStatus>().unwrap(), status);
        }
        assert!("PENDING".parse::<TxStatus>().is_err());
    }

    #[test]
    fn test_exactly_one_serial_form() {
        let id = TxId::from_internal_bytes([1u8; 32]);
        let tx = TrackedTransaction::new(id, TxStatus::Broadcasted);
        assert!(tx.validate().is_err());

        let raw = tx.clone().with_raw_hex("01".to_string());
        assert!(raw.validate().is_ok());
        assert_eq!(raw.hex(), Some("01"));

        let beef = raw.with_beef_hex("0100beef".to_string());
        assert!(beef.validate().is_ok());
        assert!(beef.raw_hex.is_none());
        assert!(beef.has_proof_form());
    }
}
