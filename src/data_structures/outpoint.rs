use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bsv::hash::TxId;

/// Identity of a transaction output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outpoint {
    pub tx_id: TxId,
    pub vout: u32,
}

impl Outpoint {
    pub fn new(tx_id: TxId, vout: u32) -> Self {
        Self { tx_id, vout }
    }
}

impl fmt::Display for Outpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.tx_id, self.vout)
    }
}
