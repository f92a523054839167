use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_structures::Outpoint;
use crate::errors::WalletError;
use crate::key_management::CustomInstructions;

/// Output classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Bucket {
    /// Spendable value
    #[default]
    Bsv,
    /// Unspendable data carrier
    Data,
}

impl Bucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            Bucket::Bsv => "bsv",
            Bucket::Data => "data",
        }
    }
}

impl fmt::Display for Bucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Bucket {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bsv" => Ok(Bucket::Bsv),
            "data" => Ok(Bucket::Data),
            other => Err(WalletError::SerializationError(format!("unknown bucket {other}"))),
        }
    }
}

/// Unspent, spendable output owned by a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub user_id: String,
    pub outpoint: Outpoint,
    pub satoshis: u64,
    pub estimated_input_size: u64,
    pub bucket: Bucket,
    pub custom_instructions: CustomInstructions,
    pub created_at: DateTime<Utc>,
    /// Last time the selector picked this output
    pub touched_at: DateTime<Utc>,
}

impl Utxo {
    pub fn new(
        user_id: String,
        outpoint: Outpoint,
        satoshis: u64,
        estimated_input_size: u64,
        custom_instructions: CustomInstructions,
    ) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            outpoint,
            satoshis,
            estimated_input_size,
            bucket: Bucket::Bsv,
            custom_instructions,
            created_at: now,
            touched_at: now,
        }
    }
}

/// Result of an atomic select-and-touch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UtxoSelection {
    /// Selected outputs in selection order
    pub utxos: Vec<Utxo>,
    /// Change left after outputs and fee; zero means no change output
    pub change: u64,
}

impl UtxoSelection {
    pub fn total_satoshis(&self) -> u64 {
        self.utxos.iter().map(|u| u.satoshis).sum()
    }
}
