use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bsv::hash::TxId;
use crate::errors::WalletError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Incoming,
    Outgoing,
    Data,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Incoming => "incoming",
            OperationType::Outgoing => "outgoing",
            OperationType::Data => "data",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "incoming" => Ok(OperationType::Incoming),
            "outgoing" => Ok(OperationType::Outgoing),
            "data" => Ok(OperationType::Data),
            other => Err(WalletError::SerializationError(format!(
                "unknown operation type {other}"
            ))),
        }
    }
}

/// Ledger entry: net effect of one transaction on one user's balance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub tx_id: TxId,
    pub user_id: String,
    pub operation_type: OperationType,
    pub counterparty: String,
    pub value: i64,
    pub created_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(tx_id: TxId, user_id: String, operation_type: OperationType) -> Self {
        Self {
            tx_id,
            user_id,
            operation_type,
            counterparty: String::new(),
            value: 0,
            created_at: Utc::now(),
        }
    }

    /// Apply a debit; an incoming entry becomes outgoing
    pub fn subtract(&mut self, satoshis: u64) {
        self.value -= satoshis as i64;
        if self.operation_type != OperationType::Data {
            self.operation_type = OperationType::Outgoing;
        }
    }

    /// Apply a credit, keeping the type chosen by earlier debits
    pub fn add(&mut self, satoshis: u64) {
        self.value += satoshis as i64;
    }
}
