//! Wire models of the broadcaster (ARC) and the block-header service

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::fee::FeeUnit;

/// Transaction status as reported by ARC
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ArcTxStatus {
    Queued,
    Received,
    Stored,
    AnnouncedToNetwork,
    RequestedByNetwork,
    SentToNetwork,
    AcceptedByNetwork,
    SeenOnNetwork,
    SeenInOrphanMempool,
    DoubleSpendAttempted,
    Rejected,
    Mined,
    /// Also used for statuses this crate does not know
    #[serde(other)]
    Unknown,
}

impl ArcTxStatus {
    /// Statuses that move a tracked transaction to `PROBLEMATIC`
    pub fn is_problematic(&self) -> bool {
        matches!(
            self,
            ArcTxStatus::Rejected
                | ArcTxStatus::DoubleSpendAttempted
                | ArcTxStatus::Unknown
                | ArcTxStatus::SeenInOrphanMempool
        )
    }

    pub fn is_mined(&self) -> bool {
        *self == ArcTxStatus::Mined
    }
}

/// Broadcast response, query response and callback body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    #[serde(rename = "txid", default)]
    pub tx_id: String,
    #[serde(alias = "status")]
    pub tx_status: ArcTxStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merkle_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra_info: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub competing_txs: Vec<String>,
}

impl TxInfo {
    pub fn new(tx_id: impl Into<String>, tx_status: ArcTxStatus) -> Self {
        Self {
            tx_id: tx_id.into(),
            tx_status,
            timestamp: Utc::now(),
            block_hash: None,
            block_height: None,
            merkle_path: None,
            extra_info: None,
            competing_txs: Vec::new(),
        }
    }
}

/// RFC 7807 style error body returned by ARC
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ArcError {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub detail: String,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(default)]
    pub txid: Option<String>,
    #[serde(default)]
    pub extra_info: Option<String>,
}

impl ArcError {
    pub fn summary(&self) -> String {
        let mut summary = format!("{} ({}): {}", self.title, self.status, self.detail);
        if let Some(extra) = self.extra_info.as_deref().filter(|e| !e.is_empty()) {
            summary.push_str(" - ");
            summary.push_str(extra);
        }
        summary
    }
}

/// `GET /v1/policy` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyResponse {
    pub policy: Policy,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Policy {
    #[serde(default)]
    pub max_script_size_policy: u64,
    #[serde(default)]
    pub max_tx_size_policy: u64,
    #[serde(default)]
    pub max_tx_sigops_count_policy: u64,
    pub mining_fee: FeeUnit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleRootConfirmationRequest {
    pub merkle_root: String,
    pub block_height: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MerkleRootConfirmationState {
    Confirmed,
    Invalid,
    UnableToVerify,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleRootConfirmation {
    #[serde(rename = "blockHash", default)]
    pub hash: String,
    pub block_height: u64,
    pub merkle_root: String,
    pub confirmation: MerkleRootConfirmationState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerkleRootsConfirmations {
    pub confirmation_state: MerkleRootConfirmationState,
    #[serde(default)]
    pub confirmations: Vec<MerkleRootConfirmation>,
}
