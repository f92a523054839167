use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::bsv::hash::TxId;
use crate::data_structures::Outpoint;

/// Output the wallet cares about
///
/// `spending_tx` is set at most once and never cleared.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedOutput {
    pub outpoint: Outpoint,
    pub user_id: String,
    pub satoshis: u64,
    pub spending_tx: Option<TxId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedOutput {
    pub fn new(outpoint: Outpoint, user_id: String, satoshis: u64) -> Self {
        let now = Utc::now();
        Self {
            outpoint,
            user_id,
            satoshis,
            spending_tx: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Spent by a transaction other than `tx_id`
    pub fn is_spent_by_other(&self, tx_id: &TxId) -> bool {
        matches!(&self.spending_tx, Some(spender) if spender != tx_id)
    }
}
