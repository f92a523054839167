use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key_management::CustomInstructions;

/// On-chain destination owned by a user, with the instructions that derive it
/// from the user's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletAddress {
    pub address: String,
    pub user_id: String,
    pub custom_instructions: CustomInstructions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft delete marker
    pub deleted_at: Option<DateTime<Utc>>,
}

impl WalletAddress {
    pub fn new(address: String, user_id: String, custom_instructions: CustomInstructions) -> Self {
        let now = Utc::now();
        Self {
            address,
            user_id,
            custom_instructions,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        }
    }
}
