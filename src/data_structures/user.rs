use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data_structures::PaymailAddress;

/// Wallet user; `id` is the address of the user's public key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    /// Compressed public key, hex
    pub pub_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paymail {
    pub id: i64,
    pub user_id: String,
    pub alias: String,
    pub domain: String,
    pub public_name: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
}

impl Paymail {
    pub fn address(&self) -> String {
        format!("{}@{}", self.alias, self.domain)
    }
}

/// Paymail to attach to a user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPaymail {
    pub user_id: String,
    pub address: PaymailAddress,
    pub public_name: String,
    pub avatar: String,
}
