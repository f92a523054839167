use serde::{Deserialize, Serialize};

use crate::data_structures::Outpoint;

/// Payload of a data-carrier output recorded for a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataOutput {
    pub outpoint: Outpoint,
    pub user_id: String,
    /// Concatenated pushes after `OP_RETURN`
    pub blob: Vec<u8>,
}
