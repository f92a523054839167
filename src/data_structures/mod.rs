//! Wallet data model
//!
//! Plain serde structs shared by the services and the storage layer.

pub mod annotations;
pub mod data_output;
pub mod operation;
pub mod outpoint;
pub mod paymail_address;
pub mod tracked_output;
pub mod tracked_transaction;
pub mod user;
pub mod utxo;
pub mod wallet_address;

pub use annotations::*;
pub use data_output::*;
pub use operation::*;
pub use outpoint::*;
pub use paymail_address::*;
pub use tracked_output::*;
pub use tracked_transaction::*;
pub use user::*;
pub use utxo::*;
pub use wallet_address::*;
