//! Storage abstraction layer
//!
//! Services depend on the repository traits in [`storage_trait`]; the SQLite
//! backend behind the `storage` feature implements all of them.

pub mod storage_trait;

#[cfg(feature = "storage")]
pub mod performance_optimizations;
#[cfg(feature = "storage")]
pub mod sqlite;
#[cfg(feature = "storage")]
mod sqlite_outputs;
#[cfg(feature = "storage")]
mod sqlite_transactions;

pub use storage_trait::*;

#[cfg(feature = "storage")]
pub use performance_optimizations::*;
#[cfg(feature = "storage")]
pub use sqlite::SqliteStorage;

use std::sync::Arc;

/// Repository handles shared by the services
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub paymails: Arc<dyn PaymailRepository>,
    pub addresses: Arc<dyn AddressRepository>,
    pub outputs: Arc<dyn OutputRepository>,
    pub utxos: Arc<dyn UtxoRepository>,
    pub transactions: Arc<dyn TransactionRepository>,
    pub operations: Arc<dyn OperationRepository>,
    pub data: Arc<dyn DataRepository>,
}

impl Repositories {
    /// Every repository backed by the same SQLite storage
    #[cfg(feature = "storage")]
    pub fn from_sqlite(storage: Arc<SqliteStorage>) -> Self {
        Self {
            users: storage.clone(),
            paymails: storage.clone(),
            addresses: storage.clone(),
            outputs: storage.clone(),
            utxos: storage.clone(),
            transactions: storage.clone(),
            operations: storage.clone(),
            data: storage,
        }
    }
}
