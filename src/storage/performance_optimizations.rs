//! SQLite pragma presets
//!
//! The wallet writes in short bursts (selection touches, recordings, callback
//! updates) and reads mostly by primary key, so the presets trade a little
//! durability against fewer fsyncs.

use tokio_rusqlite::Connection;

use crate::config::DatabasePreset;
use crate::errors::{WalletError, WalletResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlitePragmaConfig {
    /// WAL journal; ignored by in-memory databases
    pub enable_wal_mode: bool,
    /// 0=OFF, 1=NORMAL, 2=FULL
    pub synchronous_mode: u8,
    pub cache_size_kb: i32,
    pub temp_store_memory: bool,
    pub busy_timeout_ms: u32,
    pub foreign_keys: bool,
}

impl Default for SqlitePragmaConfig {
    fn default() -> Self {
        Self::production_optimized()
    }
}

impl From<DatabasePreset> for SqlitePragmaConfig {
    fn from(preset: DatabasePreset) -> Self {
        match preset {
            DatabasePreset::Conservative => Self::conservative(),
            DatabasePreset::Production => Self::production_optimized(),
            DatabasePreset::Testing => Self::testing(),
        }
    }
}

impl SqlitePragmaConfig {
    pub fn conservative() -> Self {
        Self {
            enable_wal_mode: true,
            synchronous_mode: 2,
            cache_size_kb: 16_000,
            temp_store_memory: true,
            busy_timeout_ms: 5000,
            foreign_keys: true,
        }
    }

    pub fn production_optimized() -> Self {
        Self {
            enable_wal_mode: true,
            synchronous_mode: 1,
            cache_size_kb: 64_000,
            temp_store_memory: true,
            busy_timeout_ms: 8000,
            foreign_keys: true,
        }
    }

    /// In-memory and throwaway databases; never use with real funds
    pub fn testing() -> Self {
        Self {
            enable_wal_mode: false,
            synchronous_mode: 0,
            cache_size_kb: 8_000,
            temp_store_memory: true,
            busy_timeout_ms: 1000,
            foreign_keys: true,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout_ms: u32) -> Self {
        self.busy_timeout_ms = busy_timeout_ms;
        self
    }

    pub async fn apply_to_connection(&self, connection: &Connection) -> WalletResult<()> {
        let config = self.clone();
        connection
            .call(move |conn| {
                if config.enable_wal_mode {
                    // Returns the resulting mode as a row.
                    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
                }
                conn.pragma_update(None, "synchronous", config.synchronous_mode)?;
                conn.pragma_update(None, "cache_size", -config.cache_size_kb)?;
                if config.temp_store_memory {
                    conn.pragma_update(None, "temp_store", 2)?;
                }
                conn.pragma_update(None, "foreign_keys", config.foreign_keys)?;
                conn.busy_timeout(std::time::Duration::from_millis(
                    config.busy_timeout_ms as u64,
                ))?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to apply SQLite pragmas: {e}")))
    }
}
