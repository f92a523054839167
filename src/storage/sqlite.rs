//! SQLite storage backend
//!
//! One `tokio_rusqlite::Connection` runs every statement on its own thread,
//! so each `call` closure is serialised against all others. Multi-statement
//! writes (selection touches, recordings) open an `IMMEDIATE` transaction
//! inside a single closure.
//!
//! The repository implementations are split across this module,
//! `sqlite_outputs` and `sqlite_transactions`.

use std::path::Path;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::{
    cancellation::TokioCancellationToken,
    data_structures::{NewPaymail, Paymail, User, WalletAddress},
    errors::{WalletError, WalletResult},
    key_management::CustomInstructions,
    storage::{AddressRepository, PaymailRepository, SqlitePragmaConfig, UserRepository},
};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS users (
        id TEXT PRIMARY KEY,
        pub_key TEXT NOT NULL UNIQUE,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS paymails (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        user_id TEXT NOT NULL REFERENCES users(id),
        alias TEXT NOT NULL,
        domain TEXT NOT NULL,
        public_name TEXT NOT NULL DEFAULT '',
        avatar TEXT NOT NULL DEFAULT '',
        created_at TEXT NOT NULL,
        UNIQUE (alias, domain)
    );
    CREATE INDEX IF NOT EXISTS idx_paymails_user ON paymails(user_id, id);

    CREATE TABLE IF NOT EXISTS addresses (
        address TEXT PRIMARY KEY,
        user_id TEXT NOT NULL REFERENCES users(id),
        custom_instructions TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        deleted_at TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_addresses_deleted_at ON addresses(deleted_at);
    CREATE INDEX IF NOT EXISTS idx_addresses_user ON addresses(user_id);

    CREATE TABLE IF NOT EXISTS tracked_outputs (
        tx_id TEXT NOT NULL,
        vout INTEGER NOT NULL,
        user_id TEXT NOT NULL,
        satoshis INTEGER NOT NULL,
        spending_tx TEXT,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (tx_id, vout)
    );

    CREATE TABLE IF NOT EXISTS user_utxos (
        user_id TEXT NOT NULL,
        tx_id TEXT NOT NULL,
        vout INTEGER NOT NULL,
        satoshis INTEGER NOT NULL,
        estimated_input_size INTEGER NOT NULL,
        bucket TEXT NOT NULL CHECK (bucket <> 'data'),
        custom_instructions TEXT NOT NULL,
        created_at TEXT NOT NULL,
        touched_at TEXT NOT NULL,
        PRIMARY KEY (user_id, tx_id, vout)
    );
    CREATE INDEX IF NOT EXISTS idx_user_utxos_selection
        ON user_utxos(user_id, touched_at, created_at, tx_id, vout);
    CREATE INDEX IF NOT EXISTS idx_user_utxos_outpoint ON user_utxos(tx_id, vout);

    CREATE TABLE IF NOT EXISTS tracked_transactions (
        id TEXT PRIMARY KEY,
        tx_status TEXT NOT NULL,
        beef_hex TEXT,
        raw_hex TEXT,
        block_hash TEXT,
        block_height INTEGER,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS tx_inputs (
        tx_id TEXT NOT NULL,
        source_tx_id TEXT NOT NULL,
        PRIMARY KEY (tx_id, source_tx_id)
    );

    CREATE TABLE IF NOT EXISTS operations (
        tx_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        counterparty TEXT NOT NULL DEFAULT '',
        type TEXT NOT NULL,
        value INTEGER NOT NULL,
        created_at TEXT NOT NULL,
        PRIMARY KEY (tx_id, user_id)
    );
    CREATE INDEX IF NOT EXISTS idx_operations_user ON operations(user_id, created_at);

    CREATE TABLE IF NOT EXISTS data_outputs (
        tx_id TEXT NOT NULL,
        vout INTEGER NOT NULL,
        user_id TEXT NOT NULL,
        blob BLOB NOT NULL,
        PRIMARY KEY (tx_id, vout)
    );
"#;

/// SQLite implementation of every repository trait
pub struct SqliteStorage {
    pub(crate) connection: Connection,
    pragma_config: SqlitePragmaConfig,
}

impl SqliteStorage {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> WalletResult<Self> {
        Self::new_with_config(database_path, SqlitePragmaConfig::production_optimized()).await
    }

    pub async fn new_with_config<P: AsRef<Path>>(
        database_path: P,
        pragma_config: SqlitePragmaConfig,
    ) -> WalletResult<Self> {
        let connection = Connection::open(database_path).await.map_err(|e| {
            WalletError::StorageError(format!("Failed to open SQLite database: {e}"))
        })?;
        Self::from_connection(connection, pragma_config).await
    }

    /// In-memory database with the schema created, for tests and tooling
    pub async fn new_in_memory() -> WalletResult<Self> {
        let connection = Connection::open_in_memory().await.map_err(|e| {
            WalletError::StorageError(format!("Failed to create in-memory database: {e}"))
        })?;
        Self::from_connection(connection, SqlitePragmaConfig::testing()).await
    }

    async fn from_connection(
        connection: Connection,
        pragma_config: SqlitePragmaConfig,
    ) -> WalletResult<Self> {
        let storage = Self {
            connection,
            pragma_config,
        };
        storage
            .pragma_config
            .apply_to_connection(&storage.connection)
            .await?;
        storage.initialize().await?;
        Ok(storage)
    }

    /// Create tables and indexes if they do not exist
    pub async fn initialize(&self) -> WalletResult<()> {
        self.connection
            .call(|conn| Ok(conn.execute_batch(SCHEMA)?))
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to create schema: {e}")))?;
        debug!("SQLite schema ready");
        Ok(())
    }

    /// Underlying connection, for maintenance statements and tests
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn pragma_config(&self) -> &SqlitePragmaConfig {
        &self.pragma_config
    }

    /// Run `f` on the connection thread unless `token` fires first
    pub(crate) async fn call<F, R>(
        &self,
        token: &TokioCancellationToken,
        context: &'static str,
        f: F,
    ) -> WalletResult<R>
    where
        F: FnOnce(&mut rusqlite::Connection) -> Result<R, tokio_rusqlite::Error> + Send + 'static,
        R: Send + 'static,
    {
        token
            .run(async {
                self.connection
                    .call(f)
                    .await
                    .map_err(|e| map_storage_error(context, e))
            })
            .await
    }
}

/// Carry a domain error out of a `call` closure
pub(crate) fn domain_error(error: WalletError) -> tokio_rusqlite::Error {
    tokio_rusqlite::Error::Other(Box::new(error))
}

/// Unwrap domain errors raised inside a closure; wrap everything else
pub(crate) fn map_storage_error(context: &str, error: tokio_rusqlite::Error) -> WalletError {
    match error {
        tokio_rusqlite::Error::Other(inner) => match inner.downcast::<WalletError>() {
            Ok(domain) => *domain,
            Err(other) => WalletError::StorageError(format!("Failed to {context}: {other}")),
        },
        other => WalletError::StorageError(format!("Failed to {context}: {other}")),
    }
}

/// SQLite busy/locked errors, which are worth retrying
pub(crate) fn is_transient(error: &tokio_rusqlite::Error) -> bool {
    matches!(
        error,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if matches!(
                e.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            )
    )
}

pub(crate) fn instructions_to_sql(
    instructions: &CustomInstructions,
) -> Result<String, tokio_rusqlite::Error> {
    instructions.to_json().map_err(domain_error)
}

pub(crate) fn instructions_from_sql(json: String, column: usize) -> rusqlite::Result<CustomInstructions> {
    CustomInstructions::from_json(&json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

pub(crate) fn parse_column<T>(value: String, column: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value.parse::<T>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

impl SqliteStorage {
    fn row_to_user(row: &Row) -> rusqlite::Result<User> {
        Ok(User {
            id: row.get(0)?,
            pub_key: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }

    fn row_to_paymail(row: &Row) -> rusqlite::Result<Paymail> {
        Ok(Paymail {
            id: row.get(0)?,
            user_id: row.get(1)?,
            alias: row.get(2)?,
            domain: row.get(3)?,
            public_name: row.get(4)?,
            avatar: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn row_to_address(row: &Row) -> rusqlite::Result<WalletAddress> {
        Ok(WalletAddress {
            address: row.get(0)?,
            user_id: row.get(1)?,
            custom_instructions: instructions_from_sql(row.get(2)?, 2)?,
            created_at: row.get(3)?,
            updated_at: row.get(4)?,
            deleted_at: row.get(5)?,
        })
    }
}

const PAYMAIL_COLUMNS: &str = "id, user_id, alias, domain, public_name, avatar, created_at";

#[async_trait]
impl UserRepository for SqliteStorage {
    async fn create_user(&self, token: &TokioCancellationToken, user: &User) -> WalletResult<User> {
        let user = user.clone();
        self.call(token, "create user", move |conn| {
            conn.execute(
                "INSERT INTO users (id, pub_key, created_at, updated_at) VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(pub_key) DO NOTHING",
                params![user.id, user.pub_key, user.created_at, user.updated_at],
            )?;
            Ok(conn.query_row(
                "SELECT id, pub_key, created_at, updated_at FROM users WHERE pub_key = ?1",
                params![user.pub_key],
                Self::row_to_user,
            )?)
        })
        .await
    }

    async fn get_user(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Option<User>> {
        let user_id = user_id.to_string();
        self.call(token, "get user", move |conn| {
            Ok(conn
                .query_row(
                    "SELECT id, pub_key, created_at, updated_at FROM users WHERE id = ?1",
                    params![user_id],
                    Self::row_to_user,
                )
                .optional()?)
        })
        .await
    }
}

#[async_trait]
impl PaymailRepository for SqliteStorage {
    async fn add_paymail(
        &self,
        token: &TokioCancellationToken,
        paymail: &NewPaymail,
    ) -> WalletResult<Paymail> {
        let paymail = paymail.clone();
        self.call(token, "add paymail", move |conn| {
            let taken: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM paymails WHERE alias = ?1 AND domain = ?2)",
                params![paymail.address.alias(), paymail.address.domain()],
                |row| row.get(0),
            )?;
            if taken {
                return Err(domain_error(WalletError::ValidationRequired(format!(
                    "paymail {} already exists",
                    paymail.address
                ))));
            }
            conn.execute(
                "INSERT INTO paymails (user_id, alias, domain, public_name, avatar, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    paymail.user_id,
                    paymail.address.alias(),
                    paymail.address.domain(),
                    paymail.public_name,
                    paymail.avatar,
                    Utc::now(),
                ],
            )?;
            let id = conn.last_insert_rowid();
            Ok(conn.query_row(
                &format!("SELECT {PAYMAIL_COLUMNS} FROM paymails WHERE id = ?1"),
                params![id],
                Self::row_to_paymail,
            )?)
        })
        .await
    }

    async fn find_paymail(
        &self,
        token: &TokioCancellationToken,
        alias: &str,
        domain: &str,
    ) -> WalletResult<Option<Paymail>> {
        let (alias, domain) = (alias.to_string(), domain.to_string());
        self.call(token, "find paymail", move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {PAYMAIL_COLUMNS} FROM paymails WHERE alias = ?1 AND domain = ?2"),
                    params![alias, domain],
                    Self::row_to_paymail,
                )
                .optional()?)
        })
        .await
    }

    async fn default_paymail(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Option<Paymail>> {
        let user_id = user_id.to_string();
        self.call(token, "get default paymail", move |conn| {
            Ok(conn
                .query_row(
                    &format!(
                        "SELECT {PAYMAIL_COLUMNS} FROM paymails WHERE user_id = ?1 ORDER BY id LIMIT 1"
                    ),
                    params![user_id],
                    Self::row_to_paymail,
                )
                .optional()?)
        })
        .await
    }

    async fn list_paymails(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Vec<Paymail>> {
        let user_id = user_id.to_string();
        self.call(token, "list paymails", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PAYMAIL_COLUMNS} FROM paymails WHERE user_id = ?1 ORDER BY id"
            ))?;
            let rows = stmt.query_map(params![user_id], Self::row_to_paymail)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}

#[async_trait]
impl AddressRepository for SqliteStorage {
    async fn save_address(
        &self,
        token: &TokioCancellationToken,
        address: &WalletAddress,
    ) -> WalletResult<()> {
        let address = address.clone();
        self.call(token, "save address", move |conn| {
            let instructions = instructions_to_sql(&address.custom_instructions)?;
            conn.execute(
                "INSERT INTO addresses (address, user_id, custom_instructions, created_at, updated_at, deleted_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(address) DO NOTHING",
                params![
                    address.address,
                    address.user_id,
                    instructions,
                    address.created_at,
                    address.updated_at,
                    address.deleted_at,
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn find_addresses(
        &self,
        token: &TokioCancellationToken,
        addresses: &[String],
    ) -> WalletResult<Vec<WalletAddress>> {
        if addresses.is_empty() {
            return Ok(Vec::new());
        }
        let addresses = addresses.to_vec();
        self.call(token, "find addresses", move |conn| {
            let placeholders = vec!["?"; addresses.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT address, user_id, custom_instructions, created_at, updated_at, deleted_at
                 FROM addresses WHERE deleted_at IS NULL AND address IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(addresses.iter()),
                Self::row_to_address,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }
}
