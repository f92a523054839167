//! Tracked transactions, recordings and operations on SQLite

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::{debug, warn};

use crate::{
    bsv::hash::TxId,
    cancellation::TokioCancellationToken,
    data_structures::{Operation, TrackedTransaction},
    errors::{WalletError, WalletResult},
    storage::{
        sqlite::{domain_error, is_transient, map_storage_error, parse_column},
        OperationRepository, SqliteStorage, TransactionRecording, TransactionRepository,
    },
};

const RECORD_ATTEMPTS: u32 = 3;
const RECORD_BACKOFF: Duration = Duration::from_millis(50);

const TX_COLUMNS: &str =
    "id, tx_status, beef_hex, raw_hex, block_hash, block_height, created_at, updated_at";

const OPERATION_COLUMNS: &str = "tx_id, user_id, type, counterparty, value, created_at";

impl SqliteStorage {
    fn row_to_transaction(row: &Row) -> rusqlite::Result<TrackedTransaction> {
        Ok(TrackedTransaction {
            id: parse_column(row.get(0)?, 0)?,
            status: parse_column(row.get(1)?, 1)?,
            beef_hex: row.get(2)?,
            raw_hex: row.get(3)?,
            block_hash: row.get(4)?,
            block_height: row.get::<_, Option<i64>>(5)?.map(|h| h as u64),
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    fn row_to_operation(row: &Row) -> rusqlite::Result<Operation> {
        Ok(Operation {
            tx_id: parse_column(row.get(0)?, 0)?,
            user_id: row.get(1)?,
            operation_type: parse_column(row.get(2)?, 2)?,
            counterparty: row.get(3)?,
            value: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    /// Insert or replace the row; a MINED row is never replaced by an unmined one
    fn upsert_transaction(
        conn: &rusqlite::Connection,
        transaction: &TrackedTransaction,
    ) -> Result<(), tokio_rusqlite::Error> {
        conn.execute(
            &format!(
                "INSERT INTO tracked_transactions ({TX_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    tx_status = excluded.tx_status,
                    beef_hex = excluded.beef_hex,
                    raw_hex = excluded.raw_hex,
                    block_hash = excluded.block_hash,
                    block_height = excluded.block_height,
                    updated_at = excluded.updated_at
                 WHERE tracked_transactions.tx_status <> 'MINED' OR excluded.tx_status = 'MINED'"
            ),
            params![
                transaction.id.to_hex(),
                transaction.status.as_str(),
                transaction.beef_hex,
                transaction.raw_hex,
                transaction.block_hash,
                transaction.block_height.map(|h| h as i64),
                transaction.created_at,
                transaction.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Every write of a recording; the caller owns the transaction boundary
    fn write_recording(
        conn: &mut rusqlite::Connection,
        recording: &TransactionRecording,
    ) -> Result<(), tokio_rusqlite::Error> {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let tx_id = recording.transaction.id.to_hex();
        let now = Utc::now();

        Self::upsert_transaction(&tx, &recording.transaction)?;

        for source in &recording.source_tx_ids {
            tx.execute(
                "INSERT OR IGNORE INTO tx_inputs (tx_id, source_tx_id) VALUES (?1, ?2)",
                params![tx_id, source.to_hex()],
            )?;
        }

        for outpoint in &recording.spent_outpoints {
            let marked = tx.execute(
                "UPDATE tracked_outputs SET spending_tx = ?1, updated_at = ?2
                 WHERE tx_id = ?3 AND vout = ?4 AND (spending_tx IS NULL OR spending_tx = ?1)",
                params![tx_id, now, outpoint.tx_id.to_hex(), outpoint.vout],
            )?;
            if marked != 1 {
                return Err(domain_error(WalletError::UtxoSpent(format!(
                    "{outpoint} is already spent"
                ))));
            }
            tx.execute(
                "DELETE FROM user_utxos WHERE tx_id = ?1 AND vout = ?2",
                params![outpoint.tx_id.to_hex(), outpoint.vout],
            )?;
        }

        for output in &recording.new_outputs {
            Self::insert_tracked_output(&tx, output)?;
        }

        for utxo in &recording.new_utxos {
            let spent: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM tracked_outputs
                 WHERE tx_id = ?1 AND vout = ?2 AND spending_tx IS NOT NULL)",
                params![utxo.outpoint.tx_id.to_hex(), utxo.outpoint.vout],
                |row| row.get(0),
            )?;
            if !spent {
                Self::insert_utxo(&tx, utxo)?;
            }
        }

        for data in &recording.data_outputs {
            tx.execute(
                "INSERT OR REPLACE INTO data_outputs (tx_id, vout, user_id, blob) VALUES (?1, ?2, ?3, ?4)",
                params![data.outpoint.tx_id.to_hex(), data.outpoint.vout, data.user_id, data.blob],
            )?;
        }

        for operation in &recording.operations {
            tx.execute(
                &format!(
                    "INSERT INTO operations ({OPERATION_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT(tx_id, user_id) DO NOTHING"
                ),
                params![
                    operation.tx_id.to_hex(),
                    operation.user_id,
                    operation.operation_type.as_str(),
                    operation.counterparty,
                    operation.value,
                    operation.created_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for SqliteStorage {
    async fn get_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Option<TrackedTransaction>> {
        let id = tx_id.to_hex();
        self.call(token, "get transaction", move |conn| {
            Ok(conn
                .query_row(
                    &format!("SELECT {TX_COLUMNS} FROM tracked_transactions WHERE id = ?1"),
                    params![id],
                    Self::row_to_transaction,
                )
                .optional()?)
        })
        .await
    }

    async fn get_transactions(
        &self,
        token: &TokioCancellationToken,
        tx_ids: &[TxId],
    ) -> WalletResult<Vec<TrackedTransaction>> {
        if tx_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids: Vec<String> = tx_ids.iter().map(TxId::to_hex).collect();
        self.call(token, "get transactions", move |conn| {
            let placeholders = vec!["?"; ids.len()].join(", ");
            let mut stmt = conn.prepare(&format!(
                "SELECT {TX_COLUMNS} FROM tracked_transactions WHERE id IN ({placeholders})"
            ))?;
            let rows = stmt.query_map(
                rusqlite::params_from_iter(ids.iter()),
                Self::row_to_transaction,
            )?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn save_transaction(
        &self,
        token: &TokioCancellationToken,
        transaction: &TrackedTransaction,
    ) -> WalletResult<()> {
        transaction.validate().map_err(WalletError::InvalidArgument)?;
        let transaction = transaction.clone();
        self.call(token, "save transaction", move |conn| {
            Self::upsert_transaction(conn, &transaction)
        })
        .await
    }

    async fn update_transaction(
        &self,
        token: &TokioCancellationToken,
        transaction: &TrackedTransaction,
    ) -> WalletResult<()> {
        transaction.validate().map_err(WalletError::InvalidArgument)?;
        let transaction = transaction.clone();
        self.call(token, "update transaction", move |conn| {
            let updated = conn.execute(
                "UPDATE tracked_transactions
                 SET tx_status = ?1, beef_hex = ?2, raw_hex = ?3, block_hash = ?4,
                     block_height = ?5, updated_at = ?6
                 WHERE id = ?7",
                params![
                    transaction.status.as_str(),
                    transaction.beef_hex,
                    transaction.raw_hex,
                    transaction.block_hash,
                    transaction.block_height.map(|h| h as i64),
                    transaction.updated_at,
                    transaction.id.to_hex(),
                ],
            )?;
            if updated == 0 {
                return Err(domain_error(WalletError::ResourceNotFound(format!(
                    "transaction {}",
                    transaction.id
                ))));
            }
            Ok(())
        })
        .await
    }

    async fn record_transaction(
        &self,
        token: &TokioCancellationToken,
        recording: &TransactionRecording,
    ) -> WalletResult<()> {
        recording
            .transaction
            .validate()
            .map_err(WalletError::InvalidArgument)?;

        let mut attempt = 0;
        loop {
            attempt += 1;
            token.check()?;
            let batch = recording.clone();
            let result = self
                .connection
                .call(move |conn| Self::write_recording(conn, &batch))
                .await;

            match result {
                Ok(()) => {
                    debug!(
                        tx_id = %recording.transaction.id,
                        operations = recording.operations.len(),
                        utxos = recording.new_utxos.len(),
                        "Transaction recorded"
                    );
                    return Ok(());
                }
                Err(e) if is_transient(&e) && attempt < RECORD_ATTEMPTS => {
                    warn!(
                        tx_id = %recording.transaction.id,
                        attempt,
                        error = %e,
                        "Database busy while recording, retrying"
                    );
                    tokio::time::sleep(RECORD_BACKOFF * attempt).await;
                }
                Err(e) => return Err(map_storage_error("record transaction", e)),
            }
        }
    }
}

#[async_trait]
impl OperationRepository for SqliteStorage {
    async fn list_operations(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Vec<Operation>> {
        let user_id = user_id.to_string();
        self.call(token, "list operations", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OPERATION_COLUMNS} FROM operations WHERE user_id = ?1
                 ORDER BY created_at ASC, tx_id ASC"
            ))?;
            let rows = stmt.query_map(params![user_id], Self::row_to_operation)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn operations_for_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Vec<Operation>> {
        let id = tx_id.to_hex();
        self.call(token, "list transaction operations", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {OPERATION_COLUMNS} FROM operations WHERE tx_id = ?1 ORDER BY user_id"
            ))?;
            let rows = stmt.query_map(params![id], Self::row_to_operation)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn balance(&self, token: &TokioCancellationToken, user_id: &str) -> WalletResult<i64> {
        let user_id = user_id.to_string();
        self.call(token, "compute balance", move |conn| {
            Ok(conn.query_row(
                "SELECT COALESCE(SUM(value), 0) FROM operations WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?)
        })
        .await
    }
}
