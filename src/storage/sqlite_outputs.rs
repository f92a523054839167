//! Tracked outputs, UTXOs and data outputs on SQLite

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension, Row, TransactionBehavior};
use tracing::debug;

use crate::{
    bsv::hash::TxId,
    cancellation::TokioCancellationToken,
    data_structures::{DataOutput, Outpoint, TrackedOutput, Utxo, UtxoSelection},
    errors::WalletResult,
    storage::{
        sqlite::{instructions_from_sql, instructions_to_sql, parse_column},
        DataRepository, OutputRepository, SelectionRequest, SqliteStorage, UtxoRepository,
    },
};

const UTXO_COLUMNS: &str = "user_id, tx_id, vout, satoshis, estimated_input_size, bucket, \
                            custom_instructions, created_at, touched_at";

/// Shortest covering prefix of the user's UTXOs and its change
///
/// `?1` user, `?2` target, `?3` bytes without inputs, `?4` fee satoshis,
/// `?5` fee bytes, `?6` change output size. Fees use integer ceil division.
const SELECT_PREFIX_SQL: &str = r#"
    WITH ordered AS (
        SELECT
            ROW_NUMBER() OVER w AS rn,
            SUM(satoshis) OVER w AS total_satoshis,
            SUM(estimated_input_size) OVER w AS total_input_size
        FROM user_utxos
        WHERE user_id = ?1 AND bucket = 'bsv'
        WINDOW w AS (
            ORDER BY touched_at ASC, created_at ASC, tx_id ASC, vout ASC
            ROWS BETWEEN UNBOUNDED PRECEDING AND CURRENT ROW
        )
    ),
    fees AS (
        SELECT
            rn,
            total_satoshis - ?2 AS remaining,
            ((total_input_size + ?3 + ?5 - 1) / ?5) * ?4 AS fee_no_change,
            ((total_input_size + ?3 + ?6 + ?5 - 1) / ?5) * ?4 AS fee_with_change
        FROM ordered
    ),
    changes AS (
        SELECT
            rn,
            CASE
                WHEN remaining - fee_no_change <= 0 THEN remaining - fee_no_change
                ELSE remaining - fee_with_change
            END AS change
        FROM fees
    )
    SELECT rn, change FROM changes WHERE change >= 0 ORDER BY rn ASC LIMIT 1
"#;

impl SqliteStorage {
    pub(crate) fn row_to_utxo(row: &Row) -> rusqlite::Result<Utxo> {
        Ok(Utxo {
            user_id: row.get(0)?,
            outpoint: Outpoint::new(parse_column::<TxId>(row.get(1)?, 1)?, row.get(2)?),
            satoshis: row.get::<_, i64>(3)? as u64,
            estimated_input_size: row.get::<_, i64>(4)? as u64,
            bucket: parse_column(row.get(5)?, 5)?,
            custom_instructions: instructions_from_sql(row.get(6)?, 6)?,
            created_at: row.get(7)?,
            touched_at: row.get(8)?,
        })
    }

    pub(crate) fn row_to_tracked_output(row: &Row) -> rusqlite::Result<TrackedOutput> {
        let spending_tx: Option<String> = row.get(4)?;
        Ok(TrackedOutput {
            outpoint: Outpoint::new(parse_column::<TxId>(row.get(0)?, 0)?, row.get(1)?),
            user_id: row.get(2)?,
            satoshis: row.get::<_, i64>(3)? as u64,
            spending_tx: spending_tx.map(|s| parse_column::<TxId>(s, 4)).transpose()?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    pub(crate) fn insert_tracked_output(
        conn: &rusqlite::Connection,
        output: &TrackedOutput,
    ) -> Result<(), tokio_rusqlite::Error> {
        conn.execute(
            "INSERT INTO tracked_outputs (tx_id, vout, user_id, satoshis, spending_tx, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
             ON CONFLICT(tx_id, vout) DO NOTHING",
            params![
                output.outpoint.tx_id.to_hex(),
                output.outpoint.vout,
                output.user_id,
                output.satoshis as i64,
                output.spending_tx.map(|t| t.to_hex()),
                output.created_at,
                output.updated_at,
            ],
        )?;
        Ok(())
    }

    pub(crate) fn insert_utxo(
        conn: &rusqlite::Connection,
        utxo: &Utxo,
    ) -> Result<(), tokio_rusqlite::Error> {
        let instructions = instructions_to_sql(&utxo.custom_instructions)?;
        conn.execute(
            &format!(
                "INSERT INTO user_utxos ({UTXO_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(user_id, tx_id, vout) DO NOTHING"
            ),
            params![
                utxo.user_id,
                utxo.outpoint.tx_id.to_hex(),
                utxo.outpoint.vout,
                utxo.satoshis as i64,
                utxo.estimated_input_size as i64,
                utxo.bucket.as_str(),
                instructions,
                utxo.created_at,
                utxo.touched_at,
            ],
        )?;
        Ok(())
    }
}

#[async_trait]
impl OutputRepository for SqliteStorage {
    async fn find_outputs(
        &self,
        token: &TokioCancellationToken,
        outpoints: &[Outpoint],
    ) -> WalletResult<Vec<TrackedOutput>> {
        if outpoints.is_empty() {
            return Ok(Vec::new());
        }
        let outpoints = outpoints.to_vec();
        self.call(token, "find tracked outputs", move |conn| {
            let mut stmt = conn.prepare(
                "SELECT tx_id, vout, user_id, satoshis, spending_tx, created_at, updated_at
                 FROM tracked_outputs WHERE tx_id = ?1 AND vout = ?2",
            )?;
            let mut found = Vec::new();
            for outpoint in &outpoints {
                if let Some(output) = stmt
                    .query_row(
                        params![outpoint.tx_id.to_hex(), outpoint.vout],
                        Self::row_to_tracked_output,
                    )
                    .optional()?
                {
                    found.push(output);
                }
            }
            Ok(found)
        })
        .await
    }
}

#[async_trait]
impl UtxoRepository for SqliteStorage {
    async fn select_utxos(
        &self,
        token: &TokioCancellationToken,
        request: SelectionRequest<'_>,
    ) -> WalletResult<UtxoSelection> {
        request.fee_unit.validate()?;
        let user_id = request.user_id.to_string();
        let target = request.target_satoshis as i64;
        let base_size = request.tx_bytes_without_inputs as i64;
        let fee_satoshis = request.fee_unit.satoshis as i64;
        let fee_bytes = request.fee_unit.bytes as i64;
        let change_size = request.change_output_size as i64;

        let selection = self
            .call(token, "select UTXOs", move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

                let prefix: Option<(i64, i64)> = tx
                    .query_row(
                        SELECT_PREFIX_SQL,
                        params![user_id, target, base_size, fee_satoshis, fee_bytes, change_size],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let Some((count, change)) = prefix else {
                    tx.commit()?;
                    return Ok(UtxoSelection {
                        utxos: Vec::new(),
                        change: 0,
                    });
                };

                let mut utxos = {
                    let mut stmt = tx.prepare(&format!(
                        "SELECT {UTXO_COLUMNS} FROM user_utxos
                         WHERE user_id = ?1 AND bucket = 'bsv'
                         ORDER BY touched_at ASC, created_at ASC, tx_id ASC, vout ASC
                         LIMIT ?2"
                    ))?;
                    let rows = stmt.query_map(params![user_id, count], Self::row_to_utxo)?;
                    rows.collect::<Result<Vec<_>, _>>()?
                };

                let now = Utc::now();
                {
                    let mut touch = tx.prepare(
                        "UPDATE user_utxos SET touched_at = ?1
                         WHERE user_id = ?2 AND tx_id = ?3 AND vout = ?4",
                    )?;
                    for utxo in &mut utxos {
                        touch.execute(params![
                            now,
                            user_id,
                            utxo.outpoint.tx_id.to_hex(),
                            utxo.outpoint.vout
                        ])?;
                        utxo.touched_at = now;
                    }
                }
                tx.commit()?;

                Ok(UtxoSelection {
                    utxos,
                    change: change as u64,
                })
            })
            .await?;

        debug!(
            user_id = %request.user_id,
            selected = selection.utxos.len(),
            change = selection.change,
            "UTXO selection finished"
        );
        Ok(selection)
    }

    async fn list_utxos(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Vec<Utxo>> {
        let user_id = user_id.to_string();
        self.call(token, "list UTXOs", move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {UTXO_COLUMNS} FROM user_utxos WHERE user_id = ?1
                 ORDER BY touched_at ASC, created_at ASC, tx_id ASC, vout ASC"
            ))?;
            let rows = stmt.query_map(params![user_id], Self::row_to_utxo)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
        .await
    }

    async fn add_utxos(
        &self,
        token: &TokioCancellationToken,
        outputs: &[TrackedOutput],
        utxos: &[Utxo],
    ) -> WalletResult<()> {
        let (outputs, utxos) = (outputs.to_vec(), utxos.to_vec());
        self.call(token, "add UTXOs", move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            for output in &outputs {
                Self::insert_tracked_output(&tx, output)?;
            }
            for utxo in &utxos {
                Self::insert_utxo(&tx, utxo)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl DataRepository for SqliteStorage {
    async fn find_data(
        &self,
        token: &TokioCancellationToken,
        outpoint: &Outpoint,
    ) -> WalletResult<Option<DataOutput>> {
        let outpoint = *outpoint;
        self.call(token, "find data output", move |conn| {
            Ok(conn
                .query_row(
                    "SELECT user_id, blob FROM data_outputs WHERE tx_id = ?1 AND vout = ?2",
                    params![outpoint.tx_id.to_hex(), outpoint.vout],
                    |row| {
                        Ok(DataOutput {
                            outpoint,
                            user_id: row.get(0)?,
                            blob: row.get(1)?,
                        })
                    },
                )
                .optional()?)
        })
        .await
    }
}
