use std::sync::Arc;

use tracing::debug;

use crate::{
    bsv::transaction::TxOutput,
    cancellation::TokioCancellationToken,
    data_structures::UtxoSelection,
    errors::{WalletError, WalletResult},
    fee::{tx_bytes_without_inputs, FeeProvider, FeeUnit, ESTIMATED_CHANGE_OUTPUT_SIZE},
    storage::{SelectionRequest, UtxoRepository},
};

/// Funds outlines from the user's UTXOs
///
/// The choice itself happens in the repository, inside one database
/// transaction that also touches the chosen rows.
#[derive(Clone)]
pub struct InputSelector {
    pub utxos: Arc<dyn UtxoRepository>,
    pub fee_provider: Arc<dyn FeeProvider>,
    pub change_output_size: u64,
}

impl InputSelector {
    pub fn new(utxos: Arc<dyn UtxoRepository>, fee_provider: Arc<dyn FeeProvider>) -> Self {
        Self {
            utxos,
            fee_provider,
            change_output_size: ESTIMATED_CHANGE_OUTPUT_SIZE,
        }
    }

    pub fn with_change_output_size(mut self, change_output_size: u64) -> Self {
        self.change_output_size = change_output_size;
        self
    }

    pub async fn fee_unit(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit> {
        self.fee_provider.fee_unit(token).await
    }

    /// Select inputs covering `target_satoshis` plus the fee of a transaction
    /// of `tx_bytes_without_inputs` bytes before inputs are added
    pub async fn select(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
        target_satoshis: u64,
        tx_bytes_without_inputs: u64,
        fee_unit: FeeUnit,
    ) -> WalletResult<UtxoSelection> {
        let selection = self
            .utxos
            .select_utxos(
                token,
                SelectionRequest {
                    user_id,
                    target_satoshis,
                    tx_bytes_without_inputs,
                    fee_unit,
                    change_output_size: self.change_output_size,
                },
            )
            .await?;

        if selection.utxos.is_empty() {
            return Err(WalletError::InsufficientFunds(format!(
                "user {user_id} cannot cover {target_satoshis} satoshis plus fee"
            )));
        }

        debug!(
            user_id = %user_id,
            inputs = selection.utxos.len(),
            total = selection.total_satoshis(),
            change = selection.change,
            "Inputs selected"
        );
        Ok(selection)
    }

    /// Select inputs paying for `outputs`
    pub async fn select_for_outputs(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
        outputs: &[TxOutput],
        fee_unit: FeeUnit,
    ) -> WalletResult<UtxoSelection> {
        let target: u64 = outputs.iter().map(|o| o.satoshis).sum();
        self.select(token, user_id, target, tx_bytes_without_inputs(outputs), fee_unit)
            .await
    }
}
