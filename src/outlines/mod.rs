//! Transaction outlines
//!
//! An outline is an unsigned transaction plus annotations, built from a
//! client's output specification and funded from the user's UTXOs. Building
//! one persists nothing besides the touched UTXOs and the change address.

pub mod change;
pub mod data_output;
pub mod output_spec;
pub mod paymail_output;

pub use change::{plan_change, ChangePlan};
pub use data_output::DataCarrierSpec;
pub use output_spec::{AnnotatedOutput, OutputSpec};
pub use paymail_output::PaymailOutputSpec;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    ancestors::AncestorResolver,
    bsv::{
        spv::SpvTransaction,
        transaction::{Transaction, TxInput, TxOutput},
    },
    cancellation::TokioCancellationToken,
    data_structures::{Annotations, InputAnnotation, OutputAnnotation, WalletAddress},
    errors::{WalletError, WalletResult},
    key_management::{derive_address, type42, CustomInstruction, CustomInstructions},
    outlines::output_spec::EvaluationContext,
    paymail::PaymailClient,
    storage::AddressRepository,
    users::UsersService,
    utxo::InputSelector,
};

/// What the client wants the transaction to do
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionSpec {
    pub user_id: String,
    pub outputs: Vec<OutputSpec>,
}

impl TransactionSpec {
    pub fn new(user_id: impl Into<String>, outputs: Vec<OutputSpec>) -> Self {
        Self {
            user_id: user_id.into(),
            outputs,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OutlineFormat {
    Raw,
    Beef,
}

/// Unsigned transaction handed to the client for signing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Outline {
    pub hex: String,
    pub format: OutlineFormat,
    pub annotations: Annotations,
}

#[derive(Clone)]
pub struct OutlinesService {
    users: UsersService,
    paymail: Arc<dyn PaymailClient>,
    selector: InputSelector,
    addresses: Arc<dyn AddressRepository>,
    ancestors: AncestorResolver,
}

impl OutlinesService {
    pub fn new(
        users: UsersService,
        paymail: Arc<dyn PaymailClient>,
        selector: InputSelector,
        addresses: Arc<dyn AddressRepository>,
        ancestors: AncestorResolver,
    ) -> Self {
        Self {
            users,
            paymail,
            selector,
            addresses,
            ancestors,
        }
    }

    /// Outline as raw transaction hex
    pub async fn create_raw(
        &self,
        token: &TokioCancellationToken,
        spec: &TransactionSpec,
    ) -> WalletResult<Outline> {
        let (tx, annotations) = self.evaluate(token, spec).await?;
        Ok(Outline {
            hex: tx.to_hex(),
            format: OutlineFormat::Raw,
            annotations,
        })
    }

    /// Outline as BEEF carrying the ancestry of every input
    pub async fn create_with_proofs(
        &self,
        token: &TokioCancellationToken,
        spec: &TransactionSpec,
    ) -> WalletResult<Outline> {
        let (tx, annotations) = self.evaluate(token, spec).await?;
        let mut spv = SpvTransaction::new(tx);
        self.ancestors.attach_sources(token, &mut spv).await?;
        Ok(Outline {
            hex: spv.to_beef_hex(),
            format: OutlineFormat::Beef,
            annotations,
        })
    }

    async fn evaluate(
        &self,
        token: &TokioCancellationToken,
        spec: &TransactionSpec,
    ) -> WalletResult<(Transaction, Annotations)> {
        if spec.user_id.is_empty() {
            return Err(WalletError::ValidationRequired(
                "outline requires a user id".to_string(),
            ));
        }
        if spec.outputs.is_empty() {
            return Err(WalletError::ValidationRequired(
                "outline requires at least one output".to_string(),
            ));
        }

        let ctx = EvaluationContext {
            token,
            user_id: &spec.user_id,
            users: &self.users,
            paymail: self.paymail.as_ref(),
        };
        let mut annotated = Vec::new();
        for output_spec in &spec.outputs {
            annotated.extend(output_spec.evaluate(&ctx).await?);
        }
        let mut outputs: Vec<TxOutput> = annotated.iter().map(|a| a.output.clone()).collect();
        let mut output_annotations: Vec<OutputAnnotation> =
            annotated.into_iter().map(|a| a.annotation).collect();

        let fee_unit = self.selector.fee_unit(token).await?;
        let selection = self
            .selector
            .select_for_outputs(token, &spec.user_id, &outputs, fee_unit)
            .await?;

        let input_sizes: Vec<u64> = selection
            .utxos
            .iter()
            .map(|u| u.estimated_input_size)
            .collect();
        let plan = plan_change(&input_sizes, selection.total_satoshis(), &outputs, fee_unit)?;
        if let ChangePlan::Change { satoshis, .. } = plan {
            let (change_output, annotation) =
                self.change_output(token, &spec.user_id, satoshis).await?;
            outputs.push(change_output);
            output_annotations.push(annotation);
        }

        let mut tx = Transaction::new();
        let mut annotations = Annotations::default();
        for (index, utxo) in selection.utxos.iter().enumerate() {
            tx.inputs
                .push(TxInput::new(utxo.outpoint.tx_id, utxo.outpoint.vout));
            annotations.inputs.insert(
                index as u32,
                InputAnnotation {
                    outpoint: utxo.outpoint,
                    satoshis: utxo.satoshis,
                    custom_instructions: utxo.custom_instructions.clone(),
                },
            );
        }
        tx.outputs = outputs;
        for (index, annotation) in output_annotations.into_iter().enumerate() {
            annotations.outputs.insert(index as u32, annotation);
        }

        info!(
            user_id = %spec.user_id,
            inputs = tx.inputs.len(),
            outputs = tx.outputs.len(),
            fee = plan.fee(),
            "Outline created"
        );
        Ok((tx, annotations))
    }

    /// P2PKH output to a fresh key of the user, registered so the recorder
    /// recognises it
    async fn change_output(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
        satoshis: u64,
    ) -> WalletResult<(TxOutput, OutputAnnotation)> {
        let pub_key = self.users.pubkey(token, user_id).await?;
        let reference = type42::random_reference();
        let instructions = CustomInstructions::new(vec![CustomInstruction::type42(
            type42::destination_invoice(&reference),
        )]);
        let address = derive_address(&pub_key, &instructions)?;

        self.addresses
            .save_address(
                token,
                &WalletAddress::new(address.to_string(), user_id.to_string(), instructions.clone()),
            )
            .await?;

        Ok((
            TxOutput::new(satoshis, address.locking_script()),
            OutputAnnotation::change(instructions),
        ))
    }
}
