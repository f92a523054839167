//! Client description of transaction outputs
//!
//! Each variant expands into one or more annotated outputs. New kinds are
//! added as a variant plus an arm in [`OutputSpec::evaluate`].

use serde::{Deserialize, Serialize};

use crate::{
    bsv::transaction::TxOutput,
    cancellation::TokioCancellationToken,
    data_structures::OutputAnnotation,
    errors::WalletResult,
    outlines::{data_output::DataCarrierSpec, paymail_output::PaymailOutputSpec},
    paymail::PaymailClient,
    users::UsersService,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputSpec {
    Paymail(PaymailOutputSpec),
    #[serde(rename = "op_return", alias = "data_carrier")]
    DataCarrier(DataCarrierSpec),
}

impl OutputSpec {
    pub fn paymail(to: impl Into<String>, satoshis: u64) -> Self {
        OutputSpec::Paymail(PaymailOutputSpec {
            to: to.into(),
            satoshis,
            splits: None,
            from: None,
        })
    }

    pub fn strings<S: Into<String>>(data: impl IntoIterator<Item = S>) -> Self {
        OutputSpec::DataCarrier(DataCarrierSpec::strings(data))
    }

    pub(crate) async fn evaluate(
        &self,
        ctx: &EvaluationContext<'_>,
    ) -> WalletResult<Vec<AnnotatedOutput>> {
        match self {
            OutputSpec::Paymail(spec) => spec.evaluate(ctx).await,
            OutputSpec::DataCarrier(spec) => spec.evaluate(),
        }
    }
}

/// Output paired with the annotation returned to the client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatedOutput {
    pub output: TxOutput,
    pub annotation: OutputAnnotation,
}

impl AnnotatedOutput {
    pub fn new(output: TxOutput, annotation: OutputAnnotation) -> Self {
        Self { output, annotation }
    }
}

/// What output strategies may consult while evaluating
pub(crate) struct EvaluationContext<'a> {
    pub token: &'a TokioCancellationToken,
    pub user_id: &'a str,
    pub users: &'a UsersService,
    pub paymail: &'a dyn PaymailClient,
}
