use serde::{Deserialize, Serialize};

use crate::{
    bsv::{script::Script, transaction::TxOutput},
    data_structures::{OutputAnnotation, PaymailAddress, PaymailAnnotation},
    errors::{WalletError, WalletResult},
    outlines::output_spec::{AnnotatedOutput, EvaluationContext},
};

/// Payment to a paymail, optionally split into equal outputs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymailOutputSpec {
    pub to: String,
    pub satoshis: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub splits: Option<u32>,
    /// Sender paymail; the user's default one when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
}

impl PaymailOutputSpec {
    pub(crate) async fn evaluate(
        &self,
        ctx: &EvaluationContext<'_>,
    ) -> WalletResult<Vec<AnnotatedOutput>> {
        let receiver = PaymailAddress::parse(&self.to)?;
        if self.satoshis == 0 {
            return Err(WalletError::ValidationRequired(format!(
                "payment to {receiver} must be greater than zero"
            )));
        }

        let splits = u64::from(self.splits.unwrap_or(1).max(1));
        if splits > 1 && self.satoshis % splits != 0 {
            return Err(WalletError::SplitsMustDivideSatoshis(format!(
                "{} satoshis into {splits} outputs",
                self.satoshis
            )));
        }

        let sender = self.sender(ctx).await?;
        let destinations = ctx
            .paymail
            .get_p2p_destinations(ctx.token, &receiver, self.satoshis)
            .await?;

        if splits > 1 && destinations.outputs.len() != 1 {
            return Err(WalletError::HostCannotSplitWhenRecipientSplitting(format!(
                "{} returned {} outputs",
                receiver.domain(),
                destinations.outputs.len()
            )));
        }

        let annotation = OutputAnnotation::paymail(PaymailAnnotation {
            sender,
            receiver: receiver.to_string(),
            reference: destinations.reference.clone(),
        });

        let mut outputs = Vec::new();
        for destination in &destinations.outputs {
            let script = Script::from_hex(&destination.script).map_err(|e| {
                WalletError::HostInvalidResponse(format!(
                    "{} returned an invalid script: {e}",
                    receiver.domain()
                ))
            })?;
            if splits > 1 {
                let share = self.satoshis / splits;
                for _ in 0..splits {
                    outputs.push(AnnotatedOutput::new(
                        TxOutput::new(share, script.clone()),
                        annotation.clone(),
                    ));
                }
            } else {
                outputs.push(AnnotatedOutput::new(
                    TxOutput::new(destination.satoshis, script),
                    annotation.clone(),
                ));
            }
        }
        Ok(outputs)
    }

    async fn sender(&self, ctx: &EvaluationContext<'_>) -> WalletResult<String> {
        match &self.from {
            Some(from) => {
                let address = PaymailAddress::parse(from).map_err(|e| {
                    WalletError::SenderPaymailNotOwned(format!("{from}: {e}"))
                })?;
                if !ctx.users.has_paymail(ctx.token, ctx.user_id, &address).await? {
                    return Err(WalletError::SenderPaymailNotOwned(format!(
                        "{address} does not belong to user {}",
                        ctx.user_id
                    )));
                }
                Ok(address.to_string())
            }
            None => ctx
                .users
                .default_paymail(ctx.token, ctx.user_id)
                .await?
                .map(|p| p.address())
                .ok_or_else(|| WalletError::SenderPaymailAddressNoDefault(ctx.user_id.to_string())),
        }
    }
}
