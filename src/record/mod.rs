//! Recording of signed transactions
//!
//! Two entry points share one flow: transactions built from an outline and
//! signed by a wallet user, and transactions delivered by an external sender
//! through the paymail P2P server. Either way the transaction is verified,
//! turned into per-user operations, broadcast and then persisted in one
//! database transaction.

mod flow;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    ancestors::{verify_ancestors, AncestorResolver},
    bsv::{
        beef::is_beef_hex,
        hash::TxId,
        spv::SpvTransaction,
        transaction::Transaction,
        verify::{verify_scripts, P2pkhScriptVerifier, ScriptVerifier},
    },
    cancellation::TokioCancellationToken,
    chain::{verify_merkle_roots_of, Broadcaster, MerkleRootsVerifier},
    data_structures::{Annotations, Bucket, Operation, PaymailAddress, PaymailAnnotation, TxStatus},
    errors::{WalletError, WalletResult},
    paymail::{P2pMetadata, P2pTransaction, PaymailClient},
    record::flow::RecordingFlow,
    storage::{AddressRepository, OutputRepository, Repositories, TransactionRepository},
    users::UsersService,
};

/// Signed transaction returned by the client together with its outline
/// annotations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOutline {
    /// Raw or BEEF hex
    pub hex: String,
    #[serde(default)]
    pub annotations: Annotations,
}

impl SignedOutline {
    pub fn new(hex: impl Into<String>, annotations: Annotations) -> Self {
        Self {
            hex: hex.into(),
            annotations,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTransaction {
    pub tx_id: TxId,
    pub status: TxStatus,
    pub operations: Vec<Operation>,
}

#[derive(Clone)]
pub struct RecordService {
    pub(crate) addresses: Arc<dyn AddressRepository>,
    pub(crate) outputs: Arc<dyn OutputRepository>,
    pub(crate) transactions: Arc<dyn TransactionRepository>,
    pub(crate) broadcaster: Arc<dyn Broadcaster>,
    users: UsersService,
    merkle_roots: Arc<dyn MerkleRootsVerifier>,
    paymail: Arc<dyn PaymailClient>,
    ancestors: AncestorResolver,
    verifier: Arc<dyn ScriptVerifier>,
}

impl RecordService {
    pub fn new(
        repositories: &Repositories,
        users: UsersService,
        broadcaster: Arc<dyn Broadcaster>,
        merkle_roots: Arc<dyn MerkleRootsVerifier>,
        paymail: Arc<dyn PaymailClient>,
        ancestors: AncestorResolver,
    ) -> Self {
        Self {
            addresses: repositories.addresses.clone(),
            outputs: repositories.outputs.clone(),
            transactions: repositories.transactions.clone(),
            broadcaster,
            users,
            merkle_roots,
            paymail,
            ancestors,
            verifier: Arc::new(P2pkhScriptVerifier),
        }
    }

    pub fn with_script_verifier(mut self, verifier: Arc<dyn ScriptVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Record a transaction the user signed from an outline
    pub async fn record_outline(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
        outline: &SignedOutline,
    ) -> WalletResult<RecordedTransaction> {
        let pub_key = self.users.pubkey(token, user_id).await?;
        let spv = self.parse(token, &outline.hex).await?;
        let annotations = &outline.annotations;

        let recipient = single_paymail_recipient(annotations, spv.tx.outputs.len())?;
        let receiver = recipient.map(|p| p.receiver.clone()).unwrap_or_default();

        let mut flow = RecordingFlow::new(self, token, spv);
        let owners = flow.process_inputs(&receiver).await?;
        if let Some(foreign) = owners.iter().find(|owner| owner.as_str() != user_id) {
            return Err(WalletError::InvalidTransactionInput(format!(
                "input owned by {foreign} cannot be recorded for {user_id}"
            )));
        }

        flow.process_custom_outputs(user_id, &pub_key, annotations)?;
        let sender = recipient.map(|p| p.sender.clone()).unwrap_or_default();
        let matched = flow.process_p2pkh_outputs(&sender).await?;
        flow.process_data_outputs(user_id, annotations)?;
        flow.ensure_operations()?;

        if let Some(paymail) = recipient {
            let internal = annotations
                .paymail_outputs()
                .any(|(vout, _)| matched.contains(&vout));
            if internal {
                info!(tx_id = %flow.tx_id, receiver = %paymail.receiver, "Recipient is served by this wallet, skipping P2P notification");
            } else {
                self.notify_recipient(token, &flow.spv, paymail).await?;
            }
        }

        let status = flow.broadcast().await?;
        let tx_id = flow.tx_id;
        let operations = flow.persist(status).await?;
        info!(tx_id = %tx_id, user_id = %user_id, status = %status, "Outline transaction recorded");
        Ok(RecordedTransaction {
            tx_id,
            status,
            operations,
        })
    }

    /// Record a transaction an external sender delivered to one of our paymails
    pub async fn record_paymail(
        &self,
        token: &TokioCancellationToken,
        sender: &str,
        receiver: &str,
        hex: &str,
    ) -> WalletResult<RecordedTransaction> {
        let receiver = PaymailAddress::parse(receiver)?;
        let spv = self.parse(token, hex).await?;

        let mut flow = RecordingFlow::new(self, token, spv);
        let owners = flow.process_inputs(&receiver.to_string()).await?;
        if owners.len() > 1 {
            return Err(WalletError::InvalidTransactionInput(format!(
                "inputs of {} belong to {} wallet users",
                flow.tx_id,
                owners.len()
            )));
        }
        flow.process_p2pkh_outputs(sender).await?;
        flow.ensure_operations()?;

        let status = flow.broadcast().await?;
        let tx_id = flow.tx_id;
        let operations = flow.persist(status).await?;
        info!(tx_id = %tx_id, sender = %sender, receiver = %receiver, "Paymail transaction recorded");
        Ok(RecordedTransaction {
            tx_id,
            status,
            operations,
        })
    }

    /// Decode, complete the ancestry and verify every script
    async fn parse(&self, token: &TokioCancellationToken, hex: &str) -> WalletResult<SpvTransaction> {
        let mut spv = if is_beef_hex(hex) {
            let spv = SpvTransaction::from_beef_hex(hex)?;
            verify_merkle_roots_of(self.merkle_roots.as_ref(), token, &spv).await?;
            spv
        } else {
            SpvTransaction::new(Transaction::from_hex(hex).map_err(|e| {
                WalletError::UnsupportedTransactionFormat(format!("neither BEEF nor raw hex: {e}"))
            })?)
        };

        if !spv.missing_sources().is_empty() {
            self.ancestors.attach_sources(token, &mut spv).await?;
        } else {
            verify_ancestors(self.verifier.as_ref(), &spv.ancestors)?;
        }
        verify_scripts(self.verifier.as_ref(), &spv)?;
        Ok(spv)
    }

    async fn notify_recipient(
        &self,
        token: &TokioCancellationToken,
        spv: &SpvTransaction,
        paymail: &PaymailAnnotation,
    ) -> WalletResult<()> {
        let receiver = PaymailAddress::parse(&paymail.receiver)?;
        let response = self
            .paymail
            .send_p2p_transaction(
                token,
                &receiver,
                &P2pTransaction {
                    beef: Some(spv.to_beef_hex()),
                    hex: None,
                    metadata: P2pMetadata {
                        sender: paymail.sender.clone(),
                        ..P2pMetadata::default()
                    },
                    reference: paymail.reference.clone(),
                },
            )
            .await?;
        info!(tx_id = %spv.txid(), receiver = %receiver, note = %response.note, "Recipient notified");
        Ok(())
    }
}

/// The one paymail recipient of the outline, if any
fn single_paymail_recipient(
    annotations: &Annotations,
    output_count: usize,
) -> WalletResult<Option<&PaymailAnnotation>> {
    let mut recipient: Option<&PaymailAnnotation> = None;
    for (vout, paymail) in annotations.paymail_outputs() {
        let is_bsv = annotations
            .outputs
            .get(&vout)
            .is_some_and(|a| a.bucket == Bucket::Bsv);
        if !is_bsv || vout as usize >= output_count {
            continue;
        }
        match recipient {
            Some(existing) if existing != paymail => {
                return Err(WalletError::MultiPaymailRecipientsNotSupported(format!(
                    "{} and {}",
                    existing.receiver, paymail.receiver
                )))
            }
            _ => recipient = Some(paymail),
        }
    }
    Ok(recipient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::OutputAnnotation;
    use crate::errors::ErrorKind;

    fn paymail(receiver: &str) -> OutputAnnotation {
        OutputAnnotation::paymail(PaymailAnnotation {
            sender: "alice@example.com".to_string(),
            receiver: receiver.to_string(),
            reference: "ref".to_string(),
        })
    }

    #[test]
    fn test_split_outputs_to_one_recipient() {
        let mut annotations = Annotations::default();
        annotations.outputs.insert(0, paymail("bob@example.com"));
        annotations.outputs.insert(1, paymail("bob@example.com"));
        let recipient = single_paymail_recipient(&annotations, 2).unwrap().unwrap();
        assert_eq!(recipient.receiver, "bob@example.com");
    }

    #[test]
    fn test_two_recipients_rejected() {
        let mut annotations = Annotations::default();
        annotations.outputs.insert(0, paymail("bob@example.com"));
        annotations.outputs.insert(1, paymail("carol@example.com"));
        let err = single_paymail_recipient(&annotations, 2).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::MultiPaymailRecipientsNotSupported);
    }

    #[test]
    fn test_annotation_beyond_outputs_ignored() {
        let mut annotations = Annotations::default();
        annotations.outputs.insert(3, paymail("bob@example.com"));
        assert!(single_paymail_recipient(&annotations, 1).unwrap().is_none());
    }
}
