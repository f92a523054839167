//! Paymail: outbound P2P client and the destination service for incoming payments
//!
//! The outline builder resolves recipients through [`PaymailClient`]; the
//! recorder notifies external recipients through the same trait. The HTTP
//! implementation lives behind the `http` feature.

pub mod capabilities;
pub mod destinations;
#[cfg(feature = "http")]
pub mod http_client;

pub use capabilities::*;
pub use destinations::PaymailDestinationService;
#[cfg(feature = "http")]
pub use http_client::HttpPaymailClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{
    cancellation::TokioCancellationToken,
    data_structures::PaymailAddress,
    errors::{WalletError, WalletResult},
};

/// One locking script a paymail host asks to be paid to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    pub satoshis: u64,
    /// Locking script, hex
    pub script: String,
}

/// Response of the P2P payment destination capability
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct P2pDestinations {
    pub outputs: Vec<PaymentOutput>,
    pub reference: String,
}

impl P2pDestinations {
    pub fn total_satoshis(&self) -> u64 {
        self.outputs.iter().map(|o| o.satoshis).sum()
    }

    /// Reject payloads a host should never send for a request of `requested`
    pub fn validate(&self, requested: u64) -> WalletResult<()> {
        if self.outputs.is_empty() {
            return Err(WalletError::HostInvalidResponse(
                "paymail host returned no outputs".to_string(),
            ));
        }
        if self.reference.is_empty() {
            return Err(WalletError::HostInvalidResponse(
                "paymail host returned no reference".to_string(),
            ));
        }
        let total = self.total_satoshis();
        if total > requested {
            return Err(WalletError::HostInvalidResponse(format!(
                "paymail host asked for {total} satoshis, {requested} were requested"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct P2pMetadata {
    pub sender: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pubkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Signed transaction delivered to a paymail host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct P2pTransaction {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beef: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    pub metadata: P2pMetadata,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct P2pTransactionResponse {
    #[serde(default)]
    pub txid: String,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkiResponse {
    #[serde(default)]
    pub bsvalias: String,
    pub handle: String,
    pub pubkey: String,
}

#[async_trait]
pub trait PaymailClient: Send + Sync {
    /// Ask the receiver's host where to send `satoshis`
    async fn get_p2p_destinations(
        &self,
        token: &TokioCancellationToken,
        receiver: &PaymailAddress,
        satoshis: u64,
    ) -> WalletResult<P2pDestinations>;

    /// Deliver a signed transaction to the receiver's host
    async fn send_p2p_transaction(
        &self,
        token: &TokioCancellationToken,
        receiver: &PaymailAddress,
        transaction: &P2pTransaction,
    ) -> WalletResult<P2pTransactionResponse>;

    async fn get_pki(
        &self,
        token: &TokioCancellationToken,
        address: &PaymailAddress,
    ) -> WalletResult<PkiResponse>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn destinations(sats: &[u64]) -> P2pDestinations {
        P2pDestinations {
            outputs: sats
                .iter()
                .map(|s| PaymentOutput {
                    address: None,
                    satoshis: *s,
                    script: "76a914".to_string(),
                })
                .collect(),
            reference: "ref".to_string(),
        }
    }

    #[test]
    fn test_host_asking_for_more_is_invalid() {
        assert!(destinations(&[5, 5]).validate(10).is_ok());
        let err = destinations(&[6, 5]).validate(10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::HostInvalidResponse);
        assert!(destinations(&[]).validate(10).is_err());
    }

    #[test]
    fn test_destinations_json() {
        let parsed: P2pDestinations = serde_json::from_str(
            r#"{"outputs":[{"script":"76a914aa88ac","satoshis":1}],"reference":"abc"}"#,
        )
        .unwrap();
        assert_eq!(parsed.total_satoshis(), 1);
        assert_eq!(parsed.outputs[0].address, None);
    }
}
