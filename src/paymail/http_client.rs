//! HTTP paymail client
//!
//! Capabilities are discovered at `https://<domain>/.well-known/bsvalias` and
//! cached per domain.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use tracing::debug;

use crate::{
    cancellation::TokioCancellationToken,
    config::PaymailConfig,
    data_structures::PaymailAddress,
    errors::{WalletError, WalletResult},
    paymail::{
        capabilities::{
            expand_template, Capabilities, CapabilityCache, BRFC_PKI, BRFC_PKI_ALTERNATE,
        },
        P2pDestinations, P2pTransaction, P2pTransactionResponse, PaymailClient, PkiResponse,
    },
};

const WELL_KNOWN_PATH: &str = "/.well-known/bsvalias";

#[derive(Serialize)]
struct PaymentRequest {
    satoshis: u64,
}

pub struct HttpPaymailClient {
    client: Client,
    cache: CapabilityCache,
    scheme: String,
}

impl HttpPaymailClient {
    pub fn new(config: &PaymailConfig) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WalletError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            cache: CapabilityCache::new(
                Duration::from_secs(config.capability_cache_ttl_secs),
                config.capability_cache_max_entries,
            ),
            scheme: "https".to_string(),
        })
    }

    /// Discover over plain HTTP; local hosts only
    pub fn with_insecure_discovery(mut self) -> Self {
        self.scheme = "http".to_string();
        self
    }

    pub async fn capabilities(
        &self,
        token: &TokioCancellationToken,
        domain: &str,
    ) -> WalletResult<Capabilities> {
        if let Some(cached) = self.cache.get(domain).await {
            return Ok(cached);
        }

        let url = format!("{}://{domain}{WELL_KNOWN_PATH}", self.scheme);
        let capabilities: Capabilities = token
            .run(async {
                let response = self.client.get(&url).send().await.map_err(|e| {
                    WalletError::HostResponseError(format!("capabilities of {domain}: {e}"))
                })?;
                Self::parse_response(response, domain).await
            })
            .await?;

        debug!(domain = %domain, count = capabilities.capabilities.len(), "Paymail capabilities fetched");
        self.cache.insert(domain, capabilities.clone()).await;
        Ok(capabilities)
    }

    async fn parse_response<T: DeserializeOwned>(
        response: reqwest::Response,
        host: &str,
    ) -> WalletResult<T> {
        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(WalletError::HostResponseError(format!(
                "{host} responded with 404"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(WalletError::HostResponseError(format!(
                "{host} responded with {status}: {body}"
            )));
        }
        response
            .json::<T>()
            .await
            .map_err(|e| WalletError::HostInvalidResponse(format!("{host}: {e}")))
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        token: &TokioCancellationToken,
        url: &str,
        body: &B,
        host: &str,
    ) -> WalletResult<T> {
        token
            .run(async {
                let response = self
                    .client
                    .post(url)
                    .json(body)
                    .send()
                    .await
                    .map_err(|e| WalletError::HostResponseError(format!("{host}: {e}")))?;
                Self::parse_response(response, host).await
            })
            .await
    }
}

#[async_trait]
impl PaymailClient for HttpPaymailClient {
    async fn get_p2p_destinations(
        &self,
        token: &TokioCancellationToken,
        receiver: &PaymailAddress,
        satoshis: u64,
    ) -> WalletResult<P2pDestinations> {
        let capabilities = self.capabilities(token, receiver.domain()).await?;
        let p2p = capabilities.p2p().ok_or_else(|| {
            WalletError::HostNotSupportingP2P(receiver.domain().to_string())
        })?;
        let url = expand_template(&p2p.destination_url, receiver.alias(), receiver.domain());

        let destinations: P2pDestinations = self
            .post_json(token, &url, &PaymentRequest { satoshis }, receiver.domain())
            .await?;
        destinations.validate(satoshis)?;

        debug!(
            receiver = %receiver,
            outputs = destinations.outputs.len(),
            reference = %destinations.reference,
            "Paymail destinations resolved"
        );
        Ok(destinations)
    }

    async fn send_p2p_transaction(
        &self,
        token: &TokioCancellationToken,
        receiver: &PaymailAddress,
        transaction: &P2pTransaction,
    ) -> WalletResult<P2pTransactionResponse> {
        let capabilities = self.capabilities(token, receiver.domain()).await?;
        let p2p = capabilities.p2p().ok_or_else(|| {
            WalletError::HostNotSupportingP2P(receiver.domain().to_string())
        })?;
        let url = expand_template(&p2p.submit_url, receiver.alias(), receiver.domain());
        self.post_json(token, &url, transaction, receiver.domain())
            .await
    }

    async fn get_pki(
        &self,
        token: &TokioCancellationToken,
        address: &PaymailAddress,
    ) -> WalletResult<PkiResponse> {
        let capabilities = self.capabilities(token, address.domain()).await?;
        let template = capabilities
            .get_string(BRFC_PKI, BRFC_PKI_ALTERNATE)
            .ok_or_else(|| {
                WalletError::HostResponseError(format!(
                    "{} does not expose a PKI capability",
                    address.domain()
                ))
            })?;
        let url = expand_template(template, address.alias(), address.domain());
        token
            .run(async {
                let response = self.client.get(&url).send().await.map_err(|e| {
                    WalletError::HostResponseError(format!("{}: {e}", address.domain()))
                })?;
                Self::parse_response(response, address.domain()).await
            })
            .await
    }
}
