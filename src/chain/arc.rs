//! ARC broadcaster client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use tracing::{debug, info};

use crate::{
    bsv::{hash::TxId, spv::SpvTransaction},
    cancellation::TokioCancellationToken,
    chain::{ArcError, Broadcaster, PolicyResponse, TxInfo},
    config::ArcConfig,
    errors::{WalletError, WalletResult},
    fee::{FeePolicySource, FeeUnit},
};

const STATUS_NOT_EXTENDED_FORMAT: u16 = 460;
const STATUS_FEE_TOO_LOW: u16 = 465;
const STATUS_CUMULATIVE_FEE_VALIDATION_FAILED: u16 = 473;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BroadcastRequest {
    /// Raw, Extended Format or BEEF hex
    raw_tx: String,
}

pub struct ArcClient {
    client: Client,
    config: ArcConfig,
}

impl ArcClient {
    pub fn new(config: ArcConfig) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WalletError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.url.trim_end_matches('/'), path)
    }

    fn authorize(&self, mut request: RequestBuilder) -> RequestBuilder {
        request = request.header("Content-Type", "application/json");
        let token = self.config.token.trim();
        if let Some(bearer) = token.strip_prefix("Bearer ") {
            request = request.bearer_auth(bearer.trim());
        } else if !token.is_empty() {
            request = request.bearer_auth(token);
        }
        if !self.config.deployment_id.is_empty() {
            request = request.header("XDeployment-ID", &self.config.deployment_id);
        }
        request
    }

    fn with_callback(&self, mut request: RequestBuilder) -> RequestBuilder {
        if let Some(callback) = self.config.callback.as_ref().filter(|c| !c.url.is_empty()) {
            request = request.header("X-CallbackUrl", &callback.url);
            if !callback.token.is_empty() {
                request = request.header("X-CallbackToken", &callback.token);
            }
        }
        request
    }

    /// Extended Format when every source is attached, raw hex otherwise
    fn tx_hex(tx: &SpvTransaction) -> String {
        match tx.to_extended_format_hex() {
            Some(ef) => ef,
            None => {
                info!(
                    tx_id = %tx.txid(),
                    "Source transactions missing, broadcasting raw hex"
                );
                tx.tx.to_hex()
            }
        }
    }

    async fn send(&self, request: RequestBuilder) -> WalletResult<reqwest::Response> {
        request
            .send()
            .await
            .map_err(|e| WalletError::NetworkError(format!("ARC request failed: {e}")))
    }

    fn rejection(category: &str, status: StatusCode, body: &str) -> WalletError {
        WalletError::TxBroadcast(format!("{category}: {}", Self::arc_error(status, body).summary()))
    }

    /// ARC refused the payload itself
    fn invalid_tx(category: &str, status: StatusCode, body: &str) -> WalletError {
        WalletError::InvalidTx(format!("{category}: {}", Self::arc_error(status, body).summary()))
    }

    fn arc_error(status: StatusCode, body: &str) -> ArcError {
        serde_json::from_str(body).unwrap_or_else(|_| ArcError {
            status: status.as_u16(),
            detail: body.to_string(),
            ..ArcError::default()
        })
    }

    /// Error for a non-200 broadcast answer
    ///
    /// Access and conflict answers and server failures are broadcast errors;
    /// any other 4xx means ARC rejected the transaction.
    fn broadcast_failure(status: StatusCode, body: &str) -> WalletError {
        match status.as_u16() {
            401 | 403 | 404 => Self::rejection("ARC unauthorized", status, body),
            409 => Self::rejection("ARC generic error", status, body),
            STATUS_NOT_EXTENDED_FORMAT => {
                Self::invalid_tx("ARC expected extended format", status, body)
            }
            STATUS_FEE_TOO_LOW | STATUS_CUMULATIVE_FEE_VALIDATION_FAILED => {
                Self::invalid_tx("ARC wrong fee", status, body)
            }
            400..=499 => Self::invalid_tx("ARC unprocessable", status, body),
            _ => Self::rejection("ARC unprocessable", status, body),
        }
    }
}

#[async_trait]
impl Broadcaster for ArcClient {
    async fn broadcast(
        &self,
        token: &TokioCancellationToken,
        tx: &SpvTransaction,
    ) -> WalletResult<TxInfo> {
        let body = BroadcastRequest {
            raw_tx: Self::tx_hex(tx),
        };
        let request = self.with_callback(self.authorize(self.client.post(self.url("/v1/tx"))));

        token
            .run(async {
                let response = self.send(request.json(&body)).await?;
                let status = response.status();
                let text = response
                    .text()
                    .await
                    .map_err(|e| WalletError::NetworkError(format!("Failed to read ARC response: {e}")))?;

                match status.as_u16() {
                    200 => {
                        let info: TxInfo = serde_json::from_str(&text).map_err(|e| {
                            WalletError::SerializationError(format!("Invalid ARC response: {e}"))
                        })?;
                        if info.tx_status.is_problematic() {
                            return Err(WalletError::TxBroadcast(format!(
                                "ARC problematic tx status: {:?}{}",
                                info.tx_status,
                                info.extra_info
                                    .as_deref()
                                    .map(|e| format!(" ({e})"))
                                    .unwrap_or_default()
                            )));
                        }
                        debug!(tx_id = %info.tx_id, status = ?info.tx_status, "Transaction broadcast");
                        Ok(info)
                    }
                    _ => Err(Self::broadcast_failure(status, &text)),
                }
            })
            .await
    }

    async fn query_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Option<TxInfo>> {
        let request = self.authorize(self.client.get(self.url(&format!("/v1/tx/{tx_id}"))));
        token
            .run(async {
                let response = self.send(request).await?;
                match response.status() {
                    StatusCode::OK => response.json::<TxInfo>().await.map(Some).map_err(|e| {
                        WalletError::SerializationError(format!("Invalid ARC response: {e}"))
                    }),
                    StatusCode::NOT_FOUND => Ok(None),
                    status => {
                        let text = response.text().await.unwrap_or_default();
                        Err(Self::rejection("ARC query failed", status, &text))
                    }
                }
            })
            .await
    }
}

#[async_trait]
impl FeePolicySource for ArcClient {
    async fn mining_fee(&self, token: &TokioCancellationToken) -> WalletResult<FeeUnit> {
        let request = self.authorize(self.client.get(self.url("/v1/policy")));
        token
            .run(async {
                let response = self.send(request).await?;
                if !response.status().is_success() {
                    return Err(WalletError::NetworkError(format!(
                        "ARC policy request failed: {}",
                        response.status()
                    )));
                }
                let policy: PolicyResponse = response.json().await.map_err(|e| {
                    WalletError::SerializationError(format!("Invalid ARC policy response: {e}"))
                })?;
                Ok(policy.policy.mining_fee)
            })
            .await
    }
}
