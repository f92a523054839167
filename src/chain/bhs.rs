//! Block-header service client

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::{
    cancellation::TokioCancellationToken,
    chain::{MerkleRootConfirmationRequest, MerkleRootsConfirmations, MerkleRootsVerifier},
    config::BhsConfig,
    errors::{WalletError, WalletResult},
};

const VERIFY_PATH: &str = "/api/v1/chain/merkleroot/verify";

pub struct BlockHeadersClient {
    client: Client,
    config: BhsConfig,
}

impl BlockHeadersClient {
    pub fn new(config: BhsConfig) -> WalletResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| WalletError::NetworkError(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client, config })
    }
}

#[async_trait]
impl MerkleRootsVerifier for BlockHeadersClient {
    async fn verify_merkle_roots(
        &self,
        token: &TokioCancellationToken,
        roots: &[MerkleRootConfirmationRequest],
    ) -> WalletResult<MerkleRootsConfirmations> {
        let url = format!("{}{VERIFY_PATH}", self.config.url.trim_end_matches('/'));
        let mut request = self.client.post(url).json(roots);
        if !self.config.auth_token.is_empty() {
            request = request.bearer_auth(&self.config.auth_token);
        }

        token
            .run(async {
                let response = request.send().await.map_err(|e| {
                    WalletError::NetworkError(format!("Block header service request failed: {e}"))
                })?;
                if !response.status().is_success() {
                    return Err(WalletError::NetworkError(format!(
                        "Block header service responded with {}",
                        response.status()
                    )));
                }
                response.json::<MerkleRootsConfirmations>().await.map_err(|e| {
                    WalletError::SerializationError(format!(
                        "Invalid block header service response: {e}"
                    ))
                })
            })
            .await
    }
}
