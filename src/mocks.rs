//! Test doubles for the network collaborators and the transaction repository
//!
//! Deterministic trait implementations used by unit and integration tests in
//! place of ARC, the block-header service, remote paymail hosts and the
//! database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    bsv::{hash::TxId, spv::SpvTransaction},
    cancellation::TokioCancellationToken,
    chain::{
        ArcTxStatus, Broadcaster, MerkleRootConfirmation, MerkleRootConfirmationRequest,
        MerkleRootConfirmationState, MerkleRootsConfirmations, MerkleRootsVerifier, TxInfo,
    },
    data_structures::{PaymailAddress, TrackedTransaction, TxStatus},
    errors::{WalletError, WalletResult},
    paymail::{
        P2pDestinations, P2pTransaction, P2pTransactionResponse, PaymailClient,
        PaymailDestinationService, PkiResponse,
    },
    storage::{TransactionRecording, TransactionRepository},
};

/// Broadcaster answering with a fixed status or a fixed error
#[derive(Debug, Clone)]
pub struct MockBroadcaster {
    status: Arc<Mutex<ArcTxStatus>>,
    error: Arc<Mutex<Option<String>>>,
    rejection: Arc<Mutex<Option<String>>>,
    known: Arc<Mutex<HashMap<TxId, TxInfo>>>,
    broadcasted: Arc<Mutex<Vec<SpvTransaction>>>,
}

impl Default for MockBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBroadcaster {
    pub fn new() -> Self {
        Self {
            status: Arc::new(Mutex::new(ArcTxStatus::SeenOnNetwork)),
            error: Arc::new(Mutex::new(None)),
            rejection: Arc::new(Mutex::new(None)),
            known: Arc::new(Mutex::new(HashMap::new())),
            broadcasted: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn set_status(&self, status: ArcTxStatus) {
        *self.status.lock().await = status;
    }

    /// Reject every broadcast with `message`
    pub async fn fail_with(&self, message: impl Into<String>) {
        *self.error.lock().await = Some(message.into());
    }

    /// Refuse every broadcast as an invalid transaction
    pub async fn reject_with(&self, message: impl Into<String>) {
        *self.rejection.lock().await = Some(message.into());
    }

    /// Make `query_transaction` know about a transaction
    pub async fn set_known(&self, tx_id: TxId, info: TxInfo) {
        self.known.lock().await.insert(tx_id, info);
    }

    /// Transactions handed to `broadcast`, in order
    pub async fn broadcasted(&self) -> Vec<SpvTransaction> {
        self.broadcasted.lock().await.clone()
    }
}

#[async_trait]
impl Broadcaster for MockBroadcaster {
    async fn broadcast(
        &self,
        token: &TokioCancellationToken,
        tx: &SpvTransaction,
    ) -> WalletResult<TxInfo> {
        token.check()?;
        self.broadcasted.lock().await.push(tx.clone());
        if let Some(message) = self.error.lock().await.clone() {
            return Err(WalletError::TxBroadcast(message));
        }
        if let Some(message) = self.rejection.lock().await.clone() {
            return Err(WalletError::InvalidTx(message));
        }
        let status = *self.status.lock().await;
        if status.is_problematic() {
            return Err(WalletError::TxBroadcast(format!(
                "transaction {} rejected with {status:?}",
                tx.txid()
            )));
        }
        Ok(TxInfo::new(tx.txid().to_hex(), status))
    }

    async fn query_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Option<TxInfo>> {
        token.check()?;
        Ok(self.known.lock().await.get(tx_id).cloned())
    }
}

/// Block-header service with a configurable verdict
#[derive(Debug, Clone)]
pub struct MockMerkleRootsVerifier {
    state: Arc<Mutex<MerkleRootConfirmationState>>,
    requests: Arc<Mutex<Vec<MerkleRootConfirmationRequest>>>,
}

impl Default for MockMerkleRootsVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl MockMerkleRootsVerifier {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MerkleRootConfirmationState::Confirmed)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub async fn set_state(&self, state: MerkleRootConfirmationState) {
        *self.state.lock().await = state;
    }

    pub async fn requests(&self) -> Vec<MerkleRootConfirmationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl MerkleRootsVerifier for MockMerkleRootsVerifier {
    async fn verify_merkle_roots(
        &self,
        token: &TokioCancellationToken,
        roots: &[MerkleRootConfirmationRequest],
    ) -> WalletResult<MerkleRootsConfirmations> {
        token.check()?;
        self.requests.lock().await.extend_from_slice(roots);
        let state = *self.state.lock().await;
        Ok(MerkleRootsConfirmations {
            confirmation_state: state,
            confirmations: roots
                .iter()
                .map(|root| MerkleRootConfirmation {
                    hash: String::new(),
                    block_height: root.block_height,
                    merkle_root: root.merkle_root.clone(),
                    confirmation: state,
                })
                .collect(),
        })
    }
}

/// Paymail hosts answering from configured destinations
///
/// Receivers without configured destinations are served by the local
/// destination service, when one is attached.
#[derive(Clone, Default)]
pub struct MockPaymailClient {
    destinations: Arc<Mutex<HashMap<String, P2pDestinations>>>,
    sent: Arc<Mutex<Vec<(String, P2pTransaction)>>>,
    local: Option<PaymailDestinationService>,
}

impl MockPaymailClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_local_host(mut self, service: PaymailDestinationService) -> Self {
        self.local = Some(service);
        self
    }

    pub async fn add_destinations(&self, receiver: &str, destinations: P2pDestinations) {
        self.destinations
            .lock()
            .await
            .insert(receiver.to_lowercase(), destinations);
    }

    /// Transactions delivered with `send_p2p_transaction`, with their receivers
    pub async fn sent(&self) -> Vec<(String, P2pTransaction)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl PaymailClient for MockPaymailClient {
    async fn get_p2p_destinations(
        &self,
        token: &TokioCancellationToken,
        receiver: &PaymailAddress,
        satoshis: u64,
    ) -> WalletResult<P2pDestinations> {
        token.check()?;
        let configured = self
            .destinations
            .lock()
            .await
            .get(&receiver.to_string())
            .cloned();
        let destinations = match (configured, &self.local) {
            (Some(destinations), _) => destinations,
            (None, Some(local)) => local.create_destination(token, receiver, satoshis).await?,
            (None, None) => {
                return Err(WalletError::HostResponseError(format!(
                    "{receiver} is unknown to its host"
                )))
            }
        };
        destinations.validate(satoshis)?;
        Ok(destinations)
    }

    async fn send_p2p_transaction(
        &self,
        token: &TokioCancellationToken,
        receiver: &PaymailAddress,
        transaction: &P2pTransaction,
    ) -> WalletResult<P2pTransactionResponse> {
        token.check()?;
        self.sent
            .lock()
            .await
            .push((receiver.to_string(), transaction.clone()));
        Ok(P2pTransactionResponse {
            txid: String::new(),
            note: "accepted".to_string(),
        })
    }

    async fn get_pki(
        &self,
        token: &TokioCancellationToken,
        address: &PaymailAddress,
    ) -> WalletResult<PkiResponse> {
        token.check()?;
        let local = self.local.as_ref().ok_or_else(|| {
            WalletError::HostResponseError(format!("{address} has no PKI"))
        })?;
        let key = local.pki(token, address).await?;
        Ok(PkiResponse {
            bsvalias: "1.0".to_string(),
            handle: address.to_string(),
            pubkey: hex::encode(key.serialize()),
        })
    }
}

/// Simulated failures of [`MockTransactionRepository`]
#[derive(Debug, Clone, Copy, Default)]
pub struct MockFailureModes {
    pub fail_on_get: bool,
    pub fail_on_update: bool,
}

/// In-memory transaction store
#[derive(Debug, Clone, Default)]
pub struct MockTransactionRepository {
    rows: Arc<Mutex<HashMap<TxId, TrackedTransaction>>>,
    failure_modes: Arc<Mutex<MockFailureModes>>,
}

impl MockTransactionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, transaction: TrackedTransaction) {
        self.rows.lock().await.insert(transaction.id, transaction);
    }

    /// Same replacement rule as the SQLite repository
    async fn store(&self, transaction: &TrackedTransaction) {
        let mut rows = self.rows.lock().await;
        let keeps_proof = rows.get(&transaction.id).is_some_and(|row| {
            row.status == TxStatus::Mined && transaction.status != TxStatus::Mined
        });
        if !keeps_proof {
            rows.insert(transaction.id, transaction.clone());
        }
    }

    pub async fn get(&self, tx_id: &TxId) -> Option<TrackedTransaction> {
        self.rows.lock().await.get(tx_id).cloned()
    }

    pub async fn set_failure_mode(&self, modes: MockFailureModes) {
        *self.failure_modes.lock().await = modes;
    }

    async fn check_get(&self) -> WalletResult<()> {
        if self.failure_modes.lock().await.fail_on_get {
            return Err(WalletError::StorageError(
                "Mock failure: get transaction".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl TransactionRepository for MockTransactionRepository {
    async fn get_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Option<TrackedTransaction>> {
        token.check()?;
        self.check_get().await?;
        Ok(self.get(tx_id).await)
    }

    async fn get_transactions(
        &self,
        token: &TokioCancellationToken,
        tx_ids: &[TxId],
    ) -> WalletResult<Vec<TrackedTransaction>> {
        token.check()?;
        self.check_get().await?;
        let rows = self.rows.lock().await;
        Ok(tx_ids.iter().filter_map(|id| rows.get(id).cloned()).collect())
    }

    async fn save_transaction(
        &self,
        token: &TokioCancellationToken,
        transaction: &TrackedTransaction,
    ) -> WalletResult<()> {
        token.check()?;
        self.store(transaction).await;
        Ok(())
    }

    async fn update_transaction(
        &self,
        token: &TokioCancellationToken,
        transaction: &TrackedTransaction,
    ) -> WalletResult<()> {
        token.check()?;
        if self.failure_modes.lock().await.fail_on_update {
            return Err(WalletError::StorageError(
                "Mock failure: update transaction".to_string(),
            ));
        }
        transaction.validate().map_err(WalletError::InvalidArgument)?;
        let mut rows = self.rows.lock().await;
        match rows.get_mut(&transaction.id) {
            Some(row) => {
                *row = transaction.clone();
                Ok(())
            }
            None => Err(WalletError::ResourceNotFound(format!(
                "transaction {}",
                transaction.id
            ))),
        }
    }

    async fn record_transaction(
        &self,
        token: &TokioCancellationToken,
        recording: &TransactionRecording,
    ) -> WalletResult<()> {
        token.check()?;
        self.store(&recording.transaction).await;
        Ok(())
    }
}
