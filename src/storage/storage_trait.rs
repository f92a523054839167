//! Repository traits for wallet persistence
//!
//! Services only see these traits. Every method takes the request's
//! cancellation token and returns [`WalletError::Cancelled`] when it fires
//! before the database round-trip completes.
//!
//! [`WalletError::Cancelled`]: crate::errors::WalletError::Cancelled

use async_trait::async_trait;

use crate::{
    bsv::hash::TxId,
    cancellation::TokioCancellationToken,
    data_structures::{
        DataOutput, NewPaymail, Operation, Outpoint, Paymail, TrackedOutput, TrackedTransaction,
        User, Utxo, UtxoSelection, WalletAddress,
    },
    errors::WalletResult,
    fee::FeeUnit,
};

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert the user unless a user with the same public key exists
    async fn create_user(&self, token: &TokioCancellationToken, user: &User) -> WalletResult<User>;

    async fn get_user(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Option<User>>;
}

#[async_trait]
pub trait PaymailRepository: Send + Sync {
    /// Fails with `ValidationRequired` when `(alias, domain)` is taken
    async fn add_paymail(
        &self,
        token: &TokioCancellationToken,
        paymail: &NewPaymail,
    ) -> WalletResult<Paymail>;

    async fn find_paymail(
        &self,
        token: &TokioCancellationToken,
        alias: &str,
        domain: &str,
    ) -> WalletResult<Option<Paymail>>;

    /// First paymail created for the user
    async fn default_paymail(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Option<Paymail>>;

    async fn list_paymails(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Vec<Paymail>>;
}

#[async_trait]
pub trait AddressRepository: Send + Sync {
    async fn save_address(
        &self,
        token: &TokioCancellationToken,
        address: &WalletAddress,
    ) -> WalletResult<()>;

    /// Rows for the given addresses, ignoring soft-deleted ones
    async fn find_addresses(
        &self,
        token: &TokioCancellationToken,
        addresses: &[String],
    ) -> WalletResult<Vec<WalletAddress>>;
}

#[async_trait]
pub trait OutputRepository: Send + Sync {
    /// Tracked outputs for the given outpoints; unknown outpoints are skipped
    async fn find_outputs(
        &self,
        token: &TokioCancellationToken,
        outpoints: &[Outpoint],
    ) -> WalletResult<Vec<TrackedOutput>>;
}

/// Parameters of one select-and-touch round
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRequest<'a> {
    pub user_id: &'a str,
    pub target_satoshis: u64,
    pub tx_bytes_without_inputs: u64,
    pub fee_unit: FeeUnit,
    pub change_output_size: u64,
}

#[async_trait]
pub trait UtxoRepository: Send + Sync {
    /// Pick the shortest prefix of the user's UTXOs, ordered by
    /// `(touched_at, created_at, tx_id, vout)`, that covers the target and
    /// fee, and touch it, in one database transaction
    ///
    /// An empty selection means the funds are insufficient.
    async fn select_utxos(
        &self,
        token: &TokioCancellationToken,
        request: SelectionRequest<'_>,
    ) -> WalletResult<UtxoSelection>;

    async fn list_utxos(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Vec<Utxo>>;

    /// Insert spendable outputs outside of a recording, e.g. funding
    async fn add_utxos(
        &self,
        token: &TokioCancellationToken,
        outputs: &[TrackedOutput],
        utxos: &[Utxo],
    ) -> WalletResult<()>;
}

/// Everything one recorded transaction writes, persisted atomically
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionRecording {
    pub transaction: TrackedTransaction,
    /// Distinct transactions spent by the inputs
    pub source_tx_ids: Vec<TxId>,
    /// Wallet-tracked outpoints consumed by the inputs
    pub spent_outpoints: Vec<Outpoint>,
    pub new_outputs: Vec<TrackedOutput>,
    pub new_utxos: Vec<Utxo>,
    pub data_outputs: Vec<DataOutput>,
    pub operations: Vec<Operation>,
}

impl TransactionRecording {
    pub fn new(transaction: TrackedTransaction) -> Self {
        Self {
            transaction,
            source_tx_ids: Vec::new(),
            spent_outpoints: Vec::new(),
            new_outputs: Vec::new(),
            new_utxos: Vec::new(),
            data_outputs: Vec::new(),
            operations: Vec::new(),
        }
    }
}

#[async_trait]
pub trait TransactionRepository: Send + Sync {
    async fn get_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Option<TrackedTransaction>>;

    /// One batched lookup; missing ids are skipped
    async fn get_transactions(
        &self,
        token: &TokioCancellationToken,
        tx_ids: &[TxId],
    ) -> WalletResult<Vec<TrackedTransaction>>;

    /// Insert or replace a transaction row without touching outputs
    ///
    /// A MINED row keeps its proof when the replacement is not mined.
    async fn save_transaction(
        &self,
        token: &TokioCancellationToken,
        transaction: &TrackedTransaction,
    ) -> WalletResult<()>;

    /// Overwrite status, serial forms and block data of an existing row
    async fn update_transaction(
        &self,
        token: &TokioCancellationToken,
        transaction: &TrackedTransaction,
    ) -> WalletResult<()>;

    /// Persist a recording in one database transaction
    ///
    /// Fails with `UtxoSpent` and writes nothing if any spent outpoint already
    /// carries a different spending transaction.
    async fn record_transaction(
        &self,
        token: &TokioCancellationToken,
        recording: &TransactionRecording,
    ) -> WalletResult<()>;
}

#[async_trait]
pub trait OperationRepository: Send + Sync {
    async fn list_operations(
        &self,
        token: &TokioCancellationToken,
        user_id: &str,
    ) -> WalletResult<Vec<Operation>>;

    async fn operations_for_transaction(
        &self,
        token: &TokioCancellationToken,
        tx_id: &TxId,
    ) -> WalletResult<Vec<Operation>>;

    /// Sum of the user's operations
    async fn balance(&self, token: &TokioCancellationToken, user_id: &str) -> WalletResult<i64>;
}

#[async_trait]
pub trait DataRepository: Send + Sync {
    async fn find_data(
        &self,
        token: &TokioCancellationToken,
        outpoint: &Outpoint,
    ) -> WalletResult<Option<DataOutput>>;
}
