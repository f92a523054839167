//! Shared fixtures for the integration tests
//!
//! Every harness owns a fresh in-memory SQLite database, mock network
//! collaborators and deterministic user keys.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use secp256k1::{Message, PublicKey, SecretKey, SECP256K1};

use spv_wallet_core::{
    ancestors::DEFAULT_LEVEL_BOUND,
    bsv::{
        hash::TxId,
        merkle_path::{MerklePath, PathElement},
        script::Script,
        sighash::{signature_hash, SIGHASH_ALL_FORKID},
        spv::SpvTransaction,
        transaction::{Transaction, TxInput, TxOutput},
    },
    data_structures::{Annotations, Outpoint, TrackedOutput, TrackedTransaction, TxStatus, Utxo},
    fee::{FeeUnit, StaticFeeProvider, ESTIMATED_P2PKH_INPUT_SIZE},
    key_management::{derive_locking_script, type42, CustomInstruction, CustomInstructions},
    mocks::{MockBroadcaster, MockMerkleRootsVerifier, MockPaymailClient},
    paymail::{P2pDestinations, PaymailDestinationService, PaymentOutput},
    storage::{Repositories, TransactionRepository, UtxoRepository},
    users::PaymailRequest,
    AncestorResolver, InputSelector, OutlinesService, RecordService, SqliteStorage,
    TokioCancellationToken, UsersService,
};

pub type TestResult<T = ()> = Result<T, Box<dyn std::error::Error>>;

/// Block height of funding transactions
pub const FUNDING_HEIGHT: u64 = 885_000;

/// Wallet user with its private key
#[derive(Debug, Clone)]
pub struct TestUser {
    pub id: String,
    pub secret: SecretKey,
    pub public: PublicKey,
}

impl TestUser {
    /// Deterministic key pair from a one-byte seed
    pub fn from_seed(seed: u8) -> Self {
        let secret = SecretKey::from_slice(&[seed; 32]).expect("seed is a valid secret key");
        let public = PublicKey::from_secret_key(SECP256K1, &secret);
        Self {
            id: String::new(),
            secret,
            public,
        }
    }

    pub fn pubkey_hex(&self) -> String {
        hex::encode(self.public.serialize())
    }

    /// Private key matching what `instructions` derive from the public key
    pub fn derive_secret(&self, instructions: &CustomInstructions) -> SecretKey {
        let mut secret = self.secret;
        for instruction in instructions.iter() {
            let parent = PublicKey::from_secret_key(SECP256K1, &secret);
            let tweak = type42::invoice_tweak(&parent, &instruction.instruction)
                .expect("instruction tweak");
            secret = secret.add_tweak(&tweak).expect("tweaked key");
        }
        secret
    }
}

pub struct Harness {
    pub storage: Arc<SqliteStorage>,
    pub repositories: Repositories,
    pub users: UsersService,
    pub broadcaster: MockBroadcaster,
    pub merkle_roots: MockMerkleRootsVerifier,
    pub paymail: MockPaymailClient,
    pub token: TokioCancellationToken,
    funding_counter: AtomicU32,
}

impl Harness {
    pub async fn new() -> TestResult<Self> {
        let storage = Arc::new(SqliteStorage::new_in_memory().await?);
        let repositories = Repositories::from_sqlite(storage.clone());
        let users = UsersService::new(
            repositories.users.clone(),
            repositories.paymails.clone(),
            vec!["example.com".to_string()],
        );
        let destinations =
            PaymailDestinationService::new(users.clone(), repositories.addresses.clone());
        Ok(Self {
            storage,
            repositories,
            users,
            broadcaster: MockBroadcaster::new(),
            merkle_roots: MockMerkleRootsVerifier::new(),
            paymail: MockPaymailClient::new().with_local_host(destinations),
            token: TokioCancellationToken::new(),
            funding_counter: AtomicU32::new(0),
        })
    }

    pub fn ancestors(&self) -> AncestorResolver {
        AncestorResolver::new(self.repositories.transactions.clone(), DEFAULT_LEVEL_BOUND)
    }

    pub fn selector(&self, fee_unit: FeeUnit) -> InputSelector {
        InputSelector::new(
            self.repositories.utxos.clone(),
            Arc::new(StaticFeeProvider::new(fee_unit)),
        )
    }

    pub fn outlines(&self, fee_unit: FeeUnit) -> OutlinesService {
        OutlinesService::new(
            self.users.clone(),
            Arc::new(self.paymail.clone()),
            self.selector(fee_unit),
            self.repositories.addresses.clone(),
            self.ancestors(),
        )
    }

    pub fn recorder(&self) -> RecordService {
        RecordService::new(
            &self.repositories,
            self.users.clone(),
            Arc::new(self.broadcaster.clone()),
            Arc::new(self.merkle_roots.clone()),
            Arc::new(self.paymail.clone()),
            self.ancestors(),
        )
    }

    /// Register a user derived from `seed` with the given paymails
    pub async fn create_user(&self, seed: u8, paymails: &[&str]) -> TestResult<TestUser> {
        let mut user = TestUser::from_seed(seed);
        let requests: Vec<PaymailRequest> =
            paymails.iter().map(|p| PaymailRequest::new(*p)).collect();
        let created = self
            .users
            .create_user(&self.token, &user.pubkey_hex(), &requests)
            .await?;
        user.id = created.id;
        Ok(user)
    }

    /// Store a mined transaction paying `amounts` to keys of `user` and
    /// register its outputs as spendable
    pub async fn fund(&self, user: &TestUser, amounts: &[u64]) -> TestResult<Transaction> {
        let round = self.funding_counter.fetch_add(1, Ordering::SeqCst);
        let mut tx = Transaction::new();
        tx.inputs
            .push(TxInput::new(TxId::from_internal_bytes([0xf0; 32]), round));

        let mut instructions = Vec::new();
        for (vout, satoshis) in amounts.iter().enumerate() {
            let invoice = type42::destination_invoice(&format!("funding-{round}-{vout}"));
            let set = CustomInstructions::new(vec![CustomInstruction::type42(invoice)]);
            tx.outputs
                .push(TxOutput::new(*satoshis, derive_locking_script(&user.public, &set)?));
            instructions.push(set);
        }

        let txid = tx.txid();
        let mut spv = SpvTransaction::new(tx.clone());
        spv.merkle_path = Some(single_leaf_path(FUNDING_HEIGHT, &txid));
        let stored = TrackedTransaction::new(txid, TxStatus::Mined).with_beef_hex(spv.to_beef_hex());
        self.repositories
            .transactions
            .save_transaction(&self.token, &stored)
            .await?;

        let mut outputs = Vec::new();
        let mut utxos = Vec::new();
        for (vout, (satoshis, set)) in amounts.iter().zip(instructions).enumerate() {
            let outpoint = Outpoint::new(txid, vout as u32);
            outputs.push(TrackedOutput::new(outpoint, user.id.clone(), *satoshis));
            utxos.push(Utxo::new(
                user.id.clone(),
                outpoint,
                *satoshis,
                ESTIMATED_P2PKH_INPUT_SIZE,
                set,
            ));
        }
        self.repositories
            .utxos
            .add_utxos(&self.token, &outputs, &utxos)
            .await?;
        Ok(tx)
    }

    /// Answer destination requests for `receiver` with one output of `script`
    pub async fn external_recipient(&self, receiver: &str, satoshis: u64, script: &Script, reference: &str) {
        self.paymail
            .add_destinations(
                receiver,
                P2pDestinations {
                    outputs: vec![PaymentOutput {
                        address: None,
                        satoshis,
                        script: script.to_hex(),
                    }],
                    reference: reference.to_string(),
                },
            )
            .await;
    }

    pub async fn utxo_count(&self) -> TestResult<i64> {
        Ok(self
            .storage
            .connection()
            .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM user_utxos", [], |row| row.get(0))?))
            .await?)
    }
}

/// Merkle path of a block holding only `txid`
pub fn single_leaf_path(block_height: u64, txid: &TxId) -> MerklePath {
    MerklePath::new(block_height, vec![vec![PathElement::txid(0, txid)]])
}

/// Sign every input of `spv` whose source is attached, using the keys the
/// input annotations derive
pub fn sign(spv: &mut SpvTransaction, annotations: &Annotations, user: &TestUser) -> TestResult {
    let mut unlocking = Vec::new();
    for (index, input) in spv.tx.inputs.iter().enumerate() {
        let annotation = annotations
            .inputs
            .get(&(index as u32))
            .ok_or("input without annotation")?;
        let source = spv.source_output(input).ok_or("input source not attached")?;
        let secret = user.derive_secret(&annotation.custom_instructions);
        unlocking.push(unlock(&spv.tx, index, source, &secret)?);
    }
    for (input, script) in spv.tx.inputs.iter_mut().zip(unlocking) {
        input.unlocking_script = script;
    }
    Ok(())
}

/// `<sig> <pubkey>` for input `index` spending `source` with `secret`
pub fn unlock(tx: &Transaction, index: usize, source: &TxOutput, secret: &SecretKey) -> TestResult<Script> {
    let digest = signature_hash(tx, index, source, SIGHASH_ALL_FORKID)?;
    let signature = SECP256K1.sign_ecdsa(&Message::from_digest(digest), secret);
    let mut with_type = signature.serialize_der().to_vec();
    with_type.push(SIGHASH_ALL_FORKID as u8);
    let public = PublicKey::from_secret_key(SECP256K1, secret);
    Ok(Script::p2pkh_unlock(&with_type, &public.serialize())?)
}

/// P2PKH script of a throwaway key
pub fn foreign_script(seed: u8) -> Script {
    spv_wallet_core::bsv::address::Address::from_public_key(&TestUser::from_seed(seed).public)
        .locking_script()
}
