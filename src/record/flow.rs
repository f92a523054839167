//! Stages shared by both recording paths

use std::collections::{BTreeMap, HashMap, HashSet};

use secp256k1::PublicKey;
use tracing::debug;

use crate::{
    bsv::{address::Address, hash::TxId, spv::SpvTransaction},
    cancellation::TokioCancellationToken,
    chain::broadcast_with_fallback,
    data_structures::{
        Annotations, Bucket, DataOutput, Operation, OperationType, Outpoint, TrackedOutput,
        TrackedTransaction, TxStatus, Utxo,
    },
    errors::{ErrorKind, WalletError, WalletResult},
    fee::ESTIMATED_P2PKH_INPUT_SIZE,
    key_management::derive_address,
    record::RecordService,
    storage::TransactionRecording,
};

pub(crate) struct RecordingFlow<'a> {
    service: &'a RecordService,
    token: &'a TokioCancellationToken,
    pub spv: SpvTransaction,
    pub tx_id: TxId,
    operations: BTreeMap<String, Operation>,
    spent_outpoints: Vec<Outpoint>,
    new_outputs: Vec<TrackedOutput>,
    new_utxos: Vec<Utxo>,
    data_outputs: Vec<DataOutput>,
    /// Outputs already claimed by an earlier stage
    claimed: HashSet<u32>,
}

impl<'a> RecordingFlow<'a> {
    pub fn new(
        service: &'a RecordService,
        token: &'a TokioCancellationToken,
        spv: SpvTransaction,
    ) -> Self {
        let tx_id = spv.txid();
        Self {
            service,
            token,
            spv,
            tx_id,
            operations: BTreeMap::new(),
            spent_outpoints: Vec::new(),
            new_outputs: Vec::new(),
            new_utxos: Vec::new(),
            data_outputs: Vec::new(),
            claimed: HashSet::new(),
        }
    }

    fn operation(
        &mut self,
        user_id: &str,
        operation_type: OperationType,
        counterparty: &str,
    ) -> &mut Operation {
        let tx_id = self.tx_id;
        self.operations
            .entry(user_id.to_string())
            .or_insert_with(|| {
                let mut operation = Operation::new(tx_id, user_id.to_string(), operation_type);
                operation.counterparty = counterparty.to_string();
                operation
            })
    }

    /// Debit the owners of tracked inputs; returns the distinct owners
    pub async fn process_inputs(&mut self, counterparty: &str) -> WalletResult<Vec<String>> {
        let outpoints: Vec<Outpoint> = self
            .spv
            .tx
            .inputs
            .iter()
            .map(|input| Outpoint::new(input.source_txid, input.source_vout))
            .collect();
        let tracked = self
            .service
            .outputs
            .find_outputs(self.token, &outpoints)
            .await?;

        let mut owners = Vec::new();
        for output in tracked {
            if output.is_spent_by_other(&self.tx_id) {
                return Err(WalletError::UtxoSpent(format!(
                    "{} is already spent",
                    output.outpoint
                )));
            }
            self.operation(&output.user_id, OperationType::Outgoing, counterparty)
                .subtract(output.satoshis);
            self.spent_outpoints.push(output.outpoint);
            if !owners.contains(&output.user_id) {
                owners.push(output.user_id);
            }
        }
        Ok(owners)
    }

    /// Outputs annotated with custom instructions must lock to the address
    /// those instructions derive from the user's key
    pub fn process_custom_outputs(
        &mut self,
        user_id: &str,
        pub_key: &PublicKey,
        annotations: &Annotations,
    ) -> WalletResult<()> {
        for (vout, annotation) in &annotations.outputs {
            let Some(instructions) = &annotation.custom_instructions else {
                continue;
            };
            let output = self.spv.tx.outputs.get(*vout as usize).ok_or_else(|| {
                WalletError::AnnotationMismatch(format!("output {vout} does not exist"))
            })?;
            let expected = derive_address(pub_key, instructions)?;
            let actual = Address::from_locking_script(&output.locking_script);
            if actual.as_ref() != Some(&expected) {
                return Err(WalletError::AnnotationMismatch(format!(
                    "output {vout} does not lock to {expected}"
                )));
            }

            let satoshis = output.satoshis;
            let outpoint = Outpoint::new(self.tx_id, *vout);
            self.new_outputs
                .push(TrackedOutput::new(outpoint, user_id.to_string(), satoshis));
            self.new_utxos.push(Utxo::new(
                user_id.to_string(),
                outpoint,
                satoshis,
                ESTIMATED_P2PKH_INPUT_SIZE,
                instructions.clone(),
            ));
            self.operation(user_id, OperationType::Incoming, "").add(satoshis);
            self.claimed.insert(*vout);
        }
        Ok(())
    }

    /// Credit wallet addresses paid by unclaimed P2PKH outputs; returns the
    /// matched output indexes
    pub async fn process_p2pkh_outputs(&mut self, counterparty: &str) -> WalletResult<Vec<u32>> {
        let mut by_address: HashMap<String, Vec<u32>> = HashMap::new();
        for (vout, output) in self.spv.tx.outputs.iter().enumerate() {
            let vout = vout as u32;
            if self.claimed.contains(&vout) {
                continue;
            }
            if let Some(address) = Address::from_locking_script(&output.locking_script) {
                by_address.entry(address.to_string()).or_default().push(vout);
            }
        }
        if by_address.is_empty() {
            return Ok(Vec::new());
        }

        let candidates: Vec<String> = by_address.keys().cloned().collect();
        let known = self
            .service
            .addresses
            .find_addresses(self.token, &candidates)
            .await?;

        let mut matched = Vec::new();
        for address in known {
            let Some(vouts) = by_address.get(&address.address) else {
                continue;
            };
            for vout in vouts {
                let satoshis = self.spv.tx.outputs[*vout as usize].satoshis;
                let outpoint = Outpoint::new(self.tx_id, *vout);
                self.new_outputs
                    .push(TrackedOutput::new(outpoint, address.user_id.clone(), satoshis));
                self.new_utxos.push(Utxo::new(
                    address.user_id.clone(),
                    outpoint,
                    satoshis,
                    ESTIMATED_P2PKH_INPUT_SIZE,
                    address.custom_instructions.clone(),
                ));
                self.operation(&address.user_id, OperationType::Incoming, counterparty)
                    .add(satoshis);
                self.claimed.insert(*vout);
                matched.push(*vout);
            }
        }
        matched.sort_unstable();
        Ok(matched)
    }

    /// Store the pushes of data outputs for the user
    pub fn process_data_outputs(
        &mut self,
        user_id: &str,
        annotations: &Annotations,
    ) -> WalletResult<()> {
        for (vout, annotation) in &annotations.outputs {
            if annotation.bucket != Bucket::Data {
                continue;
            }
            let output = self.spv.tx.outputs.get(*vout as usize).ok_or_else(|| {
                WalletError::AnnotationMismatch(format!("data output {vout} does not exist"))
            })?;
            let blob = output.locking_script.data_pushes()?.concat();
            self.data_outputs.push(DataOutput {
                outpoint: Outpoint::new(self.tx_id, *vout),
                user_id: user_id.to_string(),
                blob,
            });
            self.operation(user_id, OperationType::Data, "");
            self.claimed.insert(*vout);
        }
        Ok(())
    }

    pub fn ensure_operations(&self) -> WalletResult<()> {
        if self.operations.is_empty() {
            return Err(WalletError::NoOperations(format!(
                "transaction {} does not affect any wallet user",
                self.tx_id
            )));
        }
        Ok(())
    }

    /// Submit the transaction; the row is stored as broadcasted whatever ARC
    /// answers, only a mined callback with its proof promotes it
    pub async fn broadcast(&self) -> WalletResult<TxStatus> {
        let info = broadcast_with_fallback(self.service.broadcaster.as_ref(), self.token, &self.spv)
            .await
            .map_err(|e| match e {
                WalletError::Cancelled
                | WalletError::TxBroadcast(_)
                | WalletError::InvalidTx(_) => e,
                other => other.wrap(ErrorKind::TxBroadcast, "failed to broadcast transaction"),
            })?;
        debug!(tx_id = %self.tx_id, status = ?info.tx_status, "Transaction broadcast");
        Ok(TxStatus::Broadcasted)
    }

    /// Write everything in one database transaction
    ///
    /// The transaction is already on the network at this point, so the
    /// request token is not honoured any more.
    pub async fn persist(self, status: TxStatus) -> WalletResult<Vec<Operation>> {
        let persist_token = TokioCancellationToken::new();

        let mut source_tx_ids: Vec<TxId> = Vec::new();
        for input in &self.spv.tx.inputs {
            if !source_tx_ids.contains(&input.source_txid) {
                source_tx_ids.push(input.source_txid);
            }
        }
        let tracked_sources = self
            .service
            .transactions
            .get_transactions(&persist_token, &source_tx_ids)
            .await?;

        let transaction = if tracked_sources.len() == source_tx_ids.len() {
            TrackedTransaction::new(self.tx_id, status).with_raw_hex(self.spv.tx.to_hex())
        } else {
            TrackedTransaction::new(self.tx_id, status).with_beef_hex(self.spv.to_beef_hex())
        };

        let operations: Vec<Operation> = self.operations.into_values().collect();
        let mut recording = TransactionRecording::new(transaction);
        recording.source_tx_ids = source_tx_ids;
        recording.spent_outpoints = self.spent_outpoints;
        recording.new_outputs = self.new_outputs;
        recording.new_utxos = self.new_utxos;
        recording.data_outputs = self.data_outputs;
        recording.operations = operations.clone();

        self.service
            .transactions
            .record_transaction(&persist_token, &recording)
            .await?;
        Ok(operations)
    }
}
