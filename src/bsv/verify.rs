//! Script-level verification of signed inputs

use secp256k1::{ecdsa::Signature, Message, PublicKey, SECP256K1};

use crate::bsv::hash::hash160;
use crate::bsv::script::ScriptChunk;
use crate::bsv::sighash::{signature_hash, SIGHASH_FORKID};
use crate::bsv::spv::SpvTransaction;
use crate::bsv::transaction::{Transaction, TxOutput};
use crate::errors::{WalletError, WalletResult};

/// Verifies one input's unlocking script against the output it spends
pub trait ScriptVerifier: Send + Sync {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        source: &TxOutput,
    ) -> WalletResult<()>;
}

/// Verifier for the standard pay-to-public-key-hash template
#[derive(Debug, Clone, Copy, Default)]
pub struct P2pkhScriptVerifier;

impl ScriptVerifier for P2pkhScriptVerifier {
    fn verify_input(
        &self,
        tx: &Transaction,
        input_index: usize,
        source: &TxOutput,
    ) -> WalletResult<()> {
        let input = tx.inputs.get(input_index).ok_or_else(|| {
            WalletError::TxValidation(format!("input {input_index} does not exist"))
        })?;
        let expected_hash = source.locking_script.p2pkh_pubkey_hash().ok_or_else(|| {
            WalletError::TxValidation(format!(
                "input {input_index} spends a non-P2PKH output"
            ))
        })?;

        let chunks = input.unlocking_script.chunks()?;
        let (sig_with_type, pubkey_bytes) = match chunks.as_slice() {
            [ScriptChunk::Push(sig), ScriptChunk::Push(key)] => {
                (sig.as_slice(), key.as_slice())
            }
            _ => {
                return Err(WalletError::TxValidation(format!(
                    "input {input_index} unlocking script is not <sig> <pubkey>"
                )))
            }
        };

        if hash160(pubkey_bytes) != expected_hash {
            return Err(WalletError::TxValidation(format!(
                "input {input_index} public key does not match the locking script"
            )));
        }

        let (sighash_byte, der) = sig_with_type.split_last().ok_or_else(|| {
            WalletError::TxValidation(format!("input {input_index} has an empty signature"))
        })?;
        let sighash_type = *sighash_byte as u32;
        if sighash_type & SIGHASH_FORKID == 0 {
            return Err(WalletError::TxValidation(format!(
                "input {input_index} signature lacks SIGHASH_FORKID"
            )));
        }

        let public_key = PublicKey::from_slice(pubkey_bytes).map_err(|e| {
            WalletError::TxValidation(format!("input {input_index} public key: {e}"))
        })?;
        let mut signature = Signature::from_der(der).map_err(|e| {
            WalletError::TxValidation(format!("input {input_index} signature encoding: {e}"))
        })?;
        signature.normalize_s();

        let digest = signature_hash(tx, input_index, source, sighash_type)?;
        let message = Message::from_digest(digest);
        SECP256K1
            .verify_ecdsa(&message, &signature, &public_key)
            .map_err(|e| {
                WalletError::TxValidation(format!("input {input_index} signature invalid: {e}"))
            })
    }
}

/// Verify every input of the subject against its attached source output
pub fn verify_scripts(verifier: &dyn ScriptVerifier, spv: &SpvTransaction) -> WalletResult<()> {
    if spv.tx.inputs.is_empty() {
        return Err(WalletError::TxValidation(
            "transaction has no inputs".to_string(),
        ));
    }
    for (index, input) in spv.tx.inputs.iter().enumerate() {
        let source = spv.source_output(input).ok_or_else(|| {
            WalletError::InvalidTransactionInput(format!(
                "source of input {index} ({}:{}) is not attached",
                input.source_txid, input.source_vout
            ))
        })?;
        verifier.verify_input(&spv.tx, index, source)?;
    }
    Ok(())
}
