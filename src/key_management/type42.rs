//! Type42 (BRC-42 "anyone") public key derivation
//!
//! `child = parent + HMAC-SHA256(key = parent_compressed, msg = invoice) * G`.
//! The holder of the parent private key derives the matching child private
//! key by adding the same tweak.

use rand::RngCore;
use ring::hmac;
use secp256k1::{PublicKey, Scalar, SECP256K1};

use crate::errors::{WalletError, WalletResult};

/// Derivation string prefix used for freshly allocated destinations
pub const DESTINATION_PREFIX: &str = "1-destination-";

/// Derivation string prefix of a paymail's PKI key
pub const PAYMAIL_PKI_PREFIX: &str = "1-paymail_pki-";

/// Tweak added to the parent key for `invoice`
pub fn invoice_tweak(parent: &PublicKey, invoice: &str) -> WalletResult<Scalar> {
    if invoice.is_empty() {
        return Err(WalletError::InvalidArgument(
            "invalid invoice number: empty".to_string(),
        ));
    }
    let key = hmac::Key::new(hmac::HMAC_SHA256, &parent.serialize());
    let tag = hmac::sign(&key, invoice.as_bytes());
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(tag.as_ref());
    Scalar::from_be_bytes(bytes).map_err(|_| {
        WalletError::InternalError("type42 tweak is not a valid scalar".to_string())
    })
}

/// Child public key for `invoice`
pub fn derive_child(parent: &PublicKey, invoice: &str) -> WalletResult<PublicKey> {
    let tweak = invoice_tweak(parent, invoice)?;
    parent
        .add_exp_tweak(SECP256K1, &tweak)
        .map_err(|e| WalletError::InternalError(format!("type42 derivation failed: {e}")))
}

/// Random reference for a new destination
pub fn random_reference() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Derivation string of a destination identified by `reference`
pub fn destination_invoice(reference: &str) -> String {
    format!("{DESTINATION_PREFIX}{reference}")
}

/// Derivation string of the PKI key for `alias@domain`
pub fn paymail_pki_invoice(alias: &str, domain: &str) -> String {
    format!("{PAYMAIL_PKI_PREFIX}{alias}@{domain}_0")
}
