//! Public key derivation
//!
//! The wallet never holds private keys. Everything here works on public keys:
//! type42 child derivation and the custom-instruction pipeline that turns a
//! user's public key into the address or locking script of a given output.

pub mod custom_instructions;
pub mod type42;

pub use custom_instructions::*;
pub use type42::*;

use secp256k1::PublicKey;

use crate::errors::{WalletError, WalletResult};

/// Parse a compressed or uncompressed public key from hex
pub fn public_key_from_hex(hex_str: &str) -> WalletResult<PublicKey> {
    let bytes = hex::decode(hex_str.trim())
        .map_err(|e| WalletError::InvalidArgument(format!("Invalid public key hex: {e}")))?;
    PublicKey::from_slice(&bytes)
        .map_err(|e| WalletError::InvalidArgument(format!("Invalid public key: {e}")))
}
