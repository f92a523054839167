//! Scripts, push-data encoding and the two standard templates the wallet
//! works with: pay-to-public-key-hash and `OP_FALSE OP_RETURN` data carriers

use std::fmt;

use bitcoin::opcodes::all::{OP_CHECKSIG, OP_DUP, OP_EQUALVERIFY, OP_HASH160, OP_RETURN};
use bitcoin::opcodes::OP_FALSE;
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::ScriptBuf;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::errors::{WalletError, WalletResult};

/// Length of a P2PKH locking script
pub const P2PKH_SCRIPT_LEN: usize = 25;

/// One parsed element of a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptChunk {
    /// Non-push opcode
    Op(u8),
    /// Payload of a push (OP_0 pushes an empty one)
    Push(Vec<u8>),
}

impl ScriptChunk {
    pub fn is_push(&self) -> bool {
        matches!(self, ScriptChunk::Push(_))
    }
}

/// Script bytes
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Script(ScriptBuf);

impl Script {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(ScriptBuf::from_bytes(bytes))
    }

    pub fn from_hex(hex_str: &str) -> WalletResult<Self> {
        Ok(Self::new(hex::decode(hex_str)?))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_bytes()
    }

    pub fn as_script_buf(&self) -> &ScriptBuf {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `OP_DUP OP_HASH160 <hash> OP_EQUALVERIFY OP_CHECKSIG`
    pub fn p2pkh(pubkey_hash: &[u8; 20]) -> Self {
        Self(
            Builder::new()
                .push_opcode(OP_DUP)
                .push_opcode(OP_HASH160)
                .push_slice(pubkey_hash)
                .push_opcode(OP_EQUALVERIFY)
                .push_opcode(OP_CHECKSIG)
                .into_script(),
        )
    }

    /// `<signature||sighash-type> <public key>`
    pub fn p2pkh_unlock(signature_with_type: &[u8], public_key: &[u8]) -> WalletResult<Self> {
        Ok(Self(
            Builder::new()
                .push_slice(push_bytes(signature_with_type)?)
                .push_slice(push_bytes(public_key)?)
                .into_script(),
        ))
    }

    /// `OP_FALSE OP_RETURN <push>...`
    pub fn data_carrier<T: AsRef<[u8]>>(pushes: &[T]) -> WalletResult<Self> {
        let mut builder = Builder::new().push_opcode(OP_FALSE).push_opcode(OP_RETURN);
        for data in pushes {
            builder = builder.push_slice(push_bytes(data.as_ref())?);
        }
        Ok(Self(builder.into_script()))
    }

    pub fn is_p2pkh(&self) -> bool {
        self.0.is_p2pkh()
    }

    /// Public key hash of a P2PKH script
    pub fn p2pkh_pubkey_hash(&self) -> Option<[u8; 20]> {
        if !self.is_p2pkh() {
            return None;
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.as_bytes()[3..23]);
        Some(hash)
    }

    /// Starts with `OP_RETURN` or `OP_FALSE OP_RETURN`
    pub fn is_data(&self) -> bool {
        let op_false = OP_FALSE.to_u8();
        let op_return = OP_RETURN.to_u8();
        match self.as_bytes() {
            [first, ..] if *first == op_return => true,
            [first, second, ..] => *first == op_false && *second == op_return,
            _ => false,
        }
    }

    /// Payloads pushed after the leading `OP_RETURN`
    ///
    /// Any non-push opcode after the marker is refused.
    pub fn data_pushes(&self) -> WalletResult<Vec<Vec<u8>>> {
        let op_return = OP_RETURN.to_u8();
        let chunks = self.chunks()?;
        let rest = match chunks.as_slice() {
            [ScriptChunk::Op(op), rest @ ..] if *op == op_return => rest,
            [ScriptChunk::Push(empty), ScriptChunk::Op(op), rest @ ..]
                if empty.is_empty() && *op == op_return =>
            {
                rest
            }
            _ => {
                return Err(WalletError::OnlyPushDataAllowed(
                    "script does not start with OP_RETURN".to_string(),
                ))
            }
        };

        rest.iter()
            .map(|chunk| match chunk {
                ScriptChunk::Push(data) => Ok(data.clone()),
                ScriptChunk::Op(op) => Err(WalletError::OnlyPushDataAllowed(format!(
                    "opcode 0x{op:02x} found after OP_RETURN"
                ))),
            })
            .collect()
    }

    /// Split the script into opcodes and pushes
    pub fn chunks(&self) -> WalletResult<Vec<ScriptChunk>> {
        self.0
            .instructions()
            .map(|instruction| match instruction {
                Ok(Instruction::PushBytes(data)) => Ok(ScriptChunk::Push(data.as_bytes().to_vec())),
                Ok(Instruction::Op(op)) => Ok(ScriptChunk::Op(op.to_u8())),
                Err(e) => Err(WalletError::SerializationError(format!("Malformed script: {e}"))),
            })
            .collect()
    }
}

/// Payload for a single push; refused above the OP_PUSHDATA4 limit
fn push_bytes(data: &[u8]) -> WalletResult<PushBytesBuf> {
    PushBytesBuf::try_from(data.to_vec())
        .map_err(|_| WalletError::DataTooLarge(format!("push of {} bytes is too large", data.len())))
}

impl From<ScriptBuf> for Script {
    fn from(script: ScriptBuf) -> Self {
        Self(script)
    }
}

impl fmt::Debug for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Script({})", self.to_hex())
    }
}

impl fmt::Display for Script {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Script {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Script {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Script::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_carrier_matches_expected_hex() {
        let script = Script::data_carrier(&["Example", " ", "data"]).unwrap();
        assert_eq!(script.to_hex(), "006a074578616d706c6501200464617461");
        assert!(script.is_data());
    }

    #[test]
    fn test_data_pushes_round_trip() {
        let script = Script::data_carrier(&["Example", " ", "data"]).unwrap();
        let pushes = script.data_pushes().unwrap();
        assert_eq!(pushes, vec![b"Example".to_vec(), b" ".to_vec(), b"data".to_vec()]);
    }

    #[test]
    fn test_data_pushes_rejects_opcodes() {
        let script = Script::from_hex("006a01aa76").unwrap();
        let err = script.data_pushes().unwrap_err();
        assert!(matches!(err, WalletError::OnlyPushDataAllowed(_)));
    }

    #[test]
    fn test_p2pkh_template() {
        let hash = [7u8; 20];
        let script = Script::p2pkh(&hash);
        assert_eq!(script.len(), P2PKH_SCRIPT_LEN);
        assert_eq!(script.p2pkh_pubkey_hash(), Some(hash));
        assert!(!script.is_data());
    }

    #[test]
    fn test_large_push_uses_pushdata2() {
        let data = vec![1u8; 300];
        let script = Script::data_carrier(&[&data]).unwrap();
        assert_eq!(script.as_bytes()[2], 0x4d);
        assert_eq!(&script.as_bytes()[3..5], &300u16.to_le_bytes());
        assert_eq!(script.data_pushes().unwrap(), vec![data]);
    }

    #[test]
    fn test_truncated_push_is_malformed() {
        let script = Script::from_hex("006a05aabb").unwrap();
        assert!(script.chunks().is_err());
    }
}
