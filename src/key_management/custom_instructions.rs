//! Custom-instruction pipeline
//!
//! A list of `{type, instruction}` pairs applied left to right to a running
//! public key. `type42` replaces the key with a derived child; `sign` is
//! terminal and turns the key into an address or locking script. When the list
//! does not end with `sign`, an implicit `sign` with the `P2PKH` variant runs.

use std::fmt;

use secp256k1::PublicKey;
use serde::{Deserialize, Serialize};

use crate::bsv::address::Address;
use crate::bsv::script::Script;
use crate::errors::{WalletError, WalletResult};
use crate::key_management::type42;

pub const TYPE42: &str = "type42";
pub const SIGN: &str = "sign";
pub const P2PKH: &str = "P2PKH";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomInstruction {
    #[serde(rename = "type")]
    pub instruction_type: String,
    pub instruction: String,
}

impl CustomInstruction {
    pub fn type42(derivation: impl Into<String>) -> Self {
        Self {
            instruction_type: TYPE42.to_string(),
            instruction: derivation.into(),
        }
    }

    pub fn sign_p2pkh() -> Self {
        Self {
            instruction_type: SIGN.to_string(),
            instruction: P2PKH.to_string(),
        }
    }
}

/// Ordered list of instructions, serialised as a JSON array
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomInstructions(pub Vec<CustomInstruction>);

impl CustomInstructions {
    pub fn new(instructions: Vec<CustomInstruction>) -> Self {
        Self(instructions)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CustomInstruction> {
        self.0.iter()
    }

    pub fn to_json(&self) -> WalletResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> WalletResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

impl fmt::Display for CustomInstructions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|i| format!("{}:{}", i.instruction_type, i.instruction))
            .collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

/// Outcome of one interpreter step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Stop,
}

/// Receives the instructions of a pipeline one at a time
pub trait InstructionResolver {
    fn type42(&mut self, instruction: &str) -> WalletResult<Step>;
    fn sign(&mut self, instruction: &str) -> WalletResult<Step>;
}

type StepFn<R> = fn(&mut R, &str) -> WalletResult<Step>;

fn step_for<R: InstructionResolver>(instruction_type: &str) -> Option<StepFn<R>> {
    match instruction_type {
        TYPE42 => Some(R::type42),
        SIGN => Some(R::sign),
        _ => None,
    }
}

/// Run `instructions` against `resolver`, appending an implicit `sign P2PKH`
/// when no step stopped the pipeline
pub fn interpret<R: InstructionResolver>(
    resolver: &mut R,
    instructions: &CustomInstructions,
) -> WalletResult<()> {
    for instruction in instructions.iter() {
        let step = step_for::<R>(&instruction.instruction_type).ok_or_else(|| {
            WalletError::UnknownInstructionType(instruction.instruction_type.clone())
        })?;
        if step(resolver, &instruction.instruction)? == Step::Stop {
            return Ok(());
        }
    }
    resolver.sign(P2PKH)?;
    Ok(())
}

fn ensure_p2pkh(instruction: &str) -> WalletResult<()> {
    if instruction == P2PKH {
        Ok(())
    } else {
        Err(WalletError::UnknownInstructionType(format!(
            "{SIGN} variant {instruction}"
        )))
    }
}

/// Resolves instructions to an address
#[derive(Debug)]
pub struct AddressResolver {
    key: PublicKey,
    address: Option<Address>,
}

impl AddressResolver {
    pub fn new(key: PublicKey) -> Self {
        Self { key, address: None }
    }
}

impl InstructionResolver for AddressResolver {
    fn type42(&mut self, instruction: &str) -> WalletResult<Step> {
        self.key = type42::derive_child(&self.key, instruction)?;
        Ok(Step::Continue)
    }

    fn sign(&mut self, instruction: &str) -> WalletResult<Step> {
        ensure_p2pkh(instruction)?;
        self.address = Some(Address::from_public_key(&self.key));
        Ok(Step::Stop)
    }
}

/// Resolves instructions to a locking script
#[derive(Debug)]
pub struct LockingScriptResolver {
    key: PublicKey,
    script: Option<Script>,
}

impl LockingScriptResolver {
    pub fn new(key: PublicKey) -> Self {
        Self { key, script: None }
    }
}

impl InstructionResolver for LockingScriptResolver {
    fn type42(&mut self, instruction: &str) -> WalletResult<Step> {
        self.key = type42::derive_child(&self.key, instruction)?;
        Ok(Step::Continue)
    }

    fn sign(&mut self, instruction: &str) -> WalletResult<Step> {
        ensure_p2pkh(instruction)?;
        self.script = Some(Address::from_public_key(&self.key).locking_script());
        Ok(Step::Stop)
    }
}

pub fn derive_address(
    public_key: &PublicKey,
    instructions: &CustomInstructions,
) -> WalletResult<Address> {
    let mut resolver = AddressResolver::new(*public_key);
    interpret(&mut resolver, instructions)?;
    resolver
        .address
        .ok_or_else(|| WalletError::InternalError("instructions produced no address".to_string()))
}

pub fn derive_locking_script(
    public_key: &PublicKey,
    instructions: &CustomInstructions,
) -> WalletResult<Script> {
    let mut resolver = LockingScriptResolver::new(*public_key);
    interpret(&mut resolver, instructions)?;
    resolver.script.ok_or_else(|| {
        WalletError::InternalError("instructions produced no locking script".to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use secp256k1::{SecretKey, SECP256K1};

    fn key() -> PublicKey {
        PublicKey::from_secret_key(SECP256K1, &SecretKey::from_slice(&[0x07; 32]).unwrap())
    }

    #[test]
    fn test_empty_instructions_give_key_address() {
        let address = derive_address(&key(), &CustomInstructions::default()).unwrap();
        assert_eq!(address, Address::from_public_key(&key()));
    }

    #[test]
    fn test_chain_matches_manual_derivation() {
        let instructions = CustomInstructions::new(vec![
            CustomInstruction::type42("1-paymail_pki-alice@example.com_0"),
            CustomInstruction::type42("1-destination-ref"),
        ]);
        let first = type42::derive_child(&key(), "1-paymail_pki-alice@example.com_0").unwrap();
        let second = type42::derive_child(&first, "1-destination-ref").unwrap();

        let address = derive_address(&key(), &instructions).unwrap();
        assert_eq!(address, Address::from_public_key(&second));
        let script = derive_locking_script(&key(), &instructions).unwrap();
        assert_eq!(script, address.locking_script());
    }

    #[test]
    fn test_explicit_sign_stops_pipeline() {
        let instructions = CustomInstructions::new(vec![
            CustomInstruction::sign_p2pkh(),
            CustomInstruction::type42("ignored"),
        ]);
        let address = derive_address(&key(), &instructions).unwrap();
        assert_eq!(address, Address::from_public_key(&key()));
    }

    #[test]
    fn test_unknown_type_fails() {
        let instructions = CustomInstructions::new(vec![CustomInstruction {
            instruction_type: "bip32".to_string(),
            instruction: "m/0".to_string(),
        }]);
        let err = derive_address(&key(), &instructions).unwrap_err();
        assert!(matches!(err, WalletError::UnknownInstructionType(_)));
    }

    #[test]
    fn test_json_shape() {
        let instructions = CustomInstructions::new(vec![CustomInstruction::type42("x")]);
        let json = instructions.to_json().unwrap();
        assert_eq!(json, r#"[{"type":"type42","instruction":"x"}]"#);
        assert_eq!(CustomInstructions::from_json(&json).unwrap(), instructions);
    }
}
