//! Fee rates and transaction size estimation

pub mod provider;

pub use provider::*;

use serde::{Deserialize, Serialize};

use crate::bsv::encoding::varint_size;
use crate::bsv::transaction::{TxOutput, ENVELOPE_SIZE};
use crate::errors::{WalletError, WalletResult};

/// Estimated size of a signed P2PKH input
pub const ESTIMATED_P2PKH_INPUT_SIZE: u64 = 148;

/// Size of a P2PKH change output
pub const ESTIMATED_CHANGE_OUTPUT_SIZE: u64 = 34;

/// Fee rate: `satoshis` per `bytes`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeUnit {
    pub satoshis: u64,
    pub bytes: u64,
}

impl FeeUnit {
    pub fn new(satoshis: u64, bytes: u64) -> Self {
        Self { satoshis, bytes }
    }

    pub fn validate(&self) -> WalletResult<()> {
        if self.bytes == 0 {
            return Err(WalletError::ConfigurationError(
                "fee unit bytes must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// `ceil(size / bytes) * satoshis`
    pub fn fee_for_size(&self, size: u64) -> u64 {
        if self.bytes == 0 {
            return 0;
        }
        size.div_ceil(self.bytes) * self.satoshis
    }
}

impl Default for FeeUnit {
    fn default() -> Self {
        Self::new(1, 1000)
    }
}

/// Size of a transaction with inputs of the given estimated sizes and `outputs`
pub fn estimate_tx_size(input_sizes: &[u64], outputs: &[TxOutput]) -> u64 {
    let inputs: u64 = input_sizes.iter().sum();
    let outputs_size: u64 = outputs.iter().map(|o| o.size() as u64).sum();
    ENVELOPE_SIZE as u64
        + varint_size(input_sizes.len() as u64) as u64
        + inputs
        + varint_size(outputs.len() as u64) as u64
        + outputs_size
}

/// Size of the transaction before inputs are added, as the selector expects it
pub fn tx_bytes_without_inputs(outputs: &[TxOutput]) -> u64 {
    estimate_tx_size(&[], outputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsv::script::Script;

    fn p2pkh_output(sats: u64) -> TxOutput {
        TxOutput::new(sats, Script::p2pkh(&[0u8; 20]))
    }

    #[test]
    fn test_fee_rounds_up() {
        let unit = FeeUnit::new(1, 1000);
        assert_eq!(unit.fee_for_size(1), 1);
        assert_eq!(unit.fee_for_size(999), 1);
        assert_eq!(unit.fee_for_size(1000), 1);
        assert_eq!(unit.fee_for_size(1001), 2);
        assert_eq!(FeeUnit::new(5, 100).fee_for_size(250), 15);
    }

    #[test]
    fn test_size_of_one_in_one_out() {
        let size = estimate_tx_size(&[ESTIMATED_P2PKH_INPUT_SIZE], &[p2pkh_output(1)]);
        assert_eq!(size, 8 + 1 + 148 + 1 + 34);
    }

    #[test]
    fn test_adding_output_never_decreases_fee() {
        let unit = FeeUnit::new(1, 10);
        let mut outputs = vec![p2pkh_output(1)];
        let mut last = unit.fee_for_size(estimate_tx_size(&[148], &outputs));
        for _ in 0..300 {
            outputs.push(p2pkh_output(1));
            let fee = unit.fee_for_size(estimate_tx_size(&[148], &outputs));
            assert!(fee >= last);
            last = fee;
        }
    }

    #[test]
    fn test_removing_input_never_increases_size() {
        let outputs = vec![p2pkh_output(1)];
        let mut inputs = vec![148u64; 300];
        let mut last = estimate_tx_size(&inputs, &outputs);
        while inputs.pop().is_some() {
            let size = estimate_tx_size(&inputs, &outputs);
            assert!(size <= last);
            last = size;
        }
    }

    #[test]
    fn test_zero_bytes_unit_is_invalid() {
        assert!(FeeUnit::new(1, 0).validate().is_err());
    }
}
