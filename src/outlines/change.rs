//! Fee and change of an outline

use tracing::debug;

use crate::{
    bsv::{script::Script, transaction::TxOutput},
    errors::{WalletError, WalletResult},
    fee::{estimate_tx_size, FeeUnit},
};

/// How the difference between inputs and outputs is spent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangePlan {
    /// Everything above the outputs goes to the miner
    NoChange { fee: u64 },
    Change { satoshis: u64, fee: u64 },
}

impl ChangePlan {
    pub fn fee(&self) -> u64 {
        match self {
            ChangePlan::NoChange { fee } | ChangePlan::Change { fee, .. } => *fee,
        }
    }
}

/// Decide the change output for inputs worth `satoshis_in`
///
/// A change output whose extra fee would eat the whole change is dropped and
/// its value goes to the fee instead.
pub fn plan_change(
    input_sizes: &[u64],
    satoshis_in: u64,
    outputs: &[TxOutput],
    fee_unit: FeeUnit,
) -> WalletResult<ChangePlan> {
    let satoshis_out: u64 = outputs.iter().map(|o| o.satoshis).sum();
    let fee_no_change = fee_unit.fee_for_size(estimate_tx_size(input_sizes, outputs));

    if satoshis_in < satoshis_out + fee_no_change {
        return Err(WalletError::InsufficientFunds(format!(
            "inputs of {satoshis_in} satoshis cannot cover {satoshis_out} plus fee {fee_no_change}"
        )));
    }

    let change = satoshis_in - satoshis_out - fee_no_change;
    if change == 0 {
        return Ok(ChangePlan::NoChange { fee: fee_no_change });
    }

    let mut with_change = outputs.to_vec();
    with_change.push(TxOutput::new(change, Script::p2pkh(&[0u8; 20])));
    let fee_with_change = fee_unit.fee_for_size(estimate_tx_size(input_sizes, &with_change));
    let delta = fee_with_change - fee_no_change;

    if delta >= change {
        debug!(change, delta, "Change output dropped, its value goes to the fee");
        return Ok(ChangePlan::NoChange {
            fee: fee_no_change + change,
        });
    }
    Ok(ChangePlan::Change {
        satoshis: change - delta,
        fee: fee_with_change,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;
    use crate::fee::ESTIMATED_P2PKH_INPUT_SIZE;

    fn p2pkh(sats: u64) -> TxOutput {
        TxOutput::new(sats, Script::p2pkh(&[1u8; 20]))
    }

    #[test]
    fn test_small_payment_keeps_change() {
        let plan = plan_change(
            &[ESTIMATED_P2PKH_INPUT_SIZE],
            10,
            &[p2pkh(1)],
            FeeUnit::new(1, 1000),
        )
        .unwrap();
        assert_eq!(plan, ChangePlan::Change { satoshis: 8, fee: 1 });
    }

    #[test]
    fn test_exact_amount_has_no_change() {
        let plan = plan_change(
            &[ESTIMATED_P2PKH_INPUT_SIZE],
            2,
            &[p2pkh(1)],
            FeeUnit::new(1, 1000),
        )
        .unwrap();
        assert_eq!(plan, ChangePlan::NoChange { fee: 1 });
    }

    #[test]
    fn test_dust_change_goes_to_fee() {
        // 192 bytes without change, 226 with it: one extra satoshi at 1 sat/200 bytes
        let unit = FeeUnit::new(1, 200);
        let plan = plan_change(&[ESTIMATED_P2PKH_INPUT_SIZE], 3, &[p2pkh(1)], unit).unwrap();
        assert_eq!(plan, ChangePlan::NoChange { fee: 2 });
    }

    #[test]
    fn test_not_enough_inputs() {
        let err = plan_change(
            &[ESTIMATED_P2PKH_INPUT_SIZE],
            1,
            &[p2pkh(1)],
            FeeUnit::new(1, 1000),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InsufficientFunds);
    }
}
