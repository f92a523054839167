use serde::{Deserialize, Serialize};

use crate::{
    bsv::{script::Script, transaction::TxOutput},
    data_structures::OutputAnnotation,
    errors::{WalletError, WalletResult},
    outlines::output_spec::AnnotatedOutput,
};

pub const DATA_TYPE_STRINGS: &str = "strings";
pub const DATA_TYPE_HEXES: &str = "hexes";

fn default_data_type() -> String {
    DATA_TYPE_STRINGS.to_string()
}

/// Unspendable `OP_FALSE OP_RETURN` output with one push per element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataCarrierSpec {
    #[serde(default = "default_data_type")]
    pub data_type: String,
    pub data: Vec<String>,
}

impl DataCarrierSpec {
    pub fn strings<S: Into<String>>(data: impl IntoIterator<Item = S>) -> Self {
        Self {
            data_type: DATA_TYPE_STRINGS.to_string(),
            data: data.into_iter().map(Into::into).collect(),
        }
    }

    pub fn hexes<S: Into<String>>(data: impl IntoIterator<Item = S>) -> Self {
        Self {
            data_type: DATA_TYPE_HEXES.to_string(),
            data: data.into_iter().map(Into::into).collect(),
        }
    }

    pub(crate) fn evaluate(&self) -> WalletResult<Vec<AnnotatedOutput>> {
        if self.data.is_empty() {
            return Err(WalletError::ValidationRequired(
                "data output requires at least one element".to_string(),
            ));
        }

        let pushes: Vec<Vec<u8>> = match self.data_type.as_str() {
            DATA_TYPE_STRINGS => self.data.iter().map(|s| s.as_bytes().to_vec()).collect(),
            DATA_TYPE_HEXES => self
                .data
                .iter()
                .map(|h| {
                    hex::decode(h).map_err(|e| {
                        WalletError::ValidationRequired(format!("invalid hex data {h}: {e}"))
                    })
                })
                .collect::<WalletResult<_>>()?,
            other => return Err(WalletError::UnsupportedDataType(other.to_string())),
        };

        let script = Script::data_carrier(&pushes)?;
        Ok(vec![AnnotatedOutput::new(
            TxOutput::new(0, script),
            OutputAnnotation::data(),
        )])
    }
}
