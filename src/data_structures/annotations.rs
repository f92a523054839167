//! Metadata returned alongside an outline
//!
//! Annotations describe how each input and output of an unsigned transaction
//! was derived. They are advisory: the recorder re-derives everything it
//! trusts from the signed transaction.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data_structures::{Bucket, Outpoint};
use crate::key_management::CustomInstructions;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymailAnnotation {
    pub sender: String,
    pub receiver: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAnnotation {
    pub outpoint: Outpoint,
    pub satoshis: u64,
    pub custom_instructions: CustomInstructions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OutputAnnotation {
    pub bucket: Bucket,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub paymail: Option<PaymailAnnotation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<CustomInstructions>,
}

impl OutputAnnotation {
    pub fn data() -> Self {
        Self {
            bucket: Bucket::Data,
            ..Self::default()
        }
    }

    pub fn paymail(paymail: PaymailAnnotation) -> Self {
        Self {
            bucket: Bucket::Bsv,
            paymail: Some(paymail),
            custom_instructions: None,
        }
    }

    /// Output the user can later spend with keys derived by `instructions`
    pub fn change(instructions: CustomInstructions) -> Self {
        Self {
            bucket: Bucket::Bsv,
            paymail: None,
            custom_instructions: Some(instructions),
        }
    }
}

/// Annotations keyed by input/output index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Annotations {
    #[serde(default)]
    pub inputs: BTreeMap<u32, InputAnnotation>,
    #[serde(default)]
    pub outputs: BTreeMap<u32, OutputAnnotation>,
}

impl Annotations {
    /// Paymail annotations of all outputs, with their indexes
    pub fn paymail_outputs(&self) -> impl Iterator<Item = (u32, &PaymailAnnotation)> {
        self.outputs
            .iter()
            .filter_map(|(vout, a)| a.paymail.as_ref().map(|p| (*vout, p)))
    }

    pub fn is_data_output(&self, vout: u32) -> bool {
        self.outputs
            .get(&vout)
            .is_some_and(|a| a.bucket == Bucket::Data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key_management::CustomInstruction;

    #[test]
    fn test_json_is_camel_case() {
        let mut annotations = Annotations::default();
        annotations.outputs.insert(
            0,
            OutputAnnotation::change(CustomInstructions::new(vec![CustomInstruction::type42(
                "1-destination-abc",
            )])),
        );
        annotations.outputs.insert(1, OutputAnnotation::data());

        let json = serde_json::to_value(&annotations).unwrap();
        assert_eq!(json["outputs"]["0"]["bucket"], "bsv");
        assert_eq!(
            json["outputs"]["0"]["customInstructions"][0]["instruction"],
            "1-destination-abc"
        );
        assert!(json["outputs"]["1"].get("paymail").is_none());

        let back: Annotations = serde_json::from_value(json).unwrap();
        assert_eq!(back, annotations);
        assert!(back.is_data_output(1));
    }
}
