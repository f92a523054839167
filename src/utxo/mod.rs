//! UTXO selection

pub mod input_selector;

pub use input_selector::InputSelector;
