//! BSV transaction primitives
//!
//! Hashing, script templates, addresses, the consensus transaction codec,
//! BRC-74 merkle paths, BEEF (BRC-62) envelopes, the Extended Format used for
//! broadcasting and P2PKH script verification.

pub mod address;
pub mod beef;
pub mod encoding;
pub mod hash;
pub mod merkle_path;
pub mod script;
pub mod sighash;
pub mod spv;
pub mod transaction;
pub mod verify;

pub use address::*;
pub use beef::*;
pub use hash::*;
pub use merkle_path::*;
pub use script::*;
pub use spv::*;
pub use transaction::*;
pub use verify::*;
