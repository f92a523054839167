//! Core of a non-custodial BSV wallet backend
//!
//! The wallet never holds private keys. It prepares unsigned transaction
//! outlines for its users, records the transactions they sign, tracks UTXOs
//! and per-user operations, and keeps transaction state in sync with the
//! broadcaster's callbacks.
//!
//! ## Features
//!
//! - `storage` (default): SQLite repositories via `rusqlite` and `tokio-rusqlite`
//! - `http` (default): HTTP clients for ARC, the block-header service and paymail hosts
//! - `cli`: the `spv-wallet-core` binary
//!
//! Services only depend on the repository and client traits, so everything
//! except the concrete backends compiles without optional features.

pub mod ancestors;
pub mod bsv;
pub mod cancellation;
pub mod chain;
pub mod config;
pub mod data_structures;
pub mod errors;
pub mod fee;
pub mod key_management;
pub mod mocks;
pub mod outlines;
pub mod paymail;
pub mod record;
pub mod storage;
pub mod txsync;
pub mod users;
pub mod utxo;

pub use ancestors::AncestorResolver;
pub use cancellation::{CancellationToken, TokioCancellationToken};
pub use config::WalletConfig;
pub use errors::{ErrorKind, WalletError, WalletResult};
pub use outlines::{Outline, OutlinesService, OutputSpec, TransactionSpec};
pub use record::{RecordService, RecordedTransaction, SignedOutline};
pub use storage::Repositories;
pub use txsync::CallbackSyncService;
pub use users::UsersService;
pub use utxo::InputSelector;

#[cfg(feature = "storage")]
pub use storage::SqliteStorage;
