//! Error types for the wallet core
//!
//! Every failure surfaced by the crate is a [`WalletError`]. Each error maps to
//! an [`ErrorKind`] carrying a stable code that clients can dispatch on and the
//! HTTP status a transport layer should answer with. Wrapping an error with
//! [`WalletError::wrap`] preserves the inner error as the `source()` while the
//! outermost kind decides the code and status.

use thiserror::Error;

/// Result alias used across the crate
pub type WalletResult<T> = Result<T, WalletError>;

/// Stable, client-visible error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ValidationRequired,
    InsufficientFunds,
    UtxoSpent,
    TxValidation,
    AnnotationMismatch,
    NoOperations,
    TxBroadcast,
    InvalidTx,
    HostResponseError,
    HostNotSupportingP2P,
    HostInvalidResponse,
    MerkleRootsInvalid,
    UnknownInstructionType,
    InvalidTransactionInput,
    HostCannotSplitWhenRecipientSplitting,
    SplitsMustDivideSatoshis,
    SenderPaymailAddressNoDefault,
    SenderPaymailNotOwned,
    OnlyPushDataAllowed,
    DataTooLarge,
    UnsupportedDataType,
    MultiPaymailRecipientsNotSupported,
    InvalidCallback,
    MerklePathInvalid,
    UserNotFound,
    PaymailNotFound,
    UnsupportedTransactionFormat,
    Storage,
    Network,
    Serialization,
    Configuration,
    InvalidArgument,
    ResourceNotFound,
    Cancelled,
    Internal,
}

impl ErrorKind {
    /// Stable code a client can dispatch on
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::ValidationRequired => "error-validation-required",
            ErrorKind::InsufficientFunds => "tx-outline-not-enough-funds",
            ErrorKind::UtxoSpent => "error-utxo-spent",
            ErrorKind::TxValidation => "error-tx-validation",
            ErrorKind::AnnotationMismatch => "error-annotation-mismatch",
            ErrorKind::NoOperations => "error-no-operations",
            ErrorKind::TxBroadcast => "error-tx-broadcast",
            ErrorKind::InvalidTx => "error-invalid-tx",
            ErrorKind::HostResponseError => "error-paymail-host-response",
            ErrorKind::HostNotSupportingP2P => "error-paymail-host-not-supporting-p2p",
            ErrorKind::HostInvalidResponse => "error-paymail-host-invalid-response",
            ErrorKind::MerkleRootsInvalid => "error-merkle-roots-invalid",
            ErrorKind::UnknownInstructionType => "error-unknown-instruction-type",
            ErrorKind::InvalidTransactionInput => "error-invalid-transaction-input",
            ErrorKind::HostCannotSplitWhenRecipientSplitting => {
                "tx-spec-paymail-host-splitting-not-allowed"
            }
            ErrorKind::SplitsMustDivideSatoshis => "tx-spec-paymail-splits-indivisible",
            ErrorKind::SenderPaymailAddressNoDefault => "tx-spec-paymail-sender-no-default",
            ErrorKind::SenderPaymailNotOwned => "tx-spec-paymail-sender-not-owned",
            ErrorKind::OnlyPushDataAllowed => "error-only-push-data-allowed",
            ErrorKind::DataTooLarge => "tx-spec-op-return-data-too-large",
            ErrorKind::UnsupportedDataType => "tx-spec-op-return-unsupported-data-type",
            ErrorKind::MultiPaymailRecipientsNotSupported => "error-multi-paymail-recipients",
            ErrorKind::InvalidCallback => "error-invalid-callback",
            ErrorKind::MerklePathInvalid => "error-merkle-path-invalid",
            ErrorKind::UserNotFound => "error-user-not-found",
            ErrorKind::PaymailNotFound => "error-paymail-not-found",
            ErrorKind::UnsupportedTransactionFormat => "error-unsupported-tx-format",
            ErrorKind::Storage => "error-storage",
            ErrorKind::Network => "error-network",
            ErrorKind::Serialization => "error-serialization",
            ErrorKind::Configuration => "error-configuration",
            ErrorKind::InvalidArgument => "error-invalid-argument",
            ErrorKind::ResourceNotFound => "error-not-found",
            ErrorKind::Cancelled => "error-cancelled",
            ErrorKind::Internal => "error-internal",
        }
    }

    /// HTTP status a transport layer should answer with
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::InsufficientFunds => 422,
            ErrorKind::TxBroadcast | ErrorKind::Storage | ErrorKind::Internal => 500,
            ErrorKind::Configuration => 500,
            ErrorKind::HostResponseError
            | ErrorKind::HostNotSupportingP2P
            | ErrorKind::HostInvalidResponse => 424,
            ErrorKind::Network => 502,
            ErrorKind::UserNotFound | ErrorKind::PaymailNotFound | ErrorKind::ResourceNotFound => {
                404
            }
            ErrorKind::Cancelled => 499,
            _ => 400,
        }
    }

    /// Short default message for the kind
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::ValidationRequired => "validation required",
            ErrorKind::InsufficientFunds => "not enough funds to make the transaction",
            ErrorKind::UtxoSpent => "UTXO is already spent",
            ErrorKind::TxValidation => "transaction validation failed",
            ErrorKind::AnnotationMismatch => "annotation mismatch",
            ErrorKind::NoOperations => "no operations to record",
            ErrorKind::TxBroadcast => "failed to broadcast transaction",
            ErrorKind::InvalidTx => "transaction rejected by the broadcaster",
            ErrorKind::HostResponseError => "paymail host responded with error",
            ErrorKind::HostNotSupportingP2P => "paymail host is not supporting P2P capabilities",
            ErrorKind::HostInvalidResponse => "paymail host invalid response",
            ErrorKind::MerkleRootsInvalid => "merkle roots are invalid",
            ErrorKind::UnknownInstructionType => "unknown custom instruction type",
            ErrorKind::InvalidTransactionInput => "invalid transaction input",
            ErrorKind::HostCannotSplitWhenRecipientSplitting => {
                "cannot split outputs when the paymail host already splits them"
            }
            ErrorKind::SplitsMustDivideSatoshis => "satoshis must be divisible by splits",
            ErrorKind::SenderPaymailAddressNoDefault => "user has no default paymail address",
            ErrorKind::SenderPaymailNotOwned => "sender paymail does not belong to the user",
            ErrorKind::OnlyPushDataAllowed => "only push data is allowed after OP_RETURN",
            ErrorKind::DataTooLarge => "data is too large",
            ErrorKind::UnsupportedDataType => "unsupported data type",
            ErrorKind::MultiPaymailRecipientsNotSupported => {
                "multiple paymail recipients are not supported"
            }
            ErrorKind::InvalidCallback => "invalid transaction callback",
            ErrorKind::MerklePathInvalid => "invalid merkle path",
            ErrorKind::UserNotFound => "user not found",
            ErrorKind::PaymailNotFound => "paymail not found",
            ErrorKind::UnsupportedTransactionFormat => "unsupported transaction format",
            ErrorKind::Storage => "storage error",
            ErrorKind::Network => "network error",
            ErrorKind::Serialization => "serialization error",
            ErrorKind::Configuration => "configuration error",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::ResourceNotFound => "resource not found",
            ErrorKind::Cancelled => "operation cancelled",
            ErrorKind::Internal => "internal error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum WalletError {
    // === Outline and selection ===
    #[error("Validation required: {0}")]
    ValidationRequired(String),

    #[error("Insufficient funds: {0}")]
    InsufficientFunds(String),

    #[error("Cannot split when recipient is splitting: {0}")]
    HostCannotSplitWhenRecipientSplitting(String),

    #[error("Splits must divide satoshis: {0}")]
    SplitsMustDivideSatoshis(String),

    #[error("Sender paymail has no default: {0}")]
    SenderPaymailAddressNoDefault(String),

    #[error("Sender paymail not owned by user: {0}")]
    SenderPaymailNotOwned(String),

    #[error("Data too large: {0}")]
    DataTooLarge(String),

    #[error("Unsupported data type: {0}")]
    UnsupportedDataType(String),

    // === Recording ===
    #[error("UTXO spent: {0}")]
    UtxoSpent(String),

    #[error("Transaction validation failed: {0}")]
    TxValidation(String),

    #[error("Annotation mismatch: {0}")]
    AnnotationMismatch(String),

    #[error("No operations: {0}")]
    NoOperations(String),

    #[error("Broadcast failed: {0}")]
    TxBroadcast(String),

    #[error("Transaction rejected: {0}")]
    InvalidTx(String),

    #[error("Only push data allowed: {0}")]
    OnlyPushDataAllowed(String),

    #[error("Multiple paymail recipients not supported: {0}")]
    MultiPaymailRecipientsNotSupported(String),

    #[error("Invalid transaction input: {0}")]
    InvalidTransactionInput(String),

    #[error("Unsupported transaction format: {0}")]
    UnsupportedTransactionFormat(String),

    // === Paymail hosts ===
    #[error("Paymail host response error: {0}")]
    HostResponseError(String),

    #[error("Paymail host does not support P2P: {0}")]
    HostNotSupportingP2P(String),

    #[error("Paymail host invalid response: {0}")]
    HostInvalidResponse(String),

    // === Chain data ===
    #[error("Merkle roots invalid: {0}")]
    MerkleRootsInvalid(String),

    #[error("Invalid merkle path: {0}")]
    MerklePathInvalid(String),

    #[error("Invalid callback: {0}")]
    InvalidCallback(String),

    // === Key derivation ===
    #[error("Unknown instruction type: {0}")]
    UnknownInstructionType(String),

    // === Lookups ===
    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Paymail not found: {0}")]
    PaymailNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    // === Infrastructure ===
    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),

    /// An error wrapped with an outer kind and message
    #[error("{message}: {source}")]
    Wrapped {
        kind: ErrorKind,
        message: String,
        #[source]
        source: Box<WalletError>,
    },
}

impl WalletError {
    /// Wrap this error under an outer kind; the outer kind decides code and status
    pub fn wrap(self, kind: ErrorKind, message: impl Into<String>) -> Self {
        WalletError::Wrapped {
            kind,
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Kind of the outermost error
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::ValidationRequired(_) => ErrorKind::ValidationRequired,
            WalletError::InsufficientFunds(_) => ErrorKind::InsufficientFunds,
            WalletError::HostCannotSplitWhenRecipientSplitting(_) => {
                ErrorKind::HostCannotSplitWhenRecipientSplitting
            }
            WalletError::SplitsMustDivideSatoshis(_) => ErrorKind::SplitsMustDivideSatoshis,
            WalletError::SenderPaymailAddressNoDefault(_) => {
                ErrorKind::SenderPaymailAddressNoDefault
            }
            WalletError::SenderPaymailNotOwned(_) => ErrorKind::SenderPaymailNotOwned,
            WalletError::DataTooLarge(_) => ErrorKind::DataTooLarge,
            WalletError::UnsupportedDataType(_) => ErrorKind::UnsupportedDataType,
            WalletError::UtxoSpent(_) => ErrorKind::UtxoSpent,
            WalletError::TxValidation(_) => ErrorKind::TxValidation,
            WalletError::AnnotationMismatch(_) => ErrorKind::AnnotationMismatch,
            WalletError::NoOperations(_) => ErrorKind::NoOperations,
            WalletError::TxBroadcast(_) => ErrorKind::TxBroadcast,
            WalletError::InvalidTx(_) => ErrorKind::InvalidTx,
            WalletError::OnlyPushDataAllowed(_) => ErrorKind::OnlyPushDataAllowed,
            WalletError::MultiPaymailRecipientsNotSupported(_) => {
                ErrorKind::MultiPaymailRecipientsNotSupported
            }
            WalletError::InvalidTransactionInput(_) => ErrorKind::InvalidTransactionInput,
            WalletError::UnsupportedTransactionFormat(_) => {
                ErrorKind::UnsupportedTransactionFormat
            }
            WalletError::HostResponseError(_) => ErrorKind::HostResponseError,
            WalletError::HostNotSupportingP2P(_) => ErrorKind::HostNotSupportingP2P,
            WalletError::HostInvalidResponse(_) => ErrorKind::HostInvalidResponse,
            WalletError::MerkleRootsInvalid(_) => ErrorKind::MerkleRootsInvalid,
            WalletError::MerklePathInvalid(_) => ErrorKind::MerklePathInvalid,
            WalletError::InvalidCallback(_) => ErrorKind::InvalidCallback,
            WalletError::UnknownInstructionType(_) => ErrorKind::UnknownInstructionType,
            WalletError::UserNotFound(_) => ErrorKind::UserNotFound,
            WalletError::PaymailNotFound(_) => ErrorKind::PaymailNotFound,
            WalletError::ResourceNotFound(_) => ErrorKind::ResourceNotFound,
            WalletError::StorageError(_) => ErrorKind::Storage,
            WalletError::NetworkError(_) => ErrorKind::Network,
            WalletError::SerializationError(_) => ErrorKind::Serialization,
            WalletError::ConfigurationError(_) => ErrorKind::Configuration,
            WalletError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            WalletError::Cancelled => ErrorKind::Cancelled,
            WalletError::InternalError(_) => ErrorKind::Internal,
            WalletError::Wrapped { kind, .. } => *kind,
        }
    }

    /// Stable code of the outermost error
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// HTTP status of the outermost error
    pub fn http_status(&self) -> u16 {
        self.kind().http_status()
    }

    /// True when this error or any error it wraps has the given kind
    pub fn is(&self, kind: ErrorKind) -> bool {
        let mut current = self;
        loop {
            if current.kind() == kind {
                return true;
            }
            match current {
                WalletError::Wrapped { source, .. } => current = source,
                _ => return false,
            }
        }
    }

    /// Innermost error of a wrapping chain
    pub fn root_cause(&self) -> &WalletError {
        let mut current = self;
        while let WalletError::Wrapped { source, .. } = current {
            current = source;
        }
        current
    }
}

impl From<hex::FromHexError> for WalletError {
    fn from(err: hex::FromHexError) -> Self {
        WalletError::SerializationError(format!("Invalid hex: {err}"))
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(err: serde_json::Error) -> Self {
        WalletError::SerializationError(format!("Invalid JSON: {err}"))
    }
}

impl From<secp256k1::Error> for WalletError {
    fn from(err: secp256k1::Error) -> Self {
        WalletError::InvalidArgument(format!("Invalid key material: {err}"))
    }
}
