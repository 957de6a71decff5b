//! Error types for Monochain

use num_bigint::BigUint;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Nonce mismatch: expected {expected}, got {got}")]
    NonceMismatch { expected: u64, got: u64 },
    #[error("Insufficient balance: has {balance}, needs {required}")]
    InsufficientBalance { balance: BigUint, required: BigUint },
    #[error("Self transfer is not allowed ({0})")]
    SelfTransfer(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Data directory already in use: {0}")]
    LockContention(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Invalid block: {0}")]
    InvalidBlock(String),
    #[error("Network error: {0}")]
    Network(String),
    #[error("Cryptographic error: {0}")]
    Crypto(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl LedgerError {
    /// True for the kinds the verifier produces when it drops a transaction.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            LedgerError::InvalidSignature(_)
                | LedgerError::NonceMismatch { .. }
                | LedgerError::InsufficientBalance { .. }
                | LedgerError::SelfTransfer(_)
        )
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(err: std::io::Error) -> Self {
        LedgerError::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        LedgerError::Storage(err.to_string())
    }
}

impl From<Box<bincode::ErrorKind>> for LedgerError {
    fn from(err: Box<bincode::ErrorKind>) -> Self {
        LedgerError::Storage(format!("codec: {}", err))
    }
}

/// Convenience alias used across the crate
pub type Result<T> = std::result::Result<T, LedgerError>;
