//! Error types for the wallet toolkit

use thiserror::Error;

use crate::ledger::LedgerError;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the wallet toolkit
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    // Key material errors
    #[error("Invalid keypair: {0}")]
    InvalidKeypair(String),

    #[error("Address mismatch: file says {address}, secret key derives {derived}")]
    AddressMismatch { address: String, derived: String },

    #[error("Invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    #[error("Wallet file not found: {0}")]
    WalletFileNotFound(String),

    #[error("No usable wallets in {0}")]
    EmptyWalletPool(String),

    /// Setup failure that aborts a batch before any entry is attempted
    #[error("Cannot start batch: {0}")]
    FatalSetup(String),

    // Ledger errors
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Transaction build failed: {0}")]
    TransactionBuild(String),

    #[error("Insufficient balance: {available} available, {required} required")]
    InsufficientBalance { available: f64, required: f64 },

    // Token list errors
    #[error("Token list unavailable: {0}")]
    TokenList(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Check if this error should abort a whole batch
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::FatalSetup(_) | Error::Config(_) | Error::EmptyWalletPool(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from reqwest errors (token list download)
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::TokenList(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ledger_errors_pass_through() {
        let err: Error = LedgerError::RateLimited("429 Too Many Requests".into()).into();
        assert!(matches!(err, Error::Ledger(LedgerError::RateLimited(_))));
        assert_eq!(err.to_string(), "Rate limited: 429 Too Many Requests");
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(Error::FatalSetup("main wallet missing".into()).is_fatal());
        assert!(!Error::InvalidAmount("-1".into()).is_fatal());
    }
}
