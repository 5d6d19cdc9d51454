//! Tuyul Tools Library
//!
//! Manages a pool of Solana wallets: key generation, mnemonic conversion,
//! SOL and SPL token distribution and sweeping, and balance checks.

pub mod checker;
pub mod cli;
pub mod config;
pub mod error;
pub mod ledger;
pub mod transfer;
pub mod wallet;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use ledger::{Ledger, LedgerError, RpcLedger};
pub use transfer::{BatchRunner, BatchSettings, BatchSummary};
pub use wallet::WalletRecord;
