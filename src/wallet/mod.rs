//! Wallet key material
//!
//! - [`types`]: the parsed `address:secret` record
//! - [`store`]: flat wallet files
//! - [`keygen`]: fresh keypairs
//! - [`mnemonic`]: BIP39 phrase conversion

pub mod keygen;
pub mod mnemonic;
pub mod store;
pub mod types;

pub use mnemonic::{ConversionSummary, MnemonicConverter};
pub use types::{short_address, WalletRecord};
