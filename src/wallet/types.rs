//! Core wallet types
//!
//! A [`WalletRecord`] is one `address:secret` line from a wallet file, parsed
//! and checked.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Keypair;
use solana_sdk::signer::Signer;

use crate::error::{Error, Result};

/// Wallet with its signing key
///
/// The address always equals the public key of the keypair; construction
/// rejects records where they disagree.
#[derive(Clone)]
pub struct WalletRecord {
    address: Pubkey,
    keypair: Arc<Keypair>,
}

impl WalletRecord {
    /// Wrap a keypair, deriving the address
    pub fn from_keypair(keypair: Keypair) -> Self {
        Self {
            address: keypair.pubkey(),
            keypair: Arc::new(keypair),
        }
    }

    /// Build from a base58-encoded 64-byte secret key
    pub fn from_secret(secret: &str) -> Result<Self> {
        let bytes = bs58::decode(secret.trim())
            .into_vec()
            .map_err(|e| Error::InvalidKeypair(format!("secret is not base58: {}", e)))?;

        let keypair = Keypair::from_bytes(&bytes)
            .map_err(|e| Error::InvalidKeypair(format!("invalid secret key bytes: {}", e)))?;

        Ok(Self::from_keypair(keypair))
    }

    /// Parse an `address:secret` line
    ///
    /// Fails if the address does not match the key derived from the secret.
    pub fn from_line(line: &str) -> Result<Self> {
        let (address, secret) = line
            .trim()
            .split_once(':')
            .ok_or_else(|| Error::InvalidKeypair("expected <address>:<privatekey>".into()))?;

        let record = Self::from_secret(secret)?;
        let claimed = Pubkey::from_str(address.trim()).map_err(|_| Error::AddressMismatch {
            address: address.trim().to_string(),
            derived: record.address.to_string(),
        })?;

        if claimed != record.address {
            return Err(Error::AddressMismatch {
                address: claimed.to_string(),
                derived: record.address.to_string(),
            });
        }

        Ok(record)
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn keypair(&self) -> &Keypair {
        &self.keypair
    }

    /// Base58 secret key, the format used in wallet files
    pub fn secret_base58(&self) -> String {
        self.keypair.to_base58_string()
    }

    /// `address:secret` line for wallet files
    pub fn to_line(&self) -> String {
        format!("{}:{}", self.address, self.secret_base58())
    }
}

// Never print the secret
impl fmt::Debug for WalletRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletRecord")
            .field("address", &self.address)
            .field("secret", &"***")
            .finish()
    }
}

/// Shorten an address for status lines: `AbCdE...vWxYz`
pub fn short_address(address: &Pubkey) -> String {
    let s = address.to_string();
    if s.len() <= 10 {
        return s;
    }
    format!("{}...{}", &s[..5], &s[s.len() - 5..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_roundtrip() {
        let record = WalletRecord::from_keypair(Keypair::new());
        let parsed = WalletRecord::from_line(&record.to_line()).unwrap();
        assert_eq!(parsed.address(), record.address());
    }

    #[test]
    fn test_address_mismatch_rejected() {
        let record = WalletRecord::from_keypair(Keypair::new());
        let other = Keypair::new().pubkey();
        let line = format!("{}:{}", other, record.secret_base58());

        let err = WalletRecord::from_line(&line).unwrap_err();
        assert!(matches!(err, Error::AddressMismatch { .. }));
    }

    #[test]
    fn test_bad_secret_rejected() {
        let line = format!("{}:not-base58-0OIl", Pubkey::new_unique());
        assert!(matches!(
            WalletRecord::from_line(&line),
            Err(Error::InvalidKeypair(_))
        ));
        assert!(WalletRecord::from_line("no separator").is_err());
    }

    #[test]
    fn test_debug_hides_secret() {
        let record = WalletRecord::from_keypair(Keypair::new());
        let debug = format!("{:?}", record);
        assert!(!debug.contains(&record.secret_base58()));
    }

    #[test]
    fn test_short_address() {
        let address = Pubkey::new_unique();
        let full = address.to_string();
        let short = short_address(&address);
        assert!(short.starts_with(&full[..5]));
        assert!(short.ends_with(&full[full.len() - 5..]));
    }
}
