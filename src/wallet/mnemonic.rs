//! Mnemonic to private key conversion
//!
//! Each BIP39 phrase is turned into a seed with an empty passphrase and the
//! Solana keypair is derived at `m/44'/501'/0'/0'`, the path used by the
//! common Solana wallets.

use std::path::PathBuf;

use bip39::Mnemonic;
use solana_sdk::derivation_path::DerivationPath;
use solana_sdk::signer::keypair::keypair_from_seed_and_derivation_path;
use tracing::{info, warn};

use crate::error::{Error, Result};

use super::store;
use super::types::WalletRecord;

/// Derive the account-0 wallet for a phrase
pub fn keypair_from_mnemonic(phrase: &str) -> Result<WalletRecord> {
    let mnemonic = Mnemonic::parse_normalized(phrase.trim())
        .map_err(|e| Error::InvalidMnemonic(e.to_string()))?;

    let seed = mnemonic.to_seed("");
    let path = DerivationPath::new_bip44(Some(0), Some(0));

    let keypair = keypair_from_seed_and_derivation_path(&seed, Some(path))
        .map_err(|e| Error::InvalidMnemonic(format!("derivation failed: {}", e)))?;

    Ok(WalletRecord::from_keypair(keypair))
}

/// Counters reported after a conversion run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConversionSummary {
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_in_output: usize,
    pub remaining: usize,
}

/// Converts a file of phrases into an `address:secret` file
pub struct MnemonicConverter {
    mnemonics_path: PathBuf,
    output_path: PathBuf,
}

impl MnemonicConverter {
    pub fn new(mnemonics_path: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            mnemonics_path: mnemonics_path.into(),
            output_path: output_path.into(),
        }
    }

    /// Convert every phrase
    ///
    /// Converted phrases and phrases whose address is already in the output
    /// are removed from the input file. Invalid phrases stay so they can be
    /// fixed by hand. Both files are rewritten after each phrase, so an
    /// interrupted run loses nothing.
    pub fn convert(&self) -> Result<ConversionSummary> {
        if !self.mnemonics_path.exists() {
            return Err(Error::WalletFileNotFound(
                self.mnemonics_path.display().to_string(),
            ));
        }

        let phrases: Vec<String> = std::fs::read_to_string(&self.mnemonics_path)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect();

        let mut entries = store::read_entries(&self.output_path)?;
        info!(
            "Found {} mnemonics, {} wallets already in {}",
            phrases.len(),
            entries.len(),
            self.output_path.display()
        );

        let mut summary = ConversionSummary::default();
        let mut remaining = phrases.clone();

        for (index, phrase) in phrases.iter().enumerate() {
            let words = phrase.split_whitespace().count();
            info!(
                "[{}/{}] {}-word mnemonic {}...",
                index + 1,
                phrases.len(),
                words,
                preview(phrase)
            );

            let record = match keypair_from_mnemonic(phrase) {
                Ok(record) => record,
                Err(e) => {
                    warn!("Cannot convert {}...: {}", preview(phrase), e);
                    summary.failed += 1;
                    continue;
                }
            };

            let address = record.address().to_string();
            if entries.iter().any(|(a, _)| *a == address) {
                info!("{} already converted, skipping", address);
                summary.skipped += 1;
            } else {
                entries.push((address.clone(), record.secret_base58()));
                store::write_entries(&self.output_path, &entries)?;
                info!("Converted {}", address);
                summary.converted += 1;
            }

            if let Some(pos) = remaining.iter().position(|p| p == phrase) {
                remaining.remove(pos);
                std::fs::write(&self.mnemonics_path, remaining.join("\n"))?;
            }
        }

        summary.total_in_output = entries.len();
        summary.remaining = remaining.len();
        Ok(summary)
    }
}

/// First few words of a phrase, enough to find it in the file
fn preview(phrase: &str) -> String {
    phrase.chars().take(20).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_derivation_is_deterministic() {
        let a = keypair_from_mnemonic(PHRASE).unwrap();
        let b = keypair_from_mnemonic(&format!("  {}  ", PHRASE)).unwrap();
        assert_eq!(a.address(), b.address());
    }

    #[test]
    fn test_invalid_phrase() {
        let err = keypair_from_mnemonic("abandon abandon abandon").unwrap_err();
        assert!(matches!(err, Error::InvalidMnemonic(_)));

        let bad_checksum = PHRASE.replace("about", "abandon");
        assert!(keypair_from_mnemonic(&bad_checksum).is_err());
    }

    #[test]
    fn test_convert_file() {
        let dir = TempDir::new().unwrap();
        let mnemonics = dir.path().join("mnemonic.txt");
        let output = dir.path().join("convertToPK.txt");

        let existing = keypair_from_mnemonic(PHRASE).unwrap();
        let other = "legal winner thank year wave sausage worth useful legal winner thank yellow";
        std::fs::write(&output, format!("{}\n", existing.to_line())).unwrap();
        std::fs::write(&mnemonics, format!("{}\nnot a phrase\n{}\n", PHRASE, other)).unwrap();

        let summary = MnemonicConverter::new(&mnemonics, &output).convert().unwrap();
        assert_eq!(
            summary,
            ConversionSummary {
                converted: 1,
                skipped: 1,
                failed: 1,
                total_in_output: 2,
                remaining: 1,
            }
        );

        assert_eq!(std::fs::read_to_string(&mnemonics).unwrap(), "not a phrase");
        let loaded = store::load(&output).unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(
            loaded[1].address(),
            keypair_from_mnemonic(other).unwrap().address()
        );
    }

    #[test]
    fn test_convert_missing_input() {
        let dir = TempDir::new().unwrap();
        let converter =
            MnemonicConverter::new(dir.path().join("none.txt"), dir.path().join("out.txt"));
        assert!(matches!(
            converter.convert(),
            Err(Error::WalletFileNotFound(_))
        ));
    }
}
