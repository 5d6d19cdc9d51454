//! Fresh keypair generation

use std::path::Path;

use solana_sdk::signature::Keypair;
use tracing::info;

use crate::error::Result;

use super::store;
use super::types::WalletRecord;

/// Generate `count` new wallets
pub fn generate(count: usize) -> Vec<WalletRecord> {
    (0..count)
        .map(|_| WalletRecord::from_keypair(Keypair::new()))
        .collect()
}

/// Generate wallets and append them to `path`, keeping existing lines
pub fn generate_into(path: &Path, count: usize) -> Result<Vec<WalletRecord>> {
    let records = generate(count);
    store::append_records(path, &records)?;
    info!("Saved {} new wallets to {}", records.len(), path.display());
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_generate_unique() {
        let records = generate(5);
        let addresses: HashSet<_> = records.iter().map(|r| r.address()).collect();
        assert_eq!(addresses.len(), 5);
    }

    #[test]
    fn test_generate_into_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet-baru.txt");
        std::fs::write(&path, "").unwrap();

        generate_into(&path, 2).unwrap();
        generate_into(&path, 3).unwrap();

        let loaded = store::load(&path).unwrap();
        assert_eq!(loaded.len(), 5);
    }

    #[test]
    fn test_generate_into_keeps_unterminated_last_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet-baru.txt");
        let existing = generate(1).remove(0);
        std::fs::write(&path, existing.to_line()).unwrap();

        let created = generate_into(&path, 2).unwrap();

        let loaded = store::load(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert_eq!(loaded[0].address(), existing.address());
        assert_eq!(loaded[1].address(), created[0].address());
    }
}
