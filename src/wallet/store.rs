//! Flat-file wallet store
//!
//! Wallet files hold one `address:secret` record per line. Files are read once
//! per command; the batch loop never writes them.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use solana_sdk::pubkey::Pubkey;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::types::WalletRecord;

/// Load every valid record from a wallet file
///
/// Malformed or mismatched lines are logged and skipped; the rest of the file
/// still loads.
pub fn load(path: &Path) -> Result<Vec<WalletRecord>> {
    let content = read_wallet_file(path)?;

    let mut records = Vec::new();
    for (index, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match WalletRecord::from_line(line) {
            Ok(record) => records.push(record),
            Err(e) => warn!("{}:{} skipped: {}", path.display(), index + 1, e),
        }
    }

    info!("Loaded {} wallets from {}", records.len(), path.display());
    Ok(records)
}

/// Load the funding wallet: the first record in its file, which must be valid
pub fn load_single(path: &Path) -> Result<WalletRecord> {
    let content = read_wallet_file(path)?;

    let line = content
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .ok_or_else(|| Error::EmptyWalletPool(path.display().to_string()))?;

    WalletRecord::from_line(line)
}

/// Read the address column of a wallet file without touching the secrets
pub fn read_addresses(path: &Path) -> Result<Vec<Pubkey>> {
    let content = read_wallet_file(path)?;

    Ok(content
        .lines()
        .filter_map(|line| line.trim().split(':').next())
        .filter_map(|address| address.trim().parse().ok())
        .collect())
}

/// Append records, creating the file if needed
///
/// A last line without a trailing newline is terminated first so the new
/// records start on their own lines.
pub fn append_records(path: &Path, records: &[WalletRecord]) -> Result<()> {
    let needs_newline = !ends_with_newline(path)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if needs_newline {
        writeln!(file)?;
    }
    for record in records {
        writeln!(file, "{}", record.to_line())?;
    }
    restrict_permissions(path);

    debug!("Appended {} records to {}", records.len(), path.display());
    Ok(())
}

/// True for a missing or empty file, or one whose last byte is `\n`
fn ends_with_newline(path: &Path) -> Result<bool> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(true),
        Err(e) => return Err(e.into()),
    };
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

/// Raw `address:secret` lines, deduplicated by address, in file order
///
/// Used for the converter output where lines are carried over verbatim.
pub fn read_entries(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }

    let content = std::fs::read_to_string(path)?;
    let mut seen = HashSet::new();

    Ok(content
        .lines()
        .filter_map(|line| line.trim().split_once(':'))
        .filter(|(address, _)| seen.insert(address.trim().to_string()))
        .map(|(address, secret)| (address.trim().to_string(), secret.trim().to_string()))
        .collect())
}

/// Rewrite a wallet file with the given entries
pub fn write_entries(path: &Path, entries: &[(String, String)]) -> Result<()> {
    let content: String = entries
        .iter()
        .map(|(address, secret)| format!("{}:{}\n", address, secret))
        .collect();

    std::fs::write(path, content)?;
    restrict_permissions(path);
    Ok(())
}

fn read_wallet_file(path: &Path) -> Result<String> {
    if !path.exists() {
        return Err(Error::WalletFileNotFound(path.display().to_string()));
    }
    warn_if_insecure(path);
    Ok(std::fs::read_to_string(path)?)
}

/// Warn when a secrets file is readable by group or others
fn warn_if_insecure(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(metadata) = std::fs::metadata(path) {
            let mode = metadata.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "{} has insecure permissions {:o}. Run 'chmod 600 {}'",
                    path.display(),
                    mode & 0o777,
                    path.display()
                );
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

fn restrict_permissions(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
            warn!("Could not restrict permissions on {}: {}", path.display(), e);
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::signature::Keypair;
    use tempfile::TempDir;

    fn record() -> WalletRecord {
        WalletRecord::from_keypair(Keypair::new())
    }

    #[test]
    fn test_load_skips_bad_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tuyul.txt");

        let good = record();
        let mismatched = format!("{}:{}", Pubkey::new_unique(), record().secret_base58());
        std::fs::write(
            &path,
            format!("{}\n\n{}\ngarbage\n", good.to_line(), mismatched),
        )
        .unwrap();

        let loaded = load(&path).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].address(), good.address());
    }

    #[test]
    fn test_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = load(&dir.path().join("nope.txt")).unwrap_err();
        assert!(matches!(err, Error::WalletFileNotFound(_)));
    }

    #[test]
    fn test_load_single_rejects_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("main.txt");
        let line = format!("{}:{}", Pubkey::new_unique(), record().secret_base58());
        std::fs::write(&path, line).unwrap();

        assert!(matches!(
            load_single(&path),
            Err(Error::AddressMismatch { .. })
        ));

        std::fs::write(&path, "\n").unwrap();
        assert!(matches!(load_single(&path), Err(Error::EmptyWalletPool(_))));
    }

    #[test]
    fn test_append_preserves_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("new.txt");

        let first = record();
        let second = record();
        append_records(&path, &[first.clone()]).unwrap();
        append_records(&path, &[second.clone()]).unwrap();

        let addresses = read_addresses(&path).unwrap();
        assert_eq!(addresses, vec![first.address(), second.address()]);

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }

    #[test]
    fn test_append_after_unterminated_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("wallet-baru.txt");
        let existing = record();
        std::fs::write(&path, existing.to_line()).unwrap();

        let added = [record(), record()];
        append_records(&path, &added).unwrap();

        let loaded = load(&path).unwrap();
        let addresses: Vec<_> = loaded.iter().map(|r| r.address()).collect();
        assert_eq!(
            addresses,
            vec![existing.address(), added[0].address(), added[1].address()]
        );
        assert_eq!(std::fs::read_to_string(&path).unwrap().lines().count(), 3);
    }

    #[test]
    fn test_entries_dedup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("converted.txt");
        std::fs::write(&path, "A:one\nB:two\nA:three\n").unwrap();

        let entries = read_entries(&path).unwrap();
        assert_eq!(
            entries,
            vec![
                ("A".to_string(), "one".to_string()),
                ("B".to_string(), "two".to_string())
            ]
        );

        write_entries(&path, &entries[..1]).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "A:one\n");
        assert!(read_entries(&dir.path().join("missing.txt")).unwrap().is_empty());
    }
}
