//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use super::reader::EntryRead;
use super::{WalEntry, WalReader};
use crate::error::Result;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries found (scanning stops at the first)
    pub entries_corrupted: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether bytes past the last valid entry were (or would be) removed
    pub was_truncated: bool,
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Stop at the first torn or corrupted entry
    /// 3. Truncate everything from that point on
    /// 4. Return all valid entries in order
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let (result, valid_end) = Self::scan(path, |entry| entries.push(entry))?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(valid_end)?;
            file.sync_all()?;
            tracing::warn!(
                "WAL {} truncated to {} bytes ({} corrupted entries)",
                path.display(),
                valid_end,
                result.entries_corrupted
            );
        }

        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        let (result, _) = Self::scan(path, |_| {})?;
        Ok(result)
    }

    fn scan<F: FnMut(WalEntry)>(path: &Path, mut on_entry: F) -> Result<(RecoveryResult, u64)> {
        let mut reader = WalReader::open(path)?;
        let file_len = std::fs::metadata(path)?.len();
        let mut result = RecoveryResult::default();

        loop {
            match reader.read_next()? {
                EntryRead::Entry(entry) => {
                    result.entries_recovered += 1;
                    result.last_lsn = entry.lsn;
                    on_entry(entry);
                }
                EntryRead::End => break,
                EntryRead::Torn => break,
                EntryRead::Corrupt(reason) => {
                    tracing::debug!("WAL corruption in {}: {}", path.display(), reason);
                    result.entries_corrupted += 1;
                    break;
                }
            }
        }

        let valid_end = reader.position();
        result.was_truncated = valid_end < file_len;
        Ok((result, valid_end))
    }
}
