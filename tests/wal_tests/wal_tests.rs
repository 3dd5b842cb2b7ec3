//! Tests for the Write-Ahead Log
//!
//! These tests verify:
//! - LSN sequencing across appends and reopen
//! - Sync strategies and uncommitted counts
//! - Sequential reading and iteration
//! - Recovery from torn tails and corrupted entries
//! - Verify mode (stats only, file untouched)

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use quillkv::config::WalSyncStrategy;
use quillkv::wal::{
    LogFile, Operation, RecoveryResult, WalEntry, WalReader, WalRecovery, WalWriter, HEADER_SIZE,
};
use quillkv::QuillError;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put_op(i: usize) -> Operation {
    Operation::Put {
        db: None,
        key: format!("key{}", i).into_bytes(),
        value: format!("value{}", i).into_bytes(),
        compressed: false,
    }
}

/// Write entries using WalWriter (produces a well-formed WAL)
fn write_entries_via_writer(path: &Path, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        writer.append(put_op(i)).unwrap();
    }
}

/// Write raw serialized entries directly to a file (for crafting corruption)
fn write_raw_entries(path: &Path, entries: &[WalEntry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        file.write_all(&entry.serialize().unwrap()).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Writer Tests
// =============================================================================

#[test]
fn test_writer_assigns_sequential_lsns() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    assert_eq!(writer.current_lsn(), 1);
    for expected in 1..=5u64 {
        assert_eq!(writer.append(put_op(expected as usize)).unwrap(), expected);
    }
    assert_eq!(writer.current_lsn(), 6);
}

#[test]
fn test_writer_every_write_leaves_nothing_uncommitted() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(put_op(0)).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_writer_every_n_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let strategy = WalSyncStrategy::EveryNEntries { count: 3 };
    let mut writer = WalWriter::open(&wal_path, strategy).unwrap();

    writer.append(put_op(0)).unwrap();
    writer.append(put_op(1)).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(put_op(2)).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_writer_append_durable_syncs() {
    let (_temp, wal_path) = setup_temp_wal();
    let strategy = WalSyncStrategy::EveryNEntries { count: 100 };
    let mut writer = WalWriter::open(&wal_path, strategy).unwrap();

    writer.append(put_op(0)).unwrap();
    assert_eq!(writer.uncommitted_count(), 1);

    writer.append_durable(put_op(1)).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_writer_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 4);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 5);
    assert_eq!(writer.append(put_op(9)).unwrap(), 5);
    drop(writer);

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    let lsns: Vec<u64> = entries.iter().map(|e| e.lsn).collect();
    assert_eq!(lsns, vec![1, 2, 3, 4, 5]);
}

// =============================================================================
// Write Failure Tests
// =============================================================================

/// In-memory log file whose writes and syncs can be made to fail
#[derive(Clone, Default)]
struct FlakyFile {
    data: Arc<Mutex<Vec<u8>>>,
    fail_writes: Arc<AtomicBool>,
    fail_syncs: Arc<AtomicBool>,
}

impl Write for FlakyFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "disk full"));
        }
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl LogFile for FlakyFile {
    fn sync_data(&self) -> io::Result<()> {
        if self.fail_syncs.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "fsync failed"));
        }
        Ok(())
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.data.lock().truncate(len as usize);
        Ok(())
    }
}

/// Replay raw log bytes through recovery and return the surviving LSNs
fn recovered_lsns(bytes: &[u8]) -> Vec<u64> {
    let (_temp, wal_path) = setup_temp_wal();
    std::fs::write(&wal_path, bytes).unwrap();
    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    entries.iter().map(|e| e.lsn).collect()
}

#[test]
fn test_failed_sync_rolls_back_and_stops_writer() {
    let file = FlakyFile::default();
    let mut writer = WalWriter::resume(file.clone(), 1, 0, WalSyncStrategy::EveryWrite);

    writer.append_durable(put_op(0)).unwrap();
    let durable = file.data.lock().clone();

    file.fail_syncs.store(true, Ordering::SeqCst);
    assert!(writer.append_durable(put_op(1)).is_err());
    assert!(writer.is_poisoned());
    assert_eq!(*file.data.lock(), durable);

    // Later writes are refused even once the disk recovers.
    file.fail_syncs.store(false, Ordering::SeqCst);
    let result = writer.append(put_op(2));
    assert!(matches!(result, Err(QuillError::WalWrite(_))));
    assert!(matches!(writer.sync(), Err(QuillError::WalWrite(_))));
    drop(writer);

    assert_eq!(*file.data.lock(), durable);
    assert_eq!(recovered_lsns(&durable), vec![1]);
}

#[test]
fn test_failed_flush_discards_buffered_entries() {
    let file = FlakyFile::default();
    let strategy = WalSyncStrategy::EveryNEntries { count: 2 };
    let mut writer = WalWriter::resume(file.clone(), 1, 0, strategy);

    file.fail_writes.store(true, Ordering::SeqCst);
    // Buffered only, so nothing has touched the file yet.
    writer.append(put_op(0)).unwrap();
    assert!(writer.append(put_op(1)).is_err());
    assert!(writer.is_poisoned());

    file.fail_writes.store(false, Ordering::SeqCst);
    drop(writer);

    // Neither the buffered entry nor the failed one reaches the log.
    assert!(file.data.lock().is_empty());
}

/// Real log file whose fsync always fails
struct UnsyncableFile(File);

impl Write for UnsyncableFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl LogFile for UnsyncableFile {
    fn sync_data(&self) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::Other, "fsync failed"))
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        self.0.set_len(len)
    }
}

#[test]
fn test_rejected_append_is_absent_after_reopen() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let synced_len = std::fs::metadata(&wal_path).unwrap().len();

    let file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    let mut writer =
        WalWriter::resume(UnsyncableFile(file), 3, synced_len, WalSyncStrategy::EveryWrite);
    assert!(writer.append(put_op(2)).is_err());
    drop(writer);

    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), synced_len);

    // LSN 3 is handed out again because the rejected entry never landed.
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.append(put_op(3)).unwrap(), 3);
    drop(writer);

    let (entries, _) = WalRecovery::recover(&wal_path).unwrap();
    let operations: Vec<Operation> = entries.into_iter().map(|e| e.operation).collect();
    assert_eq!(operations, vec![put_op(0), put_op(1), put_op(3)]);
}

// =============================================================================
// Reader Tests
// =============================================================================

#[test]
fn test_reader_reads_entries_in_order() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);

    let mut reader = WalReader::open(&wal_path).unwrap();
    for i in 0..3 {
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.lsn, i as u64 + 1);
        assert_eq!(entry.operation, put_op(i));
    }
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_reader_position_tracks_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let file_len = std::fs::metadata(&wal_path).unwrap().len();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.position(), 0);
    while reader.next_entry().unwrap().is_some() {}
    assert_eq!(reader.position(), file_len);
}

#[test]
fn test_reader_iterator() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 10);

    let entries: Vec<WalEntry> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 10);
}

#[test]
fn test_reader_torn_entry_is_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 1);

    // Half a header
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0u8; HEADER_SIZE / 2]).unwrap();
    drop(file);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(matches!(
        reader.next_entry(),
        Err(QuillError::WalCorruption(_))
    ));
}

#[test]
fn test_entry_preserves_database_and_compression() {
    let (_temp, wal_path) = setup_temp_wal();
    let op = Operation::Put {
        db: Some("users".to_string()),
        key: b"k".to_vec(),
        value: vec![0x1f, 0x8b, 0x08],
        compressed: true,
    };
    write_raw_entries(&wal_path, &[WalEntry::new(1, op.clone())]);

    let entry = WalReader::open(&wal_path).unwrap().next_entry().unwrap().unwrap();
    assert_eq!(entry.operation, op);
}

// =============================================================================
// Recovery Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result, RecoveryResult::default());
}

#[test]
fn test_recover_clean_wal() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 5);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 5);
    assert_eq!(result.entries_recovered, 5);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 5);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_truncates_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 3);
    let clean_len = std::fs::metadata(&wal_path).unwrap().len();

    // A full header claiming more data than follows
    let torn = WalEntry::new(4, put_op(4)).serialize().unwrap();
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&torn[..torn.len() - 3]).unwrap();
    drop(file);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_lsn, 3);
    assert_eq!(result.entries_corrupted, 0);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), clean_len);
}

#[test]
fn test_recover_stops_at_crc_mismatch() {
    let (_temp, wal_path) = setup_temp_wal();
    let entries: Vec<WalEntry> = (0..3).map(|i| WalEntry::new(i as u64 + 1, put_op(i))).collect();
    write_raw_entries(&wal_path, &entries);

    // Flip the last byte of the second entry's data
    let first_len = entries[0].serialize().unwrap().len();
    let second_len = entries[1].serialize().unwrap().len();
    let mut bytes = std::fs::read(&wal_path).unwrap();
    bytes[first_len + second_len - 1] ^= 0xFF;
    std::fs::write(&wal_path, &bytes).unwrap();

    let (recovered, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(recovered.len(), 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), first_len as u64);
}

#[test]
fn test_recover_then_append_continues_after_valid_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(b"garbage").unwrap();
    drop(file);

    WalRecovery::recover(&wal_path).unwrap();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.append(put_op(2)).unwrap(), 3);
    drop(writer);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(entries.len(), 3);
    assert!(!result.was_truncated);
}

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries_via_writer(&wal_path, 2);
    let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
    file.write_all(&[0xAB; 5]).unwrap();
    drop(file);
    let len_before = std::fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 2);
    assert!(result.was_truncated);
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), len_before);
}
