//! WAL Writer
//!
//! Handles appending entries to the WAL file.
//!
//! A failed write or fsync poisons the writer: the unsynced tail (including
//! the failed entry) is discarded and the file is cut back to the last
//! successful sync, so a rejected write can never resurface on replay.
//! Every later append fails with `WalWrite`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use super::{Operation, WalEntry, WalRecovery};
use crate::config::WalSyncStrategy;
use crate::error::{QuillError, Result};

/// File operations the WAL needs beyond `Write`
pub trait LogFile: Write {
    fn sync_data(&self) -> io::Result<()>;

    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl LogFile for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

/// Writes entries to the WAL file
pub struct WalWriter<F: LogFile = File> {
    /// `None` once poisoned
    writer: Option<BufWriter<F>>,

    /// LSN the next appended entry receives
    next_lsn: u64,

    sync_strategy: WalSyncStrategy,

    /// Entries appended since the last fsync
    uncommitted: usize,

    /// Bytes handed to the writer, synced or not
    written_len: u64,

    /// File length as of the last successful fsync
    synced_len: u64,
}

impl WalWriter<File> {
    /// Open or create a WAL file, continuing after its last valid LSN
    ///
    /// Callers that may hold a torn tail should run `WalRecovery::recover`
    /// first so new entries are not appended after garbage.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let last_lsn = if path.exists() {
            WalRecovery::verify(path)?.last_lsn
        } else {
            0
        };

        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let len = file.metadata()?.len();

        Ok(Self::resume(file, last_lsn + 1, len, sync_strategy))
    }
}

impl<F: LogFile> WalWriter<F> {
    /// Continue a log of `len` durable bytes whose next entry gets `next_lsn`
    pub fn resume(file: F, next_lsn: u64, len: u64, sync_strategy: WalSyncStrategy) -> Self {
        Self {
            writer: Some(BufWriter::new(file)),
            next_lsn,
            sync_strategy,
            uncommitted: 0,
            written_len: len,
            synced_len: len,
        }
    }

    /// Append an operation, syncing according to the strategy
    ///
    /// Returns the LSN assigned to the entry.
    pub fn append(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.next_lsn;
        let bytes = WalEntry::new(lsn, operation).serialize()?;

        let writer = self.writer.as_mut().ok_or_else(poisoned)?;
        if let Err(e) = writer.write_all(&bytes) {
            self.poison();
            return Err(e.into());
        }
        self.written_len += bytes.len() as u64;
        self.next_lsn += 1;
        self.uncommitted += 1;

        let should_sync = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count.max(1),
        };
        if should_sync {
            self.sync()?;
        }

        Ok(lsn)
    }

    /// Append an operation and return only once it is on disk
    pub fn append_durable(&mut self, operation: Operation) -> Result<u64> {
        let lsn = self.append(operation)?;
        if self.uncommitted > 0 {
            self.sync()?;
        }
        Ok(lsn)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        let writer = self.writer.as_mut().ok_or_else(poisoned)?;
        let outcome = writer.flush().and_then(|_| writer.get_ref().sync_data());
        if let Err(e) = outcome {
            self.poison();
            return Err(e.into());
        }
        self.uncommitted = 0;
        self.synced_len = self.written_len;
        Ok(())
    }

    /// Drop buffered bytes and cut the file back to its last synced length
    fn poison(&mut self) {
        let Some(writer) = self.writer.take() else {
            return;
        };
        // into_parts hands back the buffer without flushing it.
        let (file, _discarded) = writer.into_parts();
        if let Err(e) = file.set_len(self.synced_len) {
            tracing::error!("Unable to roll WAL back to {} bytes: {}", self.synced_len, e);
        }
        tracing::error!(
            "WAL writer poisoned; {} unsynced entries discarded",
            self.uncommitted
        );
        self.uncommitted = 0;
        self.written_len = self.synced_len;
    }

    /// Whether an earlier failure stopped this writer
    pub fn is_poisoned(&self) -> bool {
        self.writer.is_none()
    }

    /// LSN the next appended entry will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    /// Number of entries written but not yet synced
    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }
}

fn poisoned() -> QuillError {
    QuillError::WalWrite("writer stopped after an earlier I/O failure".to_string())
}
