//! WAL-backed store
//!
//! Keeps every database in memory and appends each write to a WAL before
//! making it visible. On open the WAL is replayed to rebuild the tables.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::{StorageHandle, StoredValue};
use crate::config::{Config, WalSyncStrategy};
use crate::error::{QuillError, Result};
use crate::memtable::MemTable;
use crate::wal::{Operation, WalRecovery, WalWriter};

/// Name under which requests without DBNAME are stored
const DEFAULT_DB: &str = "";

/// The bundled storage backend
pub struct Store {
    data_dir: PathBuf,

    /// One table per database name
    databases: RwLock<HashMap<String, Arc<MemTable>>>,

    /// Write-ahead log (only the write serializer appends)
    wal: Mutex<WalWriter>,

    closed: AtomicBool,
}

impl Store {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const WAL_FILENAME: &'static str = "wal.log";

    /// Open or create a store in `config.data_dir`
    ///
    /// On startup:
    /// 1. Create the data directory if it doesn't exist
    /// 2. Recover the WAL, truncating a torn tail
    /// 3. Replay recovered entries into the tables
    /// 4. Reopen the WAL for appending
    pub fn open(config: &Config) -> Result<Self> {
        Self::open_with(&config.data_dir, config.wal_sync_strategy)
    }

    /// Open with a path and the default sync strategy
    pub fn open_path(path: &Path) -> Result<Self> {
        Self::open_with(path, Config::default().wal_sync_strategy)
    }

    fn open_with(data_dir: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        let wal_path = data_dir.join(Self::WAL_FILENAME);

        let mut databases: HashMap<String, Arc<MemTable>> = HashMap::new();

        if wal_path.exists() {
            let (entries, recovery) = WalRecovery::recover(&wal_path)?;
            if recovery.entries_recovered > 0 || recovery.entries_corrupted > 0 {
                tracing::info!(
                    "WAL recovery: {} entries recovered, {} corrupted, last_lsn={}",
                    recovery.entries_recovered,
                    recovery.entries_corrupted,
                    recovery.last_lsn
                );
            }

            for entry in entries {
                match entry.operation {
                    Operation::Put {
                        db,
                        key,
                        value,
                        compressed,
                    } => {
                        let name = db.unwrap_or_else(|| DEFAULT_DB.to_string());
                        databases
                            .entry(name)
                            .or_default()
                            .put(key, StoredValue::new(value, compressed));
                    }
                }
            }
        }

        let wal = WalWriter::open(&wal_path, sync_strategy)?;

        Ok(Self {
            data_dir: data_dir.to_path_buf(),
            databases: RwLock::new(databases),
            wal: Mutex::new(wal),
            closed: AtomicBool::new(false),
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(QuillError::Storage("store is closed".to_string()));
        }
        Ok(())
    }

    fn table(&self, db: &str) -> Option<Arc<MemTable>> {
        self.databases.read().get(db).cloned()
    }

    fn table_or_create(&self, db: &str) -> Arc<MemTable> {
        if let Some(table) = self.table(db) {
            return table;
        }
        Arc::clone(self.databases.write().entry(db.to_string()).or_default())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Names of all databases holding at least one key
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Total number of keys across databases
    pub fn entry_count(&self) -> usize {
        self.databases.read().values().map(|t| t.entry_count()).sum()
    }

    /// LSN of the most recent logged write (0 if none)
    pub fn last_lsn(&self) -> u64 {
        self.wal.lock().current_lsn() - 1
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl StorageHandle for Store {
    fn get(&self, db: Option<&str>, key: &[u8]) -> Result<Option<StoredValue>> {
        self.ensure_open()?;
        Ok(self
            .table(db.unwrap_or(DEFAULT_DB))
            .and_then(|table| table.get(key)))
    }

    /// Log first, then publish to the table
    fn put(&self, db: Option<&str>, key: &[u8], value: StoredValue, sync: bool) -> Result<()> {
        self.ensure_open()?;

        {
            let mut wal = self.wal.lock();
            let operation = Operation::Put {
                db: db.map(str::to_string),
                key: key.to_vec(),
                value: value.data.clone(),
                compressed: value.compressed,
            };
            if sync {
                wal.append_durable(operation)?;
            } else {
                wal.append(operation)?;
            }
        }

        self.table_or_create(db.unwrap_or(DEFAULT_DB))
            .put(key.to_vec(), value);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.wal.lock().sync()?;
        tracing::debug!("Store at {} closed", self.data_dir.display());
        Ok(())
    }
}
