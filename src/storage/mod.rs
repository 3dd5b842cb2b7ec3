//! Storage Module
//!
//! The storage handle consumed by the server, and the WAL-backed store that
//! ships with it.
//!
//! ## Contract
//! - `get` may be called from any number of threads at once
//! - `put` is only ever called by the write serializer, one call at a time
//! - single-key operations are atomic: readers see the old or the new value
//! - `close` is called once during shutdown
//!
//! ## Layout (Store)
//! ```text
//! ┌──────────────────────────────┐
//! │ databases: name → MemTable   │  (RwLock, concurrent readers)
//! ├──────────────────────────────┤
//! │ wal.log                      │  (appended before every table write)
//! └──────────────────────────────┘
//! ```

mod store;

pub use store::Store;

use crate::error::Result;

/// A value as kept by the storage layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredValue {
    pub data: Vec<u8>,

    /// Client-side compressed payload; echoed back as the COMPRESS option
    pub compressed: bool,
}

impl StoredValue {
    pub fn new(data: impl Into<Vec<u8>>, compressed: bool) -> Self {
        Self {
            data: data.into(),
            compressed,
        }
    }
}

/// Thread-safe surface over the persistence layer
pub trait StorageHandle: Send + Sync {
    /// Look up a key; `Ok(None)` means the key was never written
    fn get(&self, db: Option<&str>, key: &[u8]) -> Result<Option<StoredValue>>;

    /// Store a value; with `sync` the call returns only once it is durable
    fn put(&self, db: Option<&str>, key: &[u8], value: StoredValue, sync: bool) -> Result<()>;

    /// Flush and release the backend
    fn close(&self) -> Result<()>;
}
