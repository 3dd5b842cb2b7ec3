//! MemTable implementation
//!
//! BTreeMap-based memtable with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::storage::StoredValue;

/// In-memory table for one database
pub struct MemTable {
    data: RwLock<BTreeMap<Vec<u8>, StoredValue>>,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new() -> Self {
        Self {
            data: RwLock::new(BTreeMap::new()),
        }
    }

    /// Get a value by key (read lock)
    pub fn get(&self, key: &[u8]) -> Option<StoredValue> {
        self.data.read().get(key).cloned()
    }

    /// Put a key-value pair (write lock)
    pub fn put(&self, key: Vec<u8>, value: StoredValue) {
        self.data.write().insert(key, value);
    }

    /// Get entry count
    pub fn entry_count(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Snapshot of all entries in sorted key order
    pub fn entries(&self) -> Vec<(Vec<u8>, StoredValue)> {
        self.data
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

impl Default for MemTable {
    fn default() -> Self {
        Self::new()
    }
}
