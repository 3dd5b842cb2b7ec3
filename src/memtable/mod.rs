//! MemTable Module
//!
//! In-memory table holding the current contents of one database.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Single-writer/multi-reader access pattern
//! - Atomic single-key visibility (a reader never sees half a value)
//! - Track approximate size for diagnostics
//!
//! ## Data Structure Choice
//! BTreeMap wrapped in RwLock:
//! - Ordered keys for deterministic iteration
//! - Simple and correct first, optimize later

mod table;

pub use table::MemTable;
