//! # QuillKV
//!
//! A networked key-value store with:
//! - A compact binary protocol (one control byte, option bits, length-prefixed fields)
//! - A fixed pool of connection workers fed by a bounded dispatch channel
//! - A single write serializer that gives every mutation a total order
//! - Write-Ahead Logging (WAL) for durability and crash recovery
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Listener                              │
//! │                 (accept, never serves)                       │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ dispatch channel (bounded)
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                     Worker Pool                              │
//! │          (decode frame, execute, respond, close)             │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ GET                              │ PUT
//!            │                                  ▼
//!            │                      ┌───────────────────────┐
//!            │                      │   Write Serializer    │
//!            │                      │ (one thread, FIFO)    │
//!            │                      └───────────┬───────────┘
//!            ▼                                  ▼
//!   ┌─────────────────────────────────────────────────────┐
//!   │                  Storage Handle                      │
//!   │          (MemTables per database + WAL)              │
//!   └─────────────────────────────────────────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod wal;
pub mod memtable;
pub mod storage;
pub mod writer;
pub mod network;
pub mod shutdown;
pub mod server;
pub mod client;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{QuillError, Result};
pub use config::Config;
pub use client::Client;
pub use server::{RunningServer, Server, ServerState};
pub use shutdown::Shutdown;
pub use storage::{StorageHandle, Store, StoredValue};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of QuillKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
