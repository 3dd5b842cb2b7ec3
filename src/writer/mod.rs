//! Write Serializer Module
//!
//! Every mutation in the server passes through one dedicated thread.
//!
//! ```text
//!   worker ─┐
//!   worker ─┼─► write queue (bounded, FIFO) ─► WriteSerializer ─► StorageHandle::put
//!   worker ─┘                                        │
//!      ▲                                             └─► Replicator (REPLICATION option)
//!      └──────────── reply channel (ResponseCode) ◄──┘
//! ```
//!
//! The queue order is the mutation order: jobs are applied one at a time in
//! the order they were enqueued, so the storage backend never sees two
//! concurrent writes and needs no write lock of its own.

mod job;
mod replication;
mod serializer;

pub use job::{Mutation, WriteJob, WriteOptions};
pub use replication::{LogReplicator, Replicator};
pub use serializer::{WriteHandle, WriteSerializer, WriterStats};
