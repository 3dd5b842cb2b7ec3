//! Network Module
//!
//! TCP listener and connection handling.
//!
//! ## Architecture
//! - Single listener thread accepting connections
//! - Bounded dispatch channel carrying accepted sockets
//! - Fixed pool of worker threads, each owning one connection at a time
//! - Reads served directly from storage, writes routed to the write serializer

mod connection;
mod listener;
mod pool;

pub use connection::Connection;
pub use listener::Listener;
pub use pool::{WorkerContext, WorkerPool};
