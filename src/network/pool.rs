//! Connection Worker Pool
//!
//! A fixed set of long-lived threads pulling accepted connections off the
//! dispatch channel. Each worker owns one connection from the first read to
//! the close, then goes back to the channel for the next one.

use std::net::TcpStream;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam::channel::Receiver;

use super::Connection;
use crate::error::{QuillError, Result};
use crate::protocol::{Command, Request, Response};
use crate::shutdown::Shutdown;
use crate::storage::StorageHandle;
use crate::writer::{Mutation, WriteHandle};

/// Everything a worker needs to serve a connection
pub struct WorkerContext {
    /// Shared read path
    pub storage: Arc<dyn StorageHandle>,

    /// Write path; workers never call `StorageHandle::put` themselves
    pub writer: WriteHandle,

    pub shutdown: Shutdown,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    pub keep_alive: bool,
}

#[derive(Default)]
struct PoolStats {
    live: AtomicUsize,
    busy: AtomicUsize,
    served: AtomicU64,
}

/// Supervised pool of connection workers
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
}

impl WorkerPool {
    /// Start up to `size` workers consuming `connections`
    ///
    /// A worker that cannot be spawned is logged and skipped; the pool runs
    /// degraded. Only a pool with no worker at all is an error.
    pub fn spawn(size: usize, connections: Receiver<TcpStream>, context: WorkerContext) -> Result<Self> {
        let context = Arc::new(context);
        let stats = Arc::new(PoolStats::default());
        let mut workers = Vec::with_capacity(size);

        for id in 0..size {
            let connections = connections.clone();
            let context = Arc::clone(&context);
            let worker_stats = Arc::clone(&stats);

            // Count the worker as live before it runs so the count never dips.
            stats.live.fetch_add(1, Ordering::SeqCst);
            let spawned = thread::Builder::new()
                .name(format!("worker-{}", id))
                .spawn(move || worker_loop(id, connections, context, worker_stats));

            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => {
                    stats.live.fetch_sub(1, Ordering::SeqCst);
                    tracing::warn!("Unable to start worker {}: {}", id, e);
                }
            }
        }

        if workers.is_empty() {
            return Err(QuillError::NoWorkers);
        }
        if workers.len() < size {
            tracing::warn!("Worker pool running with {} of {} workers", workers.len(), size);
        } else {
            tracing::info!("Worker pool started with {} workers", size);
        }

        Ok(Self { workers, stats })
    }

    /// Number of worker threads started
    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// Workers whose loop has not exited
    pub fn live_workers(&self) -> usize {
        self.stats.live.load(Ordering::SeqCst)
    }

    /// Workers currently serving a connection
    pub fn busy_workers(&self) -> usize {
        self.stats.busy.load(Ordering::SeqCst)
    }

    /// Connections fully handled since startup
    pub fn connections_served(&self) -> u64 {
        self.stats.served.load(Ordering::SeqCst)
    }

    /// Wait for every worker to finish
    ///
    /// Workers exit once the dispatch channel is disconnected and empty, so
    /// the listener must have stopped first.
    pub fn join(self) {
        for handle in self.workers {
            if handle.join().is_err() {
                tracing::error!("Worker thread terminated abnormally");
            }
        }
        tracing::info!(
            "Worker pool stopped after serving {} connections",
            self.stats.served.load(Ordering::SeqCst)
        );
    }
}

fn worker_loop(id: usize, connections: Receiver<TcpStream>, context: Arc<WorkerContext>, stats: Arc<PoolStats>) {
    tracing::debug!("Worker {} ready", id);

    while let Ok(stream) = connections.recv() {
        stats.busy.fetch_add(1, Ordering::SeqCst);

        // The stream moves into the closure: a panic drops (closes) it.
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| serve(&context, stream)));
        if outcome.is_err() {
            tracing::error!("Worker {} panicked while serving a connection", id);
        }

        stats.served.fetch_add(1, Ordering::SeqCst);
        stats.busy.fetch_sub(1, Ordering::SeqCst);
    }

    stats.live.fetch_sub(1, Ordering::SeqCst);
    tracing::debug!("Worker {} exiting", id);
}

/// Serve one connection until it is done
fn serve(context: &WorkerContext, stream: TcpStream) {
    let mut connection = match Connection::new(stream) {
        Ok(connection) => connection,
        Err(e) => {
            tracing::warn!("Unable to set up connection: {}", e);
            return;
        }
    };
    if let Err(e) = connection.set_timeouts(context.read_timeout_ms, context.write_timeout_ms) {
        tracing::warn!("Unable to configure {}: {}", connection.peer_addr(), e);
        return;
    }

    tracing::debug!("Serving connection from {}", connection.peer_addr());

    loop {
        let request = match connection.read_request() {
            Ok(request) => request,
            Err(e) if e.is_disconnect() => {
                tracing::debug!("Client {} disconnected", connection.peer_addr());
                return;
            }
            Err(e) if e.is_timeout() => {
                tracing::debug!("Idle timeout for client {}", connection.peer_addr());
                return;
            }
            Err(QuillError::Protocol(reason)) => {
                // A corrupted stream cannot be resynchronized: answer and close.
                tracing::warn!("Protocol error from {}: {}", connection.peer_addr(), reason);
                if let Err(e) = connection.send_response(&Response::proto_error()) {
                    tracing::debug!("Unable to report protocol error: {}", e);
                }
                connection.close();
                return;
            }
            Err(e) => {
                tracing::warn!("Error reading from {}: {}", connection.peer_addr(), e);
                return;
            }
        };

        tracing::trace!(
            "{} {:?} key_len={} from {}",
            if request.command.is_write() { "PUT" } else { "GET" },
            request.options,
            request.key.len(),
            connection.peer_addr()
        );

        let response = execute(context, request);

        if let Err(e) = connection.send_response(&response) {
            if e.is_disconnect() {
                tracing::debug!(
                    "Client {} disconnected before response could be sent: {}",
                    connection.peer_addr(),
                    e
                );
            } else {
                tracing::warn!("Error writing to {}: {}", connection.peer_addr(), e);
            }
            return;
        }

        if !context.keep_alive || context.shutdown.is_triggered() {
            connection.close();
            return;
        }
    }
}

/// Run one request and build its response
fn execute(context: &WorkerContext, request: Request) -> Response {
    match request.command {
        Command::Get => match context.storage.get(request.dbname.as_deref(), &request.key) {
            Ok(Some(value)) => Response::data(value.data, value.compressed),
            Ok(None) => Response::no_data(),
            Err(e) => {
                tracing::error!("Read of {} byte key failed: {}", request.key.len(), e);
                Response::server_error()
            }
        },
        Command::Put => match Mutation::from_request(request) {
            Some((mutation, options)) => Response::code(context.writer.submit(mutation, options)),
            None => Response::proto_error(),
        },
    }
}
