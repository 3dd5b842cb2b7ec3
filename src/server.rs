//! Server Lifecycle
//!
//! Startup order: open storage → write serializer → worker pool → listener.
//! Shutdown order: stop accepting → workers finish their connections →
//! serializer drains its queue → storage is closed once.
//!
//! ```text
//! INITIALIZING ──start()──► RUNNING ──shutdown signal──► DRAINING ──wait()──► STOPPED
//! ```

use std::net::{SocketAddr, TcpStream};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::bounded;

use crate::config::Config;
use crate::error::{QuillError, Result};
use crate::network::{Listener, WorkerContext, WorkerPool};
use crate::shutdown::Shutdown;
use crate::storage::{StorageHandle, Store};
use crate::writer::{LogReplicator, Replicator, WriteSerializer, WriterStats};

/// Lifecycle states of a server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ServerState {
    Initializing = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

#[derive(Debug)]
struct StateCell(AtomicU8);

impl StateCell {
    fn new(state: ServerState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    fn set(&self, state: ServerState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    fn get(&self) -> ServerState {
        match self.0.load(Ordering::SeqCst) {
            0 => ServerState::Initializing,
            1 => ServerState::Running,
            2 => ServerState::Draining,
            _ => ServerState::Stopped,
        }
    }
}

/// A server that has opened its storage but not started serving
pub struct Server {
    config: Config,
    storage: Arc<dyn StorageHandle>,
    replicator: Arc<dyn Replicator>,
    shutdown: Shutdown,
    state: Arc<StateCell>,
}

impl Server {
    /// Open the bundled store in `config.data_dir`
    pub fn open(config: Config) -> Result<Self> {
        let store = Store::open(&config).map_err(|e| QuillError::StorageOpen(e.to_string()))?;
        tracing::info!("Storage opened at {}", config.data_dir.display());
        Ok(Self::with_storage(config, Arc::new(store)))
    }

    /// Serve an already opened storage handle
    pub fn with_storage(config: Config, storage: Arc<dyn StorageHandle>) -> Self {
        Self {
            config,
            storage,
            replicator: Arc::new(LogReplicator),
            shutdown: Shutdown::new(),
            state: Arc::new(StateCell::new(ServerState::Initializing)),
        }
    }

    /// Replace the replication hook
    pub fn with_replicator(mut self, replicator: Arc<dyn Replicator>) -> Self {
        self.replicator = replicator;
        self
    }

    /// Signal that stops this server once started
    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Start and serve until the shutdown signal, then drain
    pub fn run(self) -> Result<()> {
        self.start()?.wait().map(|_| ())
    }

    /// Start every component in order
    ///
    /// On failure everything already started is stopped again and the
    /// storage is closed before the error is returned.
    pub fn start(self) -> Result<RunningServer> {
        let Server {
            config,
            storage,
            replicator,
            shutdown,
            state,
        } = self;

        // Write serializer
        let (writer, writer_thread) = match WriteSerializer::start(
            Arc::clone(&storage),
            replicator,
            config.write_queue_capacity,
        ) {
            Ok(started) => started,
            Err(e) => {
                close_storage(storage.as_ref());
                return Err(e);
            }
        };

        // Worker pool
        let (dispatch, connections) = bounded::<TcpStream>(config.dispatch_capacity);
        let context = WorkerContext {
            storage: Arc::clone(&storage),
            writer,
            shutdown: shutdown.clone(),
            read_timeout_ms: config.read_timeout_ms,
            write_timeout_ms: config.write_timeout_ms,
            keep_alive: config.keep_alive,
        };
        let pool = match WorkerPool::spawn(config.workers, connections, context) {
            Ok(pool) => pool,
            Err(e) => {
                drop(dispatch);
                abort_startup(None, writer_thread, storage.as_ref());
                return Err(e);
            }
        };

        // Listener
        let poll_interval = Duration::from_millis(config.accept_poll_ms.max(1));
        let listener = match Listener::bind(&config.listen_addr, poll_interval) {
            Ok(listener) => listener,
            Err(e) => {
                drop(dispatch);
                abort_startup(Some(pool), writer_thread, storage.as_ref());
                return Err(e);
            }
        };
        let local_addr = listener.local_addr();
        let listener_thread = match listener.spawn(dispatch, shutdown.clone()) {
            Ok(thread) => thread,
            Err(e) => {
                abort_startup(Some(pool), writer_thread, storage.as_ref());
                return Err(e);
            }
        };

        state.set(ServerState::Running);
        tracing::info!("Server running on {} with {} workers", local_addr, pool.size());

        Ok(RunningServer {
            local_addr,
            shutdown,
            state,
            storage,
            listener_thread,
            pool,
            writer_thread,
        })
    }
}

/// Stop components started before a fatal startup error
///
/// The dispatch sender must already be dropped so the workers can exit.
fn abort_startup(pool: Option<WorkerPool>, writer_thread: JoinHandle<WriterStats>, storage: &dyn StorageHandle) {
    if let Some(pool) = pool {
        pool.join();
    }
    if writer_thread.join().is_err() {
        tracing::error!("Write serializer terminated abnormally");
    }
    close_storage(storage);
}

fn close_storage(storage: &dyn StorageHandle) {
    if let Err(e) = storage.close() {
        tracing::error!("Unable to close storage: {}", e);
    }
}

/// A started server
pub struct RunningServer {
    local_addr: SocketAddr,
    shutdown: Shutdown,
    state: Arc<StateCell>,
    storage: Arc<dyn StorageHandle>,
    listener_thread: JoinHandle<u64>,
    pool: WorkerPool,
    writer_thread: JoinHandle<WriterStats>,
}

impl RunningServer {
    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn shutdown_handle(&self) -> Shutdown {
        self.shutdown.clone()
    }

    pub fn state(&self) -> ServerState {
        self.state.get()
    }

    /// Workers currently serving a connection
    pub fn busy_workers(&self) -> usize {
        self.pool.busy_workers()
    }

    /// Workers whose loop is still running
    pub fn live_workers(&self) -> usize {
        self.pool.live_workers()
    }

    /// Connections fully handled since startup
    pub fn connections_served(&self) -> u64 {
        self.pool.connections_served()
    }

    /// Trigger shutdown and wait for the drain to finish
    pub fn shutdown(self) -> Result<WriterStats> {
        self.shutdown.trigger();
        self.wait()
    }

    /// Block until the shutdown signal, then drain in order
    pub fn wait(self) -> Result<WriterStats> {
        let RunningServer {
            state,
            storage,
            listener_thread,
            pool,
            writer_thread,
            ..
        } = self;

        // The listener returns only once the signal is seen.
        if listener_thread.join().is_err() {
            tracing::error!("Listener terminated abnormally");
        }
        state.set(ServerState::Draining);
        tracing::info!("Draining in-flight connections and writes");

        // Workers finish queued connections, then release their write handles.
        pool.join();

        let stats = match writer_thread.join() {
            Ok(stats) => stats,
            Err(_) => {
                tracing::error!("Write serializer terminated abnormally");
                WriterStats::default()
            }
        };

        let closed = storage.close();
        state.set(ServerState::Stopped);
        closed?;

        tracing::info!(
            "Server stopped: {} writes applied, {} failed",
            stats.applied,
            stats.failed
        );
        Ok(stats)
    }
}
