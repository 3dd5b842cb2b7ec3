//! TCP Listener
//!
//! Accepts connections and hands them to the worker pool.

use std::io;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Sender;

use crate::error::{QuillError, Result};
use crate::shutdown::Shutdown;

/// Owns the bound listening socket
pub struct Listener {
    listener: TcpListener,
    local_addr: SocketAddr,

    /// Pause between accept attempts when no connection is pending
    poll_interval: Duration,
}

impl Listener {
    /// Bind the listening socket
    ///
    /// Fails with `Bind` when the address is unavailable and with `Listen`
    /// when the bound socket cannot be configured.
    pub fn bind(addr: &str, poll_interval: Duration) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| QuillError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        // Non-blocking accept lets the loop notice the shutdown signal.
        listener
            .set_nonblocking(true)
            .map_err(|e| QuillError::Listen(e.to_string()))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| QuillError::Listen(e.to_string()))?;

        Ok(Self {
            listener,
            local_addr,
            poll_interval,
        })
    }

    /// Address actually bound (resolves port 0)
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run the accept loop on its own thread
    pub fn spawn(self, dispatch: Sender<TcpStream>, shutdown: Shutdown) -> Result<JoinHandle<u64>> {
        thread::Builder::new()
            .name("listener".to_string())
            .spawn(move || self.accept_loop(dispatch, shutdown))
            .map_err(|e| QuillError::Listen(e.to_string()))
    }

    /// Accept until shutdown is signaled; returns the number of connections dispatched
    ///
    /// A full dispatch channel blocks the handoff, so connections wait for a
    /// worker instead of being dropped. Returning drops `dispatch`, which lets
    /// the workers drain what is queued and exit.
    pub fn accept_loop(self, dispatch: Sender<TcpStream>, shutdown: Shutdown) -> u64 {
        tracing::info!("Listening on {}", self.local_addr);
        let mut dispatched = 0u64;

        while !shutdown.is_triggered() {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    if let Err(e) = stream.set_nonblocking(false) {
                        tracing::warn!("Dropping connection from {}: {}", peer, e);
                        continue;
                    }
                    tracing::debug!("Accepted connection from {}", peer);

                    if dispatch.send(stream).is_err() {
                        tracing::warn!("Worker pool is gone, listener stopping");
                        break;
                    }
                    dispatched += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.poll_interval);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(self.poll_interval);
                }
            }
        }

        tracing::info!("Listener stopped after dispatching {} connections", dispatched);
        dispatched
    }
}
