//! Error types for QuillKV
//!
//! Provides a unified error type for all operations, plus the mapping from
//! fatal startup failures to process exit codes.

use thiserror::Error;

/// Result type alias using QuillError
pub type Result<T> = std::result::Result<T, QuillError>;

/// Unified error type for QuillKV operations
#[derive(Debug, Error)]
pub enum QuillError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // WAL Errors
    // -------------------------------------------------------------------------
    #[error("WAL corruption detected: {0}")]
    WalCorruption(String),

    #[error("WAL write failed: {0}")]
    WalWrite(String),

    // -------------------------------------------------------------------------
    // Storage Errors
    // -------------------------------------------------------------------------
    #[error("Storage error: {0}")]
    Storage(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Protocol Errors
    // -------------------------------------------------------------------------
    #[error("Protocol error: {0}")]
    Protocol(String),

    // -------------------------------------------------------------------------
    // Startup Errors (fatal, each maps to a distinct exit code)
    // -------------------------------------------------------------------------
    #[error("Unable to open storage: {0}")]
    StorageOpen(String),

    #[error("Unable to bind listening socket on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Unable to start write serializer: {0}")]
    WriterStartup(String),

    #[error("Unable to set up listening socket: {0}")]
    Listen(String),

    #[error("No connection worker could be started")]
    NoWorkers,
}

impl QuillError {
    /// Process exit status for an error that aborts the server.
    pub fn exit_code(&self) -> i32 {
        match self {
            QuillError::StorageOpen(_) => 1,
            QuillError::Bind { .. } => 2,
            QuillError::WriterStartup(_) => 3,
            QuillError::Listen(_) => 4,
            QuillError::NoWorkers => 5,
            _ => 1,
        }
    }

    /// True for errors that mean the peer went away rather than misbehaved.
    pub fn is_disconnect(&self) -> bool {
        match self {
            QuillError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }

    /// True for read/write timeouts (Windows reports TimedOut, Unix WouldBlock).
    pub fn is_timeout(&self) -> bool {
        match self {
            QuillError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

impl From<bincode::Error> for QuillError {
    fn from(e: bincode::Error) -> Self {
        QuillError::Serialization(e.to_string())
    }
}
