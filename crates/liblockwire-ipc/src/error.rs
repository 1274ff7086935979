//! IPC error types

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Errors that can occur during lock signalling
#[derive(Error, Debug)]
pub enum IpcError {
    /// The communicator socket could not be bound
    #[error("Failed to bind lock communicator to {address}: {source}")]
    Bind {
        address: SocketAddr,
        #[source]
        source: io::Error,
    },

    /// Unexpected socket failure while not stopped
    #[error("{context}: {source}")]
    Communication {
        context: String,
        #[source]
        source: io::Error,
    },

    /// The operation was interrupted by an intentional stop
    #[error("Lock communicator stopped")]
    GracefullyStopped,

    /// The contention listener gave up on its socket without being stopped
    #[error("Lock contention listener is no longer running")]
    ListenerFailed,

    /// Inbound datagram is not a valid lock packet
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Owner record file is unreadable
    #[error("Owner record error: {0}")]
    RecordFile(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl IpcError {
    pub(crate) fn communication(context: impl Into<String>, source: io::Error) -> Self {
        IpcError::Communication {
            context: context.into(),
            source,
        }
    }

    /// True when the error only reports that `stop()` was called
    pub fn is_graceful_stop(&self) -> bool {
        matches!(self, IpcError::GracefullyStopped)
    }

    /// Kind of the underlying socket error, if this is a communication failure
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            IpcError::Bind { source, .. } | IpcError::Communication { source, .. } => {
                Some(source.kind())
            }
            IpcError::Io(e) => Some(e.kind()),
            _ => None,
        }
    }

    /// Get the error code for JSON output
    pub fn error_code(&self) -> &'static str {
        match self {
            IpcError::Bind { .. } => codes::BIND_FAILED,
            IpcError::Communication { .. } => codes::COMMUNICATION,
            IpcError::GracefullyStopped => codes::STOPPED,
            IpcError::ListenerFailed => codes::LISTENER_FAILED,
            IpcError::Decode(_) => codes::DECODE,
            IpcError::RecordFile(_) | IpcError::Json(_) => codes::RECORD,
            IpcError::Io(_) => codes::IO_ERROR,
        }
    }
}

/// Reasons an inbound datagram is rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("packet truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("packet oversized: expected {expected} bytes, got {actual}")]
    Oversized { expected: usize, actual: usize },

    #[error("unsupported packet version {0}")]
    UnsupportedVersion(u8),

    #[error("unknown message kind tag {0}")]
    UnknownKind(u8),
}

/// Error codes for JSON output
pub mod codes {
    pub const BIND_FAILED: &str = "bind_failed";
    pub const COMMUNICATION: &str = "communication_failed";
    pub const STOPPED: &str = "stopped";
    pub const LISTENER_FAILED: &str = "listener_failed";
    pub const DECODE: &str = "decode_error";
    pub const RECORD: &str = "record_error";
    pub const IO_ERROR: &str = "io_error";
}
