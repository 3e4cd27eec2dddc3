//! Structured error types for alpc-logger
//!
//! Using thiserror for automatic Display implementation and error chaining.

use super::CaptureState;
use thiserror::Error;

/// Failure reported by a trace source while opening or releasing its session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Permission denied: {0}")]
    AccessDenied(String),

    #[error("Trace session '{0}' already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Other(String),

    #[error(transparent)]
    Replay(#[from] ReplayError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Invalid engine configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Event buffer capacity must be at least 1")]
    ZeroCapacity,

    #[error("Eviction batch {batch} must be between 1 and the buffer capacity {capacity}")]
    InvalidEvictionBatch { batch: usize, capacity: usize },

    #[error("Pending send bound must be at least 1")]
    ZeroPendingBound,
}

/// Errors surfaced by the capture engine lifecycle
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("Failed to start trace session: {0}")]
    Subscribe(#[source] SessionError),

    #[error("Failed to release trace session: {0}")]
    Release(#[source] SessionError),

    #[error("Cannot {operation} capture engine in state {from}")]
    InvalidTransition { from: CaptureState, operation: &'static str },

    #[error("Capture engine has been disposed")]
    Disposed,

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors reading a recorded session
#[derive(Error, Debug)]
pub enum ReplayError {
    /// Malformed line in a replay or module map file
    #[error("Failed to parse record at line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
