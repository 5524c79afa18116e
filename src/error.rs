//! Error types shared across the layout pipeline
//!
//! Data problems (dangling links, duplicate ids) and numeric degeneracies are
//! absorbed where they happen and only logged. What reaches the caller through
//! these types is either a broken protocol contract or a loader failure.

use thiserror::Error;

use crate::buffer::PositionBuffer;

/// Errors surfaced by the layout pipeline
#[derive(Error, Debug)]
pub enum LayoutError {
    /// A buffer request arrived before the simulation was built
    #[error("simulation has not been initialized")]
    NotInitialized,

    /// A second buffer request was issued while one is still outstanding
    #[error("a position buffer request is already in flight")]
    RequestInFlight,

    /// A node id that is not part of the current graph
    #[error("unknown node: {0}")]
    UnknownNode(String),

    /// `drag_move`/`drag_end` without a preceding `drag_start`
    #[error("no drag in progress")]
    NoActiveDrag,

    /// The simulation worker thread has gone away
    #[error("simulation worker disconnected")]
    WorkerDisconnected,

    /// A configuration value is out of range
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The file format is not supported
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// An I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A parsing error occurred
    #[error("parse error: {0}")]
    Parse(String),
}

/// Result type for layout operations
pub type LayoutResult<T> = Result<T, LayoutError>;

/// Errors returned by the simulation host
///
/// Rejections hand the buffer back so ownership always returns to the caller.
#[derive(Error, Debug)]
pub enum HostError {
    /// `update_buffers` was called before `create_simulation`
    #[error("simulation has not been initialized")]
    NotInitialized(PositionBuffer),
}

impl HostError {
    /// Recover the buffer carried by the rejection
    pub fn into_buffer(self) -> PositionBuffer {
        match self {
            HostError::NotInitialized(buffer) => buffer,
        }
    }
}

impl From<HostError> for LayoutError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::NotInitialized(_) => LayoutError::NotInitialized,
        }
    }
}
