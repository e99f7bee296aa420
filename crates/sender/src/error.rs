//! Error types for the queued sender.

use stowage_protocol::ProtocolError;

/// Errors produced by the queued sender.
#[derive(Debug, thiserror::Error)]
pub enum SenderError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("file ended before its announced size: {0}")]
    FileShrank(String),
}
