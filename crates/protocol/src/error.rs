//! Error types for the wire protocol.

use std::io::ErrorKind;

/// Errors produced while encoding or decoding frames.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown response code: {0:#04x}")]
    InvalidResponse(u8),

    #[error("file name too long: {0} bytes (max 65535)")]
    NameTooLong(usize),

    #[error("size {0} does not fit the 5-byte size frame")]
    SizeOutOfRange(u64),

    #[error("invalid file name: {0}")]
    InvalidName(String),
}

/// Returns `true` for I/O error kinds that mean the peer went away
/// (EOF, reset, abort, broken pipe).
pub fn is_disconnect_kind(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::UnexpectedEof
            | ErrorKind::ConnectionReset
            | ErrorKind::ConnectionAborted
            | ErrorKind::BrokenPipe
    )
}

impl ProtocolError {
    /// Returns `true` if the peer went away.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Io(e) => is_disconnect_kind(e.kind()),
            _ => false,
        }
    }
}
