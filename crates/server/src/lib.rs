//! TCP storage server.
//!
//! Accepts connections on a listening port and runs one [`Session`] per
//! connection. Each session receives a sequence of uploads and writes them
//! under the storage directory, never overwriting an existing file.

mod config;
mod naming;
mod server;
mod session;
mod space;

pub use config::ServerConfig;
pub use naming::{candidate_name, create_unique, sanitize_file_name};
pub use server::{ServerState, StorageServer};
pub use session::{Session, SessionSummary};
pub use space::{DiskSpace, FixedSpace, FreeSpace, has_room};

use stowage_protocol::{ProtocolError, is_disconnect_kind};

/// Errors produced by the storage server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("invalid storage directory: {0}")]
    InvalidStorage(String),
}

impl ServerError {
    /// Returns `true` if the peer went away mid-exchange.
    pub fn is_disconnect(&self) -> bool {
        match self {
            Self::Protocol(e) => e.is_disconnect(),
            Self::Io(e) => is_disconnect_kind(e.kind()),
            Self::InvalidStorage(_) => false,
        }
    }
}
