//! Client side of the upload protocol.
//!
//! A [`QueuedSender`] owns one connection to a storage server. Files are
//! queued with [`QueuedSender::enqueue`] and transmitted one at a time, in
//! submission order, by a background worker. [`QueuedSender::close`]
//! drains the queue, ends the session and releases the connection.

mod error;
mod report;
mod sender;
mod worker;

pub use error::SenderError;
pub use report::{FileOutcome, FileReport};
pub use sender::{QueuedSender, SenderState};

use stowage_protocol::DEFAULT_CHUNK_SIZE;

/// Sender configuration.
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Size of the buffer used to stream file bodies.
    pub chunk_size: usize,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}
