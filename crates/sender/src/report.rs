use std::path::PathBuf;

use stowage_protocol::ResponseCode;

/// What happened to one queued file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// The server stored the file.
    Saved { bytes: u64 },
    /// The server declined the upload before the body was sent.
    Rejected(ResponseCode),
    /// The file could not be offered; nothing was written to the connection.
    Skipped(String),
    /// The transfer did not complete.
    Failed(String),
}

impl FileOutcome {
    pub fn is_saved(&self) -> bool {
        matches!(self, Self::Saved { .. })
    }
}

/// Outcome for a dequeued file, delivered on the report channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileReport {
    pub path: PathBuf,
    pub outcome: FileOutcome,
}
