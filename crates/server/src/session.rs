//! Receive side of one connection.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use stowage_protocol::{ProtocolError, ResponseCode, SENTINEL_SIZE, is_transferable_size, wire};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::ServerError;
use crate::naming::{create_unique, sanitize_file_name};
use crate::space::{FreeSpace, has_room};

/// Counters for one finished session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionSummary {
    pub files_saved: u64,
    pub files_rejected: u64,
    pub bytes_received: u64,
}

enum State {
    AwaitSize,
    CheckSpace { size: u64 },
    AwaitName { size: u64 },
    Transfer { size: u64, path: PathBuf, file: File },
    Terminate,
}

/// Drives the upload exchange for a single connection until the sender
/// ends the session or a fatal error occurs.
pub struct Session<R, W> {
    reader: R,
    writer: W,
    storage_dir: PathBuf,
    space: Arc<dyn FreeSpace>,
    name_buf: Vec<u8>,
    chunk: Vec<u8>,
    summary: SessionSummary,
}

impl<R, W> Session<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        reader: R,
        writer: W,
        storage_dir: impl Into<PathBuf>,
        space: Arc<dyn FreeSpace>,
        chunk_size: usize,
    ) -> Self {
        Self {
            reader,
            writer,
            storage_dir: storage_dir.into(),
            space,
            name_buf: Vec::new(),
            chunk: vec![0u8; chunk_size.max(1)],
            summary: SessionSummary::default(),
        }
    }

    /// Runs the session to completion.
    ///
    /// Returns the summary once the sender transmits the end-of-session
    /// marker. On a fatal error, `UNKNOWN_ERROR` is sent if the
    /// connection still allows it and the error is returned.
    pub async fn run(mut self) -> Result<SessionSummary, ServerError> {
        let mut state = State::AwaitSize;

        loop {
            state = match state {
                State::Terminate => break,
                state => match self.step(state).await {
                    Ok(next) => next,
                    Err(e) => {
                        self.fail().await;
                        return Err(e);
                    }
                },
            };
        }

        let _ = self.writer.shutdown().await;
        Ok(self.summary)
    }

    async fn step(&mut self, state: State) -> Result<State, ServerError> {
        let next = match state {
            State::AwaitSize => {
                let size = wire::read_size(&mut self.reader).await?;
                if size == SENTINEL_SIZE {
                    debug!("end of session received");
                    State::Terminate
                } else {
                    State::CheckSpace { size }
                }
            }
            State::CheckSpace { size } => {
                if self.admit(size) {
                    wire::write_response(&mut self.writer, ResponseCode::UploadApproved).await?;
                    State::AwaitName { size }
                } else {
                    self.summary.files_rejected += 1;
                    wire::write_response(&mut self.writer, ResponseCode::NotEnoughFreeSpace)
                        .await?;
                    State::AwaitSize
                }
            }
            State::AwaitName { size } => {
                let raw = wire::read_name(&mut self.reader, &mut self.name_buf).await?;
                let name = sanitize_file_name(&raw)
                    .ok_or_else(|| ProtocolError::InvalidName(format!("unusable name {raw:?}")))?;
                let (path, file) = create_unique(&self.storage_dir, &name).await?;
                debug!(path = %path.display(), size, "receiving file");
                State::Transfer { size, path, file }
            }
            State::Transfer { size, path, file } => {
                if let Err(e) = self.receive_body(size, file).await {
                    remove_partial(&path).await;
                    return Err(e);
                }

                self.summary.files_saved += 1;
                self.summary.bytes_received += size;
                info!(path = %path.display(), size, "file saved");

                wire::write_response(&mut self.writer, ResponseCode::FileSaved).await?;
                State::AwaitSize
            }
            State::Terminate => State::Terminate,
        };
        Ok(next)
    }

    fn admit(&self, size: u64) -> bool {
        if !is_transferable_size(size) {
            warn!(size, "upload exceeds maximum file size");
            return false;
        }

        match self.space.free_space(&self.storage_dir) {
            Ok(free) if has_room(free, size) => true,
            Ok(free) => {
                info!(size, free, "not enough free space");
                false
            }
            Err(e) => {
                warn!(dir = %self.storage_dir.display(), "free space probe failed: {e}");
                false
            }
        }
    }

    /// Copies exactly `size` body bytes into `file`, then flushes and syncs.
    async fn receive_body(&mut self, size: u64, mut file: File) -> Result<(), ServerError> {
        let mut remaining = size;

        while remaining > 0 {
            let to_read = remaining.min(self.chunk.len() as u64) as usize;
            let n = self.reader.read(&mut self.chunk[..to_read]).await?;
            if n == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("stream ended with {remaining} body bytes outstanding"),
                )
                .into());
            }
            file.write_all(&self.chunk[..n]).await?;
            remaining -= n as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }

    async fn fail(&mut self) {
        let _ = wire::write_response(&mut self.writer, ResponseCode::UnknownError).await;
        let _ = self.writer.shutdown().await;
    }
}

async fn remove_partial(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        warn!(path = %path.display(), "failed to remove partial file: {e}");
    }
}

#[cfg(test)]
mod tests {
    use stowage_protocol::MAX_FILE_SIZE;

    use super::*;
    use crate::space::{DiskSpace, FixedSpace};

    fn upload(buf: &mut Vec<u8>, name: &str, body: &[u8]) {
        buf.extend_from_slice(&wire::encode_size(body.len() as u64));
        buf.extend_from_slice(&wire::encode_name_len(name.len() as u16));
        buf.extend_from_slice(name.as_bytes());
        buf.extend_from_slice(body);
    }

    fn sentinel(buf: &mut Vec<u8>) {
        buf.extend_from_slice(&wire::encode_size(0));
    }

    async fn run_session(
        dir: &Path,
        space: Arc<dyn FreeSpace>,
        input: &[u8],
    ) -> (Result<SessionSummary, ServerError>, Vec<u8>, usize) {
        let mut reader = input;
        let mut output = Vec::new();
        let result = Session::new(&mut reader, &mut output, dir, space, 4)
            .run()
            .await;
        (result, output, reader.len())
    }

    fn plenty() -> Arc<dyn FreeSpace> {
        Arc::new(FixedSpace(u64::MAX))
    }

    #[tokio::test]
    async fn sentinel_ends_session_without_reading_further() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        sentinel(&mut input);
        input.extend_from_slice(&[9, 9, 9]);

        let (result, output, left) = run_session(dir.path(), plenty(), &input).await;

        assert_eq!(result.unwrap(), SessionSummary::default());
        assert!(output.is_empty());
        assert_eq!(left, 3);
    }

    #[tokio::test]
    async fn saves_single_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        upload(&mut input, "hello.txt", b"hello world");
        sentinel(&mut input);

        let (result, output, _) = run_session(dir.path(), plenty(), &input).await;

        let summary = result.unwrap();
        assert_eq!(summary.files_saved, 1);
        assert_eq!(summary.bytes_received, 11);
        assert_eq!(output, [0u8, 2]);
        assert_eq!(std::fs::read(dir.path().join("hello.txt")).unwrap(), b"hello world");
    }

    #[tokio::test]
    async fn back_to_back_files_are_not_over_read() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        upload(&mut input, "a.txt", b"hello");
        upload(&mut input, "b.txt", b"world!");
        sentinel(&mut input);

        let (result, output, left) = run_session(dir.path(), plenty(), &input).await;

        let summary = result.unwrap();
        assert_eq!(summary.files_saved, 2);
        assert_eq!(summary.bytes_received, 11);
        assert_eq!(output, [0u8, 2, 0, 2]);
        assert_eq!(left, 0);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hello");
        assert_eq!(std::fs::read(dir.path().join("b.txt")).unwrap(), b"world!");
    }

    #[tokio::test]
    async fn free_space_equal_to_size_is_rejected_then_smaller_accepted() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        input.extend_from_slice(&wire::encode_size(10));
        upload(&mut input, "small.bin", &[7u8; 9]);
        sentinel(&mut input);

        let (result, output, _) = run_session(dir.path(), Arc::new(FixedSpace(10)), &input).await;

        let summary = result.unwrap();
        assert_eq!(summary.files_rejected, 1);
        assert_eq!(summary.files_saved, 1);
        assert_eq!(output, [1u8, 0, 2]);
        assert_eq!(std::fs::read(dir.path().join("small.bin")).unwrap(), [7u8; 9]);
    }

    #[test]
    fn oversize_upload_is_not_admitted() {
        let dir = tempfile::tempdir().unwrap();
        let session = Session::new(&b""[..], Vec::new(), dir.path(), plenty(), 4);
        assert!(!session.admit(MAX_FILE_SIZE));
        assert!(session.admit(MAX_FILE_SIZE - 1));
    }

    #[tokio::test]
    async fn probe_failure_rejects_and_session_continues() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing");
        let mut input = Vec::new();
        input.extend_from_slice(&wire::encode_size(5));
        sentinel(&mut input);

        let (result, output, _) = run_session(&missing, Arc::new(DiskSpace), &input).await;

        assert_eq!(result.unwrap().files_rejected, 1);
        assert_eq!(output, [1u8]);
    }

    #[tokio::test]
    async fn existing_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"keep").unwrap();
        let mut input = Vec::new();
        upload(&mut input, "a.txt", b"new");
        upload(&mut input, "a.txt", b"newer");
        sentinel(&mut input);

        let (result, _, _) = run_session(dir.path(), plenty(), &input).await;

        assert_eq!(result.unwrap().files_saved, 2);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"keep");
        assert_eq!(std::fs::read(dir.path().join("a (1).txt")).unwrap(), b"new");
        assert_eq!(std::fs::read(dir.path().join("a (2).txt")).unwrap(), b"newer");
    }

    #[tokio::test]
    async fn path_components_in_name_are_stripped() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        upload(&mut input, "../escape.txt", b"data");
        sentinel(&mut input);

        let (result, _, _) = run_session(dir.path(), plenty(), &input).await;

        assert_eq!(result.unwrap().files_saved, 1);
        assert!(dir.path().join("escape.txt").exists());
    }

    #[tokio::test]
    async fn invalid_utf8_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        input.extend_from_slice(&wire::encode_size(3));
        input.extend_from_slice(&wire::encode_name_len(2));
        input.extend_from_slice(&[0xff, 0xfe]);
        input.extend_from_slice(b"abc");

        let (result, output, _) = run_session(dir.path(), plenty(), &input).await;

        assert!(matches!(
            result,
            Err(ServerError::Protocol(ProtocolError::InvalidName(_)))
        ));
        assert_eq!(output, [0u8, 3]);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn dot_dot_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        upload(&mut input, "..", b"abc");

        let (result, output, _) = run_session(dir.path(), plenty(), &input).await;

        assert!(result.is_err());
        assert_eq!(output, [0u8, 3]);
    }

    #[tokio::test]
    async fn truncated_body_removes_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        input.extend_from_slice(&wire::encode_size(10));
        input.extend_from_slice(&wire::encode_name_len(5));
        input.extend_from_slice(b"a.txt");
        input.extend_from_slice(b"abcd");

        let (result, output, _) = run_session(dir.path(), plenty(), &input).await;

        let err = result.unwrap_err();
        assert!(err.is_disconnect());
        assert_eq!(output, [0u8, 3]);
        assert!(!dir.path().join("a.txt").exists());
    }

    #[tokio::test]
    async fn eof_before_sentinel_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut input = Vec::new();
        upload(&mut input, "a.txt", b"hi");

        let (result, output, _) = run_session(dir.path(), plenty(), &input).await;

        assert!(result.unwrap_err().is_disconnect());
        assert_eq!(output, [0u8, 2, 3]);
        assert_eq!(std::fs::read(dir.path().join("a.txt")).unwrap(), b"hi");
    }

    #[tokio::test]
    async fn works_over_duplex_stream() {
        let dir = tempfile::tempdir().unwrap();
        let (client, server) = tokio::io::duplex(64);
        let (read_half, write_half) = tokio::io::split(server);
        let session = Session::new(read_half, write_half, dir.path(), plenty(), 16);
        let handle = tokio::spawn(session.run());

        let (mut client_rx, mut client_tx) = tokio::io::split(client);
        wire::write_size(&mut client_tx, 300).await.unwrap();
        client_tx.flush().await.unwrap();
        assert_eq!(
            wire::read_response(&mut client_rx).await.unwrap(),
            ResponseCode::UploadApproved
        );
        wire::write_name(&mut client_tx, "big.bin").await.unwrap();
        client_tx.write_all(&[5u8; 300]).await.unwrap();
        client_tx.flush().await.unwrap();
        assert_eq!(
            wire::read_response(&mut client_rx).await.unwrap(),
            ResponseCode::FileSaved
        );
        wire::write_sentinel(&mut client_tx).await.unwrap();
        client_tx.flush().await.unwrap();

        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.bytes_received, 300);
        assert_eq!(std::fs::read(dir.path().join("big.bin")).unwrap(), [5u8; 300]);
    }
}
