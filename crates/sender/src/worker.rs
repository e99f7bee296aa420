//! Background task that owns the connection and transmits queued files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicU8;

use stowage_protocol::{MAX_NAME_LEN, ResponseCode, is_transferable_size, wire};
use tokio::fs::File;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::SenderConfig;
use crate::error::SenderError;
use crate::report::{FileOutcome, FileReport};
use crate::sender::{SenderState, store_state};

/// A local file that passed pre-flight checks.
struct LocalFile {
    file: File,
    name: String,
    size: u64,
}

/// Checks that `path` can be offered to the server and opens it.
///
/// Returns the reason as text when the file must be skipped.
async fn open_local(path: &Path) -> Result<LocalFile, String> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| format!("cannot read metadata: {e}"))?;
    if !meta.is_file() {
        return Err("not a regular file".into());
    }

    let size = meta.len();
    if size == 0 {
        return Err("empty files cannot be sent".into());
    }
    if !is_transferable_size(size) {
        return Err(format!("file too large ({size} bytes)"));
    }

    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| "file name is not valid UTF-8".to_string())?;
    if name.len() > MAX_NAME_LEN {
        return Err(format!("file name too long ({} bytes)", name.len()));
    }

    let file = File::open(path)
        .await
        .map_err(|e| format!("cannot open file: {e}"))?;

    Ok(LocalFile {
        file,
        name: name.to_owned(),
        size,
    })
}

pub(crate) struct Worker<R, W> {
    reader: R,
    writer: BufWriter<W>,
    chunk: Vec<u8>,
    state: Arc<AtomicU8>,
    reports: Option<mpsc::UnboundedSender<FileReport>>,
}

impl<R, W> Worker<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub(crate) fn new(
        reader: R,
        writer: W,
        config: &SenderConfig,
        state: Arc<AtomicU8>,
        reports: Option<mpsc::UnboundedSender<FileReport>>,
    ) -> Self {
        let chunk_size = config.chunk_size.max(1);
        Self {
            reader,
            writer: BufWriter::with_capacity(chunk_size, writer),
            chunk: vec![0u8; chunk_size],
            state,
            reports,
        }
    }

    /// Transmits queued files until the queue is closed and drained, then
    /// ends the session.
    pub(crate) async fn run(mut self, mut queue: mpsc::UnboundedReceiver<PathBuf>) {
        while let Some(path) = queue.recv().await {
            match self.send_file(&path).await {
                Ok(outcome) => self.report(path, outcome),
                Err(e) => {
                    error!(path = %path.display(), "connection failed: {e}");
                    store_state(&self.state, SenderState::Failed);
                    queue.close();

                    let reason = e.to_string();
                    self.report(path, FileOutcome::Failed(reason.clone()));
                    while let Ok(path) = queue.try_recv() {
                        self.report(path, FileOutcome::Failed(format!("not sent: {reason}")));
                    }
                    return;
                }
            }
        }

        if let Err(e) = self.finish().await {
            warn!("failed to end session: {e}");
            store_state(&self.state, SenderState::Failed);
            return;
        }
        debug!("session ended");
    }

    /// Runs the upload exchange for one file.
    ///
    /// `Err` means the connection is no longer usable.
    async fn send_file(&mut self, path: &Path) -> Result<FileOutcome, SenderError> {
        let mut local = match open_local(path).await {
            Ok(local) => local,
            Err(reason) => {
                warn!(path = %path.display(), "skipping file: {reason}");
                return Ok(FileOutcome::Skipped(reason));
            }
        };

        wire::write_size(&mut self.writer, local.size).await?;
        self.writer.flush().await?;

        let admission = wire::read_response(&mut self.reader).await?;
        if admission != ResponseCode::UploadApproved {
            info!(path = %path.display(), size = local.size, %admission, "upload rejected");
            return Ok(FileOutcome::Rejected(admission));
        }

        wire::write_name(&mut self.writer, &local.name).await?;
        self.write_body(&mut local.file, local.size, path).await?;
        self.writer.flush().await?;

        match wire::read_response(&mut self.reader).await? {
            ResponseCode::FileSaved => {
                info!(path = %path.display(), size = local.size, "file sent");
                Ok(FileOutcome::Saved { bytes: local.size })
            }
            code => {
                warn!(path = %path.display(), %code, "server did not save file");
                Ok(FileOutcome::Failed(format!("server answered {code}")))
            }
        }
    }

    /// Streams exactly `size` bytes of `file`.
    async fn write_body(&mut self, file: &mut File, size: u64, path: &Path) -> Result<(), SenderError> {
        let mut remaining = size;

        while remaining > 0 {
            let to_read = remaining.min(self.chunk.len() as u64) as usize;
            let n = file.read(&mut self.chunk[..to_read]).await?;
            if n == 0 {
                return Err(SenderError::FileShrank(path.display().to_string()));
            }
            self.writer.write_all(&self.chunk[..n]).await?;
            remaining -= n as u64;
        }
        Ok(())
    }

    async fn finish(&mut self) -> Result<(), SenderError> {
        wire::write_sentinel(&mut self.writer).await?;
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    fn report(&self, path: PathBuf, outcome: FileOutcome) {
        if let Some(tx) = &self.reports {
            let _ = tx.send(FileReport { path, outcome });
        }
    }
}
