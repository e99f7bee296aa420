//! Public handle for the queued sender.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, PoisonError};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::SenderConfig;
use crate::error::SenderError;
use crate::report::FileReport;
use crate::worker::Worker;

/// Lifecycle of a [`QueuedSender`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    /// Accepting files.
    Open = 0,
    /// `close()` called; draining the queue.
    Closing = 1,
    /// Queue drained and session ended.
    Closed = 2,
    /// The connection broke; queued files were abandoned.
    Failed = 3,
}

impl SenderState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Open,
            1 => Self::Closing,
            2 => Self::Closed,
            _ => Self::Failed,
        }
    }
}

pub(crate) fn store_state(state: &AtomicU8, value: SenderState) {
    state.store(value as u8, Ordering::Release);
}

/// Queues files and streams them to one storage server, one at a time.
pub struct QueuedSender {
    queue: std::sync::Mutex<Option<mpsc::UnboundedSender<PathBuf>>>,
    state: Arc<AtomicU8>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl QueuedSender {
    /// Connects to a storage server and starts the transmit worker.
    pub async fn connect(
        addr: impl ToSocketAddrs,
        config: SenderConfig,
    ) -> Result<Self, SenderError> {
        Self::connect_inner(addr, config, None).await
    }

    /// Like [`connect`](Self::connect), additionally delivering one
    /// [`FileReport`] per dequeued file on `reports`.
    pub async fn connect_with_reports(
        addr: impl ToSocketAddrs,
        config: SenderConfig,
        reports: mpsc::UnboundedSender<FileReport>,
    ) -> Result<Self, SenderError> {
        Self::connect_inner(addr, config, Some(reports)).await
    }

    async fn connect_inner(
        addr: impl ToSocketAddrs,
        config: SenderConfig,
        reports: Option<mpsc::UnboundedSender<FileReport>>,
    ) -> Result<Self, SenderError> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true)?;
        let peer = stream.peer_addr()?;
        info!(%peer, "connected to storage server");

        let (reader, writer) = stream.into_split();
        Ok(Self::spawn(reader, writer, &config, reports))
    }

    /// Runs the sender over an already established stream.
    pub fn from_stream<S>(
        stream: S,
        config: SenderConfig,
        reports: Option<mpsc::UnboundedSender<FileReport>>,
    ) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        Self::spawn(reader, writer, &config, reports)
    }

    fn spawn<R, W>(
        reader: R,
        writer: W,
        config: &SenderConfig,
        reports: Option<mpsc::UnboundedSender<FileReport>>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(SenderState::Open as u8));
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = Worker::new(reader, writer, config, Arc::clone(&state), reports);
        let handle = tokio::spawn(worker.run(rx));

        Self {
            queue: std::sync::Mutex::new(Some(tx)),
            state,
            worker: Mutex::new(Some(handle)),
        }
    }

    pub fn state(&self) -> SenderState {
        SenderState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns `true` while files can still be queued.
    pub fn is_open(&self) -> bool {
        self.state() == SenderState::Open
    }

    /// Appends a file to the transmit queue. Never blocks.
    ///
    /// Fails with [`SenderError::ConnectionClosed`] once the sender is
    /// closing or the connection has failed.
    pub fn enqueue(&self, path: impl Into<PathBuf>) -> Result<(), SenderError> {
        let queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_open() {
            return Err(SenderError::ConnectionClosed);
        }

        let tx = queue.as_ref().ok_or(SenderError::ConnectionClosed)?;
        tx.send(path.into()).map_err(|_| SenderError::ConnectionClosed)
    }

    /// Sends every queued file, ends the session and releases the
    /// connection.
    ///
    /// Returns once the worker has exited. Calling `close` again, or on a
    /// failed sender, waits for the same completion and does nothing else.
    pub async fn close(&self) {
        let mut worker = self.worker.lock().await;

        {
            let mut queue = self.queue.lock().unwrap_or_else(PoisonError::into_inner);
            let _ = self.state.compare_exchange(
                SenderState::Open as u8,
                SenderState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            // The worker sees the end of the queue once it is drained.
            queue.take();
        }

        if let Some(handle) = worker.take() {
            if let Err(e) = handle.await {
                error!("sender worker panicked: {e}");
                store_state(&self.state, SenderState::Failed);
            }
        }

        let _ = self.state.compare_exchange(
            SenderState::Closing as u8,
            SenderState::Closed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }
}
