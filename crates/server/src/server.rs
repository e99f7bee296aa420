//! Listener and connection dispatcher.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use crate::ServerError;
use crate::config::ServerConfig;
use crate::session::Session;
use crate::space::{DiskSpace, FreeSpace};

/// Lifecycle of a [`StorageServer`].
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    Created = 0,
    Running = 1,
    Stopping = 2,
    Stopped = 3,
}

impl ServerState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Created,
            1 => Self::Running,
            2 => Self::Stopping,
            _ => Self::Stopped,
        }
    }
}

struct Running {
    cancel: CancellationToken,
    tracker: TaskTracker,
    accept_task: JoinHandle<()>,
    local_addr: SocketAddr,
}

/// Receives uploads on a TCP port and stores them in a directory.
pub struct StorageServer {
    config: ServerConfig,
    space: Arc<dyn FreeSpace>,
    state: AtomicU8,
    running: Mutex<Option<Running>>,
}

impl StorageServer {
    /// Creates a server for `config`. The storage directory must exist.
    pub fn new(config: ServerConfig) -> Result<Self, ServerError> {
        let dir = &config.storage_dir;
        match std::fs::metadata(dir) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ServerError::InvalidStorage(format!(
                    "{} is not a directory",
                    dir.display()
                )));
            }
            Err(e) => {
                return Err(ServerError::InvalidStorage(format!("{}: {e}", dir.display())));
            }
        }

        Ok(Self {
            config,
            space: Arc::new(DiskSpace),
            state: AtomicU8::new(ServerState::Created as u8),
            running: Mutex::new(None),
        })
    }

    /// Replaces the free-space probe used for admission.
    pub fn with_space(mut self, space: Arc<dyn FreeSpace>) -> Self {
        self.space = space;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn state(&self) -> ServerState {
        ServerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Returns the bound address while the server is running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        self.running.lock().await.as_ref().map(|r| r.local_addr)
    }

    /// Binds the listening socket and starts accepting connections.
    ///
    /// Calling `start` on a running server returns the current address.
    /// A stopped server can be started again.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        let mut running = self.running.lock().await;
        if let Some(r) = running.as_ref() {
            return Ok(r.local_addr);
        }

        let addr = SocketAddr::new(self.config.bind_addr, self.config.port);
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;

        let cancel = CancellationToken::new();
        let tracker = TaskTracker::new();
        let dispatcher = Dispatcher {
            storage_dir: self.config.storage_dir.clone(),
            space: Arc::clone(&self.space),
            chunk_size: self.config.chunk_size,
            limit: self.config.max_sessions.map(|n| Arc::new(Semaphore::new(n.max(1)))),
            cancel: cancel.clone(),
            tracker: tracker.clone(),
        };
        let accept_task = tokio::spawn(accept_loop(listener, dispatcher));

        *running = Some(Running {
            cancel,
            tracker,
            accept_task,
            local_addr,
        });
        self.set_state(ServerState::Running);
        info!(%local_addr, dir = %self.config.storage_dir.display(), "storage server listening");

        Ok(local_addr)
    }

    /// Stops accepting connections and waits for in-flight sessions.
    ///
    /// Waits at most `drain_timeout`; sessions still running after that
    /// are left to finish on their own. Calling `stop` on a server that
    /// is not running does nothing.
    pub async fn stop(&self) {
        let mut running = self.running.lock().await;
        let Some(r) = running.take() else {
            return;
        };

        self.set_state(ServerState::Stopping);
        r.cancel.cancel();
        if let Err(e) = r.accept_task.await {
            warn!("accept loop ended abnormally: {e}");
        }

        r.tracker.close();
        let drain = tokio::time::timeout(self.config.drain_timeout, r.tracker.wait()).await;
        if drain.is_err() {
            warn!(sessions = r.tracker.len(), "drain timeout elapsed with sessions still running");
        }

        self.set_state(ServerState::Stopped);
        info!("storage server stopped");
    }

    fn set_state(&self, state: ServerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

impl Drop for StorageServer {
    fn drop(&mut self) {
        if let Some(r) = self.running.get_mut() {
            r.cancel.cancel();
        }
    }
}

/// Everything the accept loop needs to start a session.
struct Dispatcher {
    storage_dir: PathBuf,
    space: Arc<dyn FreeSpace>,
    chunk_size: usize,
    limit: Option<Arc<Semaphore>>,
    cancel: CancellationToken,
    tracker: TaskTracker,
}

impl Dispatcher {
    /// Builds the session for one connection.
    ///
    /// The read half is used as is: a buffered reader could pull bytes
    /// past the end-of-session marker off the socket.
    fn session<R, W>(&self, reader: R, writer: W) -> Session<R, W>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        Session::new(
            reader,
            writer,
            self.storage_dir.clone(),
            Arc::clone(&self.space),
            self.chunk_size,
        )
    }

    fn dispatch(&self, stream: TcpStream, peer: SocketAddr) {
        let (read_half, write_half) = stream.into_split();
        let session = self.session(read_half, write_half);
        let limit = self.limit.clone();
        let cancel = self.cancel.clone();

        self.tracker.spawn(async move {
            let _permit = match limit {
                Some(sem) => tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(%peer, "server stopping, dropping queued connection");
                        return;
                    }
                    permit = sem.acquire_owned() => match permit {
                        Ok(permit) => Some(permit),
                        Err(_) => return,
                    },
                },
                None => None,
            };

            debug!(%peer, "session started");
            match session.run().await {
                Ok(summary) => info!(
                    %peer,
                    files_saved = summary.files_saved,
                    files_rejected = summary.files_rejected,
                    bytes_received = summary.bytes_received,
                    "session finished"
                ),
                Err(e) if e.is_disconnect() => warn!(%peer, "peer disconnected: {e}"),
                Err(e) => error!(%peer, "session error: {e}"),
            }
        });
    }
}

async fn accept_loop(listener: TcpListener, dispatcher: Dispatcher) {
    loop {
        tokio::select! {
            _ = dispatcher.cancel.cancelled() => break,

            result = listener.accept() => match result {
                Ok((stream, peer)) => dispatcher.dispatch(stream, peer),
                Err(e) => {
                    if dispatcher.cancel.is_cancelled() {
                        break;
                    }
                    error!("accept error: {e}");
                }
            },
        }
    }
    debug!("accept loop exited");
}
