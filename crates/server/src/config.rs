use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

use stowage_protocol::DEFAULT_CHUNK_SIZE;

/// Grace period `stop()` waits for in-flight sessions.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind (all interfaces by default).
    pub bind_addr: IpAddr,
    /// TCP port to listen on (0 = OS-assigned).
    pub port: u16,
    /// Directory uploads are written to. Must already exist.
    pub storage_dir: PathBuf,
    /// Capacity of the per-session body buffer.
    pub chunk_size: usize,
    /// Upper bound on concurrently running sessions (`None` = unbounded).
    ///
    /// Connections over the bound are accepted and wait for a free slot.
    pub max_sessions: Option<usize>,
    /// How long `stop()` waits for in-flight sessions.
    pub drain_timeout: Duration,
}

impl ServerConfig {
    pub fn new(port: u16, storage_dir: impl Into<PathBuf>) -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
            storage_dir: storage_dir.into(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_sessions: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = ServerConfig::new(9000, "/srv/files");
        assert_eq!(config.port, 9000);
        assert_eq!(config.storage_dir, PathBuf::from("/srv/files"));
        assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.max_sessions.is_none());
        assert_eq!(config.drain_timeout, Duration::from_secs(5));
        assert!(config.bind_addr.is_unspecified());
    }
}
