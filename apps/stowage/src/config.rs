//! Optional TOML tuning file.
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0"
//! chunk_size = 65536
//! max_sessions = 16
//! drain_timeout_secs = 5
//!
//! [sender]
//! chunk_size = 65536
//! ```
//!
//! Every key is optional. Port and storage directory come from the
//! command line.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use stowage_protocol::DEFAULT_CHUNK_SIZE;
use stowage_sender::SenderConfig;
use stowage_server::ServerConfig;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub sender: SenderSection,
}

/// `[server]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    /// Address the listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Body buffer size per session.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Concurrent session limit (unbounded if absent).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_sessions: Option<usize>,

    /// Seconds `stop` waits for in-flight sessions.
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// `[sender]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderSection {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_drain_timeout_secs() -> u64 {
    5
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            chunk_size: default_chunk_size(),
            max_sessions: None,
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl Default for SenderSection {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
        }
    }
}

impl Config {
    /// Reads `path` if given, otherwise returns the defaults.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;

        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    pub fn server_config(&self, port: u16, storage_dir: PathBuf) -> ServerConfig {
        let mut config = ServerConfig::new(port, storage_dir);
        config.bind_addr = self.server.bind_addr;
        config.chunk_size = self.server.chunk_size;
        config.max_sessions = self.server.max_sessions;
        config.drain_timeout = Duration::from_secs(self.server.drain_timeout_secs);
        config
    }

    pub fn sender_config(&self) -> SenderConfig {
        SenderConfig {
            chunk_size: self.sender.chunk_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.server.bind_addr.is_unspecified());
        assert_eq!(config.server.chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(config.server.max_sessions.is_none());
        assert_eq!(config.server.drain_timeout_secs, 5);
        assert_eq!(config.sender.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(config.sender.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn partial_toml() {
        let toml_str = r#"
            [server]
            max_sessions = 4
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.server.max_sessions, Some(4));
        assert_eq!(config.server.drain_timeout_secs, 5);
        assert_eq!(config.sender.chunk_size, DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn config_roundtrip_toml() {
        let mut config = Config::default();
        config.server.bind_addr = "127.0.0.1".parse().unwrap();
        config.server.max_sessions = Some(2);
        config.sender.chunk_size = 4096;

        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&toml_str).unwrap();

        assert_eq!(parsed.server.bind_addr, config.server.bind_addr);
        assert_eq!(parsed.server.max_sessions, Some(2));
        assert_eq!(parsed.sender.chunk_size, 4096);
    }

    #[test]
    fn load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("stowage.toml");
        std::fs::write(&path, "[sender]\nchunk_size = 1024\n").unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.sender.chunk_size, 1024);
    }

    #[test]
    fn load_missing_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&tmp.path().join("absent.toml"))).is_err());
    }

    #[test]
    fn load_without_path_gives_defaults() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.server.drain_timeout_secs, 5);
    }

    #[test]
    fn server_config_takes_cli_values() {
        let mut config = Config::default();
        config.server.drain_timeout_secs = 9;
        config.server.max_sessions = Some(3);

        let server = config.server_config(7000, PathBuf::from("/srv/in"));
        assert_eq!(server.port, 7000);
        assert_eq!(server.storage_dir, PathBuf::from("/srv/in"));
        assert_eq!(server.drain_timeout, Duration::from_secs(9));
        assert_eq!(server.max_sessions, Some(3));
    }
}
