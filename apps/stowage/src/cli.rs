use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Point-to-point file transfer over TCP.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    /// TOML file with `[server]` / `[sender]` tuning.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Send files to a storage server.
    Send {
        /// Server address as host:port.
        destination: String,

        /// Files to send, in order.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Receive files into a directory until interrupted.
    Storage {
        /// TCP port to listen on (0 = OS-assigned).
        port: u16,

        /// Existing directory to store received files in.
        dir: PathBuf,
    },
}
