//! Command implementations.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use stowage_protocol::MAX_FILE_SIZE;
use stowage_sender::{FileOutcome, FileReport, QueuedSender};
use stowage_server::StorageServer;
use tokio::sync::mpsc;

use crate::config::Config;

/// Checks a file given on the command line before anything is sent.
fn check_file(path: &Path) -> anyhow::Result<()> {
    let meta = std::fs::metadata(path).with_context(|| format!("{}", path.display()))?;
    if !meta.is_file() {
        bail!("{} is not a regular file", path.display());
    }
    if meta.len() >= MAX_FILE_SIZE {
        bail!("{} is too large ({} bytes)", path.display(), meta.len());
    }
    Ok(())
}

/// Sends `files` to `destination` in order.
///
/// Returns `true` if every file was saved by the server.
pub async fn send(config: &Config, destination: &str, files: Vec<PathBuf>) -> anyhow::Result<bool> {
    for path in &files {
        check_file(path)?;
    }

    let (tx, rx) = mpsc::unbounded_channel();
    let sender = QueuedSender::connect_with_reports(destination, config.sender_config(), tx)
        .await
        .with_context(|| format!("connecting to {destination}"))?;

    Ok(deliver(&sender, rx, files).await)
}

/// Queues `files`, closes the sender and prints one line per file.
///
/// Files that could not be queued because the connection already failed
/// are listed as not sent.
async fn deliver(
    sender: &QueuedSender,
    mut rx: mpsc::UnboundedReceiver<FileReport>,
    files: Vec<PathBuf>,
) -> bool {
    let mut unsent = Vec::new();
    let mut files = files.into_iter();
    for path in files.by_ref() {
        if let Err(e) = sender.enqueue(path.clone()) {
            tracing::warn!(path = %path.display(), "cannot queue file: {e}");
            unsent.push(path);
            break;
        }
    }
    unsent.extend(files);
    sender.close().await;

    let mut all_saved = unsent.is_empty();
    while let Some(report) = rx.recv().await {
        let path = report.path.display();
        match report.outcome {
            FileOutcome::Saved { bytes } => println!("{path}: saved ({bytes} bytes)"),
            FileOutcome::Rejected(code) => {
                all_saved = false;
                println!("{path}: rejected ({code})");
            }
            FileOutcome::Skipped(reason) => {
                all_saved = false;
                println!("{path}: skipped ({reason})");
            }
            FileOutcome::Failed(reason) => {
                all_saved = false;
                println!("{path}: failed ({reason})");
            }
        }
    }
    for path in &unsent {
        println!("{}: not sent (connection closed)", path.display());
    }

    all_saved
}

/// Runs a storage server until Ctrl-C.
pub async fn storage(config: &Config, port: u16, dir: PathBuf) -> anyhow::Result<()> {
    let server = StorageServer::new(config.server_config(port, dir))?;
    let addr = server.start().await?;
    tracing::info!(%addr, "storage server ready, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown requested");
    server.stop().await;
    Ok(())
}
