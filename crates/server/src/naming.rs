//! Storage file naming: sanitising received names and picking a free path.

use std::io;
use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};

/// Reduces a received file name to a single safe path component.
///
/// Directory parts (either separator) and control characters are
/// dropped. Returns `None` if nothing usable remains.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    let last = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let clean: String = last.chars().filter(|c| !c.is_control()).collect();

    if clean.trim().is_empty() || clean == "." || clean == ".." {
        return None;
    }
    Some(clean)
}

/// Builds the `n`-th alternative for a taken name: `stem (n).ext`.
///
/// The extension starts at the last dot; a leading dot (hidden file) is
/// part of the stem.
pub fn candidate_name(name: &str, n: u64) -> String {
    // `.bashrc` -> `.bashrc (1)`, never ` (1).bashrc`: a dot at index 0
    // marks a hidden name, not an extension.
    match name.rfind('.') {
        Some(idx) if idx > 0 => format!("{} ({n}){}", &name[..idx], &name[idx..]),
        _ => format!("{name} ({n})"),
    }
}

/// Creates a new file in `dir` named after `name`, or after the first free
/// `stem (n).ext` alternative.
///
/// Creation uses `create_new`, so a name taken concurrently by another
/// session is skipped rather than overwritten.
pub async fn create_unique(dir: &Path, name: &str) -> io::Result<(PathBuf, File)> {
    let mut path = dir.join(name);
    let mut n = 0u64;

    loop {
        match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => return Ok((path, file)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                n += 1;
                path = dir.join(candidate_name(name, n));
            }
            Err(e) => return Err(e),
        }
    }
}
