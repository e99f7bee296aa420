//! Free-space admission.

use std::io;
use std::path::Path;

/// Reports the free space available for new uploads in a directory.
pub trait FreeSpace: Send + Sync {
    fn free_space(&self, dir: &Path) -> io::Result<u64>;
}

/// Queries the filesystem holding the directory.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiskSpace;

impl FreeSpace for DiskSpace {
    fn free_space(&self, dir: &Path) -> io::Result<u64> {
        fs2::free_space(dir)
    }
}

/// Reports a constant amount of free space regardless of the directory.
#[derive(Debug, Clone, Copy)]
pub struct FixedSpace(pub u64);

impl FreeSpace for FixedSpace {
    fn free_space(&self, _dir: &Path) -> io::Result<u64> {
        Ok(self.0)
    }
}

/// Admission rule: free space must be strictly greater than the file size.
pub fn has_room(free: u64, size: u64) -> bool {
    free > size
}
