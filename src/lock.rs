//! The process-wide advisory lock every state-mutating operation holds.

use crate::error::{AResult, AeptError};
use nix::fcntl::{flock, FlockArg};
use std::fs;
use std::os::unix::io::AsRawFd;
use std::path::Path;

/// Held for the duration of a transaction; the lock drops with the file
/// descriptor.
pub struct LockGuard {
    _file: fs::File,
}

pub fn acquire(path: &Path) -> AResult<LockGuard> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file = fs::OpenOptions::new()
        .create(true)
        .write(true)
        .open(path)
        .map_err(|e| AeptError::IoFile("cannot open lock file", e, path.to_path_buf()))?;
    match flock(file.as_raw_fd(), FlockArg::LockExclusiveNonblock) {
        Ok(()) => Ok(LockGuard { _file: file }),
        Err(nix::errno::Errno::EWOULDBLOCK) => Err(AeptError::LockHeld(path.to_path_buf())),
        Err(e) => Err(AeptError::IoFile("cannot lock", e.into(), path.to_path_buf())),
    }
}
