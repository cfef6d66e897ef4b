//! Cross-process exclusive lock for the encrypted record file
//!
//! A sibling `.lock` file created with `O_EXCL` provides mutual exclusion
//! for the read-decrypt-modify-encrypt-write cycle. The guard releases the
//! lock on drop, so every exit path (including errors) unlocks.

use super::error::{CredentialError, Result};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::warn;

/// How long to wait for a competing process before giving up
const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);
/// Delay between acquisition attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);
/// A lock older than this belongs to a crashed process and is broken
const STALE_AFTER: Duration = Duration::from_secs(30);

/// RAII guard for the record file lock
pub(crate) struct FileLock {
    path: PathBuf,
}

impl FileLock {
    /// Acquire the lock, retrying until [`ACQUIRE_TIMEOUT`] elapses
    pub(crate) fn acquire(path: &Path) -> Result<Self> {
        let started = Instant::now();
        loop {
            match std::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
            {
                Ok(_) => {
                    return Ok(Self {
                        path: path.to_path_buf(),
                    })
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    if Self::is_stale(path) {
                        warn!(path = %path.display(), "breaking stale record lock");
                        let _ = std::fs::remove_file(path);
                        continue;
                    }
                    if started.elapsed() >= ACQUIRE_TIMEOUT {
                        return Err(CredentialError::StorageUnavailable(format!(
                            "timed out waiting for record lock {}",
                            path.display()
                        )));
                    }
                    std::thread::sleep(RETRY_DELAY);
                }
                Err(e) => {
                    return Err(CredentialError::Backend(format!(
                        "acquire record lock {}: {}",
                        path.display(),
                        e
                    )))
                }
            }
        }
    }

    fn is_stale(path: &Path) -> bool {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| modified.elapsed().ok())
            .map(|age| age > STALE_AFTER)
            .unwrap_or(false)
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}
