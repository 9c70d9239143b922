//! Cross-process exclusive locks for a beads project.
//!
//! Lock files live at `.beads/locks/{name}.lock`. Holding a [`LockFile`]
//! keeps an OS-level exclusive lock on that file; dropping it releases the
//! lock. `bd` takes the `graph` lock around every command that writes edges
//! or statuses, so two processes never interleave their read-check-commit
//! sequences against the same database.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use thiserror::Error;
use tracing::debug;

const LOCKS_DIR: &str = "locks";
const STARTING_BACKOFF: Duration = Duration::from_millis(10);
const MAX_BACKOFF: Duration = Duration::from_millis(500);

/// Default time to wait for a contended lock.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out after {waited:?} waiting for lock '{name}'")]
    Timeout { name: String, waited: Duration },
}

pub type Result<T> = std::result::Result<T, LockError>;

/// An exclusive lock held until drop.
#[derive(Debug)]
pub struct LockFile {
    file: File,
    name: String,
    path: PathBuf,
}

impl LockFile {
    /// Acquires `name` under `beads_dir`, waiting up to [`DEFAULT_TIMEOUT`].
    pub fn acquire(beads_dir: &Path, name: &str) -> Result<Self> {
        Self::acquire_with_timeout(beads_dir, name, DEFAULT_TIMEOUT)
    }

    /// Retries with exponential backoff (10ms doubling up to 500ms) until
    /// the lock is free or `timeout` has elapsed.
    pub fn acquire_with_timeout(beads_dir: &Path, name: &str, timeout: Duration) -> Result<Self> {
        let dir = beads_dir.join(LOCKS_DIR);
        std::fs::create_dir_all(&dir).map_err(|source| LockError::Io {
            path: dir.clone(),
            source,
        })?;
        let path = dir.join(format!("{name}.lock"));
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|source| LockError::Io {
                path: path.clone(),
                source,
            })?;

        let start = Instant::now();
        let mut delay = STARTING_BACKOFF;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!(lock = name, wait_ms = start.elapsed().as_millis() as u64, "lock acquired");
                    return Ok(Self {
                        file,
                        name: name.to_owned(),
                        path,
                    });
                }
                Err(e) if is_contended(&e) => {}
                Err(source) => return Err(LockError::Io { path, source }),
            }
            let remaining = timeout.saturating_sub(start.elapsed());
            if remaining.is_zero() {
                return Err(LockError::Timeout {
                    name: name.to_owned(),
                    waited: start.elapsed(),
                });
            }
            thread::sleep(delay.min(remaining));
            delay = (delay * 2).min(MAX_BACKOFF);
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Whether a failed `try_lock_exclusive` means another holder, as opposed
/// to a filesystem that cannot lock at all.
fn is_contended(e: &std::io::Error) -> bool {
    e.kind() == std::io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            debug!(lock = %self.name, error = %e, "failed to unlock");
        } else {
            debug!(lock = %self.name, "lock released");
        }
    }
}
