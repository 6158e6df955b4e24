//! Session lock
//!
//! One sandbox session per host. The orchestrator takes an exclusive
//! advisory lock before touching the staging tree and holds it until the
//! session ends, so a second `start` fails fast instead of clobbering a
//! live session. The lock file itself stays behind; only the lock matters.

use std::fs::{self, File, OpenOptions};
use std::path::Path;

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};
use tracing::debug;

use crate::error::ProctorError;

/// Held for the whole session; the advisory lock releases on drop.
#[derive(Debug)]
pub struct SessionLock {
    _lock: Flock<File>,
}

impl SessionLock {
    /// Acquire the lock file at `path`, failing fast when another session
    /// already holds it.
    pub fn acquire(path: &Path) -> Result<Self, ProctorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(lock) => {
                debug!("Session lock acquired at {}", path.display());
                Ok(Self { _lock: lock })
            }
            Err((_, Errno::EWOULDBLOCK)) => Err(ProctorError::SessionActive {
                path: path.to_path_buf(),
            }),
            Err((_, errno)) => Err(ProctorError::Io(errno.into())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_reports_active_session() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("session.lock");

        let held = SessionLock::acquire(&path).unwrap();
        let err = SessionLock::acquire(&path).unwrap_err();
        assert!(matches!(err, ProctorError::SessionActive { .. }));

        drop(held);
        SessionLock::acquire(&path).unwrap();
    }

    #[test]
    fn test_creates_missing_parent_directory() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("deep/down/session.lock");
        SessionLock::acquire(&path).unwrap();
        assert!(path.exists());
    }
}
