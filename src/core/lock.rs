//! Single-flight guard for runs against one workspace.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const LOCK_FILE: &str = ".assetline.lock";

/// Held for the duration of a run; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(workspace: &Path, run_id: &str) -> Result<Self> {
        let path = workspace.join(LOCK_FILE);
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(|e| match e.kind() {
                ErrorKind::AlreadyExists => Error::run_locked(path.display().to_string()),
                _ => Error::internal_io(
                    e.to_string(),
                    Some(format!("create lock {}", path.display())),
                ),
            })?;

        if let Err(e) = writeln!(file, "{} {}", std::process::id(), run_id) {
            tracing::warn!(lock = %path.display(), error = %e, "failed to write run lock owner");
        }
        tracing::debug!(lock = %path.display(), "acquired run lock");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            tracing::warn!(lock = %self.path.display(), error = %e, "failed to release run lock");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use tempfile::TempDir;

    #[test]
    fn second_acquire_fails_while_held() {
        let dir = TempDir::new().unwrap();
        let lock = RunLock::acquire(dir.path(), "run-1").unwrap();
        assert!(lock.path().exists());

        let err = RunLock::acquire(dir.path(), "run-2").unwrap_err();
        assert_eq!(err.code, ErrorCode::RunLocked);
    }

    #[test]
    fn drop_releases_the_lock() {
        let dir = TempDir::new().unwrap();
        {
            let _lock = RunLock::acquire(dir.path(), "run-1").unwrap();
        }
        assert!(!dir.path().join(LOCK_FILE).exists());
        RunLock::acquire(dir.path(), "run-2").unwrap();
    }
}
