//! Lock file
//!
//! Advisory single-writer lock for one object file. The lock is a
//! zero-length sentinel file; its existence means some owner holds the lock.
//!
//! The sentinel only protects against callers that check for it. Acquisition
//! never waits: an existing sentinel fails immediately with `LockHeld`, and
//! retrying is up to the caller.

use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{EventDbError, Result};
use crate::storage::sync_parent_dir;

/// File name of the sentinel inside an object type directory
pub const LOCK_FILENAME: &str = ".lock";

/// A held sentinel lock
///
/// Dropping the guard without calling `release` still removes the sentinel,
/// so the lock is given up on every exit path.
#[derive(Debug)]
pub struct LockFile {
    path: PathBuf,
    /// Name reported in `NotLocked` errors
    owner: String,
    released: bool,
}

impl LockFile {
    /// Create the sentinel at `path`
    ///
    /// Fails with `LockHeld` if it already exists.
    pub fn acquire(path: &Path, owner: &str) -> Result<Self> {
        let file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(EventDbError::LockHeld {
                    path: path.to_path_buf(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        // From here on, dropping the guard removes the sentinel again
        let guard = Self {
            path: path.to_path_buf(),
            owner: owner.to_string(),
            released: false,
        };
        file.sync_all()?;
        drop(file);
        sync_parent_dir(path)?;

        tracing::debug!(path = %path.display(), owner, "lock acquired");
        Ok(guard)
    }

    /// Remove the sentinel
    ///
    /// Fails with `NotLocked` if someone else already removed it.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        match fs::remove_file(&self.path) {
            Ok(()) => {
                tracing::debug!(path = %self.path.display(), owner = %self.owner, "lock released");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Err(EventDbError::NotLocked {
                object_type: self.owner.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Check whether a sentinel exists at `path`
    pub fn is_held(path: &Path) -> bool {
        path.exists()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        match fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "lock released on drop"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.path.display(), error = %e, "failed to remove lock file"),
        }
    }
}
