//! Database container
//!
//! Maps object type names to their directories under a root path:
//!
//! ```text
//! <root>/
//! └─ <object_type>/
//!    ├─ header      # block size + action/property registries
//!    ├─ data        # fixed-size blocks of events
//!    └─ .lock       # sentinel, present while a writer holds the lock
//! ```

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::{EventDbError, Result};
use crate::object_file::ObjectFile;

/// A directory of object files
#[derive(Debug, Clone)]
pub struct Database {
    root: PathBuf,
}

impl Database {
    /// Create a handle on `root`; nothing is touched on disk until an object
    /// file is opened
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory of one object type
    ///
    /// Rejects names that are empty, `.`/`..`, or contain path separators.
    pub fn object_path(&self, object_type: &str) -> Result<PathBuf> {
        let invalid = object_type.is_empty()
            || object_type == "."
            || object_type == ".."
            || object_type.contains(['/', '\\', '\0']);
        if invalid {
            return Err(EventDbError::InvalidObjectType(object_type.to_string()));
        }
        Ok(self.root.join(object_type))
    }

    /// Create a closed object file for `object_type` with default config
    pub fn object_file(&self, object_type: &str) -> Result<ObjectFile> {
        ObjectFile::create(self, object_type)
    }

    /// Create a closed object file for `object_type` with `config`
    pub fn object_file_with_config(&self, object_type: &str, config: Config) -> Result<ObjectFile> {
        ObjectFile::with_config(self, object_type, config)
    }
}
