//! Error types for eventdb
//!
//! Provides a unified error type for all object file operations.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using EventDbError
pub type Result<T> = std::result::Result<T, EventDbError>;

/// Unified error type for eventdb operations
#[derive(Debug, Error)]
pub enum EventDbError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("IO error in object file '{object_type}' ({}): {source}", path.display())]
    ObjectIo {
        object_type: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Data file {} was replaced but could not be reopened; reopen the object file", path.display())]
    StaleDataFile { path: PathBuf },

    // -------------------------------------------------------------------------
    // Lifecycle Errors
    // -------------------------------------------------------------------------
    #[error("Object file '{object_type}' is already open")]
    AlreadyOpen { object_type: String },

    #[error("Object file '{object_type}' is not open")]
    NotOpen { object_type: String },

    // -------------------------------------------------------------------------
    // Lock Errors
    // -------------------------------------------------------------------------
    #[error("Lock already held: {}", path.display())]
    LockHeld { path: PathBuf },

    #[error("Object file '{object_type}' is not locked")]
    NotLocked { object_type: String },

    // -------------------------------------------------------------------------
    // Block Errors
    // -------------------------------------------------------------------------
    #[error(
        "Block overflow: event for object {object_id} needs {size} bytes, \
         block {ordinal} has a block size of {block_size}"
    )]
    BlockOverflow {
        object_id: u64,
        ordinal: usize,
        size: usize,
        block_size: usize,
    },

    #[error("Block {0} does not exist")]
    BlockNotFound(usize),

    #[error("Corrupt block {ordinal}: {reason}")]
    CorruptBlock { ordinal: usize, reason: String },

    // -------------------------------------------------------------------------
    // Header Errors
    // -------------------------------------------------------------------------
    #[error("Corrupt header: {0}")]
    CorruptHeader(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid object type: {0:?}")]
    InvalidObjectType(String),
}

impl EventDbError {
    /// Attach the object type and directory to a bare I/O error
    pub(crate) fn in_object_file(self, object_type: &str, path: &std::path::Path) -> Self {
        match self {
            Self::Io(source) => Self::ObjectIo {
                object_type: object_type.to_string(),
                path: path.to_path_buf(),
                source,
            },
            other => other,
        }
    }

    /// Shorthand for a `CorruptBlock` error
    pub(crate) fn corrupt_block(ordinal: usize, reason: impl Into<String>) -> Self {
        Self::CorruptBlock {
            ordinal,
            reason: reason.into(),
        }
    }
}
