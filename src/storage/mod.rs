//! Storage Module
//!
//! Owns the data file: a sequence of fixed-size blocks (see `crate::block`).
//!
//! ## Responsibilities
//! - Rebuild the block index when the data file is opened
//! - Route each new event to its block and rewrite that block
//! - Split blocks that outgrow the block size
//! - Keep index ordinals equal to physical block positions
//!
//! ## Write Discipline
//! Every block touched by an insert is encoded before any byte is written.
//! Anything that shifts blocks (a split, a new block in the middle) is
//! written to `data.tmp`, synced, and renamed over `data`.
//!
//! With `sync_writes` (the default) every other change goes the same way,
//! so a crash leaves either the old or the new file. Without it, a block
//! that keeps its position is overwritten in place and a new trailing block
//! is appended (and truncated away again if the write fails). Those writes
//! are not crash-atomic: a torn write damages the block being written, and
//! the next open reports it as `CorruptBlock`.
//!
//! ## Multiple Owners
//! Another owner can replace `data` whenever it holds the lock. A store
//! opened without the lock must `reload` after acquiring it, and only then
//! removes a `data.tmp` left behind by an interrupted split.

mod split;
mod store;

use std::path::Path;

use crate::error::Result;

pub use store::{BlockStore, DATA_FILENAME};

/// Sync the directory holding `path` so a rename or create is durable
#[cfg(unix)]
pub(crate) fn sync_parent_dir(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        let dir = if dir.as_os_str().is_empty() {
            Path::new(".")
        } else {
            dir
        };
        std::fs::File::open(dir)?.sync_all()?;
    }
    Ok(())
}

#[cfg(not(unix))]
pub(crate) fn sync_parent_dir(_path: &Path) -> Result<()> {
    // NTFS journals metadata; directory handles cannot be fsynced
    Ok(())
}
