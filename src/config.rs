//! Configuration for eventdb
//!
//! Centralized object file configuration with sensible defaults.

use crate::block::MIN_BLOCK_SIZE;
use crate::error::{EventDbError, Result};

/// Default block size: 64 KiB
pub const DEFAULT_BLOCK_SIZE: usize = 0x10000;

/// Configuration for an object file
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Target maximum size of one physical block (in bytes).
    ///
    /// Only used when the object file is created. An existing header's
    /// block size always wins because the data file layout depends on it.
    pub block_size: usize,

    /// Make every insert crash-atomic: write the new data file to
    /// `data.tmp`, fsync it and rename it into place. When off, blocks that
    /// keep their position are overwritten in place without fsync.
    pub sync_writes: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            sync_writes: true,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check that the block size can hold at least one minimal event
    pub fn validate(&self) -> Result<()> {
        validate_block_size(self.block_size)
    }
}

/// Reject block sizes too small for a header plus one bare event, or too
/// large for the u32 length fields in the block header.
pub(crate) fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size < MIN_BLOCK_SIZE {
        return Err(EventDbError::Config(format!(
            "block size {} is below the minimum of {}",
            block_size, MIN_BLOCK_SIZE
        )));
    }
    if block_size > u32::MAX as usize {
        return Err(EventDbError::Config(format!(
            "block size {} does not fit in 32 bits",
            block_size
        )));
    }
    Ok(())
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the block size (in bytes)
    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    /// Enable or disable atomic, fsynced replacement on each insert
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.config.sync_writes = sync;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
