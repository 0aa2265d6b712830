//! Header file
//!
//! Persists the block size and the action/property registries of one object
//! file.
//!
//! ## File Format
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │ Magic "EVHD" (4) | Version u16 (2) | CRC32 (4) | Len (4) │
//! ├──────────────────────────────────────────────────────────┤
//! │ bincode(HeaderRecord)                         (Len bytes) │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Saves go through `header.tmp` + rename, so readers only ever see a
//! complete header.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::config::validate_block_size;
use crate::error::{EventDbError, Result};
use crate::registry::{Entry, Registry};
use crate::storage::sync_parent_dir;

/// File name of the header inside an object type directory
pub const HEADER_FILENAME: &str = "header";

const HEADER_TEMP_FILENAME: &str = "header.tmp";

/// Magic bytes identifying an eventdb header file
const MAGIC: &[u8; 4] = b"EVHD";

/// Current header format version
const VERSION: u16 = 1;

/// Magic (4) + Version (2) + CRC (4) + Len (4) = 14 bytes
const PREFIX_SIZE: usize = 14;

/// Serialized form of the header
#[derive(Debug, Serialize, Deserialize)]
struct HeaderRecord {
    block_size: u32,
    actions: Vec<Entry>,
    properties: Vec<Entry>,
}

/// In-memory header of an object file
#[derive(Debug, Clone)]
pub struct Header {
    block_size: usize,
    actions: Registry,
    properties: Registry,
}

impl Header {
    /// Create a fresh header with empty registries
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size,
            actions: Registry::new(),
            properties: Registry::new(),
        }
    }

    /// Load the header from `path`
    ///
    /// Returns `Ok(None)` when the file does not exist (new object file).
    pub fn load(path: &Path) -> Result<Option<Self>> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Self::decode(&bytes).map(Some)
    }

    /// Save the header to `path` atomically and mark the registries clean
    pub fn save(&mut self, path: &Path) -> Result<()> {
        let bytes = self.encode()?;
        let temp_path = path.with_file_name(HEADER_TEMP_FILENAME);

        let written = File::create(&temp_path).and_then(|mut file| {
            file.write_all(&bytes)?;
            file.sync_all()
        });
        if let Err(e) = written.and_then(|()| fs::rename(&temp_path, path)) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        sync_parent_dir(path)?;

        self.actions.mark_clean();
        self.properties.mark_clean();
        tracing::debug!(
            path = %path.display(),
            actions = self.actions.count(),
            properties = self.properties.count(),
            "header saved"
        );
        Ok(())
    }

    /// Encode to the on-disk representation
    pub fn encode(&self) -> Result<Vec<u8>> {
        let record = HeaderRecord {
            block_size: self.block_size as u32,
            actions: self.actions.entries().to_vec(),
            properties: self.properties.entries().to_vec(),
        };
        let body = bincode::serialize(&record)
            .map_err(|e| EventDbError::Serialization(e.to_string()))?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let mut bytes = Vec::with_capacity(PREFIX_SIZE + body.len());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&crc.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&body);
        Ok(bytes)
    }

    /// Decode from the on-disk representation
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < PREFIX_SIZE {
            return Err(EventDbError::CorruptHeader(format!(
                "expected at least {} bytes, got {}",
                PREFIX_SIZE,
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(EventDbError::CorruptHeader(format!(
                "invalid magic: expected EVHD, got {:?}",
                &bytes[0..4]
            )));
        }

        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(EventDbError::CorruptHeader(format!(
                "unsupported version: {}",
                version
            )));
        }

        let crc = u32::from_le_bytes([bytes[6], bytes[7], bytes[8], bytes[9]]);
        let len = u32::from_le_bytes([bytes[10], bytes[11], bytes[12], bytes[13]]) as usize;
        let body = bytes
            .get(PREFIX_SIZE..PREFIX_SIZE + len)
            .ok_or_else(|| {
                EventDbError::CorruptHeader(format!(
                    "truncated body: expected {} bytes, got {}",
                    len,
                    bytes.len() - PREFIX_SIZE
                ))
            })?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        if hasher.finalize() != crc {
            return Err(EventDbError::CorruptHeader("checksum mismatch".to_string()));
        }

        let record: HeaderRecord = bincode::deserialize(body)
            .map_err(|e| EventDbError::CorruptHeader(e.to_string()))?;

        let block_size = record.block_size as usize;
        validate_block_size(block_size).map_err(|e| EventDbError::CorruptHeader(e.to_string()))?;

        Ok(Self {
            block_size,
            actions: Registry::from_entries(record.actions)?,
            properties: Registry::from_entries(record.properties)?,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn actions(&self) -> &Registry {
        &self.actions
    }

    pub fn actions_mut(&mut self) -> &mut Registry {
        &mut self.actions
    }

    pub fn properties(&self) -> &Registry {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Registry {
        &mut self.properties
    }

    /// True when either registry has unsaved entries
    pub fn is_dirty(&self) -> bool {
        self.actions.is_dirty() || self.properties.is_dirty()
    }
}
