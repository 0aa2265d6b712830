//! Block Store
//!
//! Reads, rewrites and splits blocks in the data file.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::block::{Block, BlockDescriptor, BlockIndex, Placement};
use crate::config::validate_block_size;
use crate::error::{EventDbError, Result};
use crate::event::Event;

use super::split::split_block;
use super::sync_parent_dir;

/// File name of the data file inside an object type directory
pub const DATA_FILENAME: &str = "data";

const DATA_TEMP_FILENAME: &str = "data.tmp";

/// Owns the data file and its block index
///
/// ## Concurrency:
/// - No internal locking; all mutation goes through `&mut self`
/// - Cross-process exclusion is the caller's job (see `crate::lock`)
pub struct BlockStore {
    /// Path of the data file
    path: PathBuf,

    /// Read/write handle on the data file
    file: File,

    /// Size of every physical block
    block_size: usize,

    /// Replace the file through a synced `data.tmp` on every write
    sync_writes: bool,

    /// One descriptor per physical block
    index: BlockIndex,

    /// Set when `data` was replaced but the handle could not be reopened
    stale: bool,
}

impl BlockStore {
    /// Open or create the data file and rebuild the block index
    ///
    /// On startup:
    /// 1. Check the file holds a whole number of blocks
    /// 2. Decode every block and rebuild the index
    ///
    /// A `data.tmp` is left alone here: without the lock it may belong to a
    /// writer in the middle of a split. `reload` removes it.
    pub fn open(path: &Path, block_size: usize, sync_writes: bool) -> Result<Self> {
        validate_block_size(block_size)?;

        let (file, index) = load(path, block_size)?;

        tracing::info!(
            path = %path.display(),
            blocks = index.len(),
            block_size,
            "data file opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            block_size,
            sync_writes,
            index,
            stale: false,
        })
    }

    /// Reopen the data file and rebuild the index
    ///
    /// Must be called while holding the lock: another owner may have written
    /// blocks or renamed a new `data` into place since this store was
    /// opened. Also removes a `data.tmp` left behind by an interrupted split.
    /// On failure the previous handle and index are kept.
    pub fn reload(&mut self) -> Result<()> {
        let temp_path = self.path.with_file_name(DATA_TEMP_FILENAME);
        match fs::remove_file(&temp_path) {
            Ok(()) => tracing::warn!(path = %temp_path.display(), "removed stale split file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }

        let (file, index) = load(&self.path, self.block_size)?;
        let previous = self.index.len();
        self.file = file;
        self.index = index;
        self.stale = false;

        tracing::debug!(
            path = %self.path.display(),
            previous,
            blocks = self.index.len(),
            "data file reloaded"
        );
        Ok(())
    }

    /// Insert one event
    ///
    /// Steps:
    /// 1. Route the event through the index
    /// 2. Decode the target block (or start a new one) and insert
    /// 3. Split if the result no longer fits
    /// 4. Encode every resulting block, then write them
    /// 5. Update the index
    ///
    /// With `sync_writes` every change replaces the whole file through
    /// `data.tmp`; otherwise a block that keeps its position is overwritten
    /// in place and a new trailing block is appended.
    ///
    /// On failure neither the data file nor the index changes. The one
    /// exception is a failure after `data.tmp` was renamed into place: the
    /// index then follows the new file, and if the handle cannot be reopened
    /// every later call fails with `StaleDataFile` until `reload`.
    pub fn add_event(&mut self, event: Event) -> Result<()> {
        self.check_attached()?;
        let object_id = event.object_id();
        let placement = self.index.find_block_for(object_id, event.timestamp());

        let (ordinal, removed, block) = match placement {
            Placement::Block(ordinal) => {
                let mut block = self.read_block(ordinal)?;
                block.insert(event);
                (ordinal, 1, block)
            }
            Placement::NewBlock(ordinal) => (ordinal, 0, Block::new(vec![event], false)),
        };

        let blocks = if block.fits(self.block_size) {
            vec![block]
        } else {
            split_block(block, ordinal, self.block_size)?
        };

        let encoded = blocks
            .iter()
            .map(|b| b.encode(ordinal, self.block_size))
            .collect::<Result<Vec<_>>>()?;

        let descriptors: Vec<BlockDescriptor> = blocks
            .iter()
            .map(|b| BlockDescriptor::from_header(ordinal, b.header()))
            .collect();

        let count = descriptors.len();
        let shape = (removed, count);
        let result = if !self.sync_writes && shape == (1, 1) {
            self.write_in_place(ordinal, &encoded[0])?;
            self.index.update(ordinal, removed, descriptors);
            Ok(())
        } else if !self.sync_writes && shape == (0, 1) && ordinal == self.index.len() {
            self.append(&encoded[0])?;
            self.index.update(ordinal, removed, descriptors);
            Ok(())
        } else {
            self.write_replacement(ordinal, removed, &encoded)?;
            // `data` holds the new layout from here on
            self.index.update(ordinal, removed, descriptors);
            self.reattach()
        };

        if count > removed.max(1) {
            tracing::info!(
                object_id,
                ordinal,
                blocks = count,
                total_blocks = self.index.len(),
                "block split"
            );
        } else {
            tracing::debug!(object_id, ordinal, new_block = removed == 0, "event stored");
        }
        result
    }

    /// Read and decode one block
    pub fn read_block(&mut self, ordinal: usize) -> Result<Block> {
        let buf = self.read_block_bytes(ordinal)?;
        Block::decode(&buf, ordinal)
    }

    /// Read the raw bytes of one block
    pub fn read_block_bytes(&mut self, ordinal: usize) -> Result<Vec<u8>> {
        self.check_attached()?;
        if ordinal >= self.index.len() {
            return Err(EventDbError::BlockNotFound(ordinal));
        }

        let mut buf = vec![0u8; self.block_size];
        self.file.seek(SeekFrom::Start(self.offset_of(ordinal)))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Every event in the store, in (object_id, timestamp) order
    pub fn events(&mut self) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for ordinal in 0..self.index.len() {
            events.extend(self.read_block(ordinal)?.into_events());
        }
        Ok(events)
    }

    /// Force data to disk
    pub fn sync(&mut self) -> Result<()> {
        self.check_attached()?;
        self.file.sync_all()?;
        Ok(())
    }

    pub fn index(&self) -> &BlockIndex {
        &self.index
    }

    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_attached(&self) -> Result<()> {
        if self.stale {
            return Err(EventDbError::StaleDataFile {
                path: self.path.clone(),
            });
        }
        Ok(())
    }

    fn offset_of(&self, ordinal: usize) -> u64 {
        (ordinal as u64) * (self.block_size as u64)
    }

    /// Overwrite one existing block; a torn write here damages that block
    fn write_in_place(&mut self, ordinal: usize, bytes: &[u8]) -> Result<()> {
        let offset = self.offset_of(ordinal);
        write_at(&mut self.file, offset, bytes)?;
        Ok(())
    }

    /// Add a block after the last one; on failure the file is cut back
    fn append(&mut self, bytes: &[u8]) -> Result<()> {
        let old_len = self.offset_of(self.index.len());
        if let Err(e) = write_at(&mut self.file, old_len, bytes) {
            if let Err(truncate_err) = self.file.set_len(old_len) {
                tracing::error!(error = %truncate_err, "failed to truncate after append error");
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Replace `removed` blocks at `ordinal` with `blocks`, shifting the rest
    ///
    /// Writes a complete copy to `data.tmp` and renames it over the data
    /// file. Until the rename succeeds the original is untouched; after it
    /// the caller must update the index and `reattach`.
    fn write_replacement(&mut self, ordinal: usize, removed: usize, blocks: &[Vec<u8>]) -> Result<()> {
        let temp_path = self.path.with_file_name(DATA_TEMP_FILENAME);

        if let Err(e) = self.write_spliced_copy(&temp_path, ordinal, removed, blocks) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
        if let Err(e) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(e.into());
        }
        Ok(())
    }

    /// Point the handle at the renamed file and make the rename durable
    ///
    /// If the file cannot be reopened the store is marked stale.
    fn reattach(&mut self) -> Result<()> {
        match OpenOptions::new().read(true).write(true).open(&self.path) {
            Ok(file) => self.file = file,
            Err(e) => {
                self.stale = true;
                tracing::error!(path = %self.path.display(), error = %e, "failed to reopen replaced data file");
                return Err(e.into());
            }
        }
        sync_parent_dir(&self.path)
    }

    fn write_spliced_copy(
        &mut self,
        temp_path: &Path,
        ordinal: usize,
        removed: usize,
        blocks: &[Vec<u8>],
    ) -> Result<()> {
        let mut out = BufWriter::new(File::create(temp_path)?);

        // Blocks before the splice point
        let head_len = self.offset_of(ordinal);
        self.file.seek(SeekFrom::Start(0))?;
        copy_exact(&self.file, head_len, &mut out)?;

        for block in blocks {
            out.write_all(block)?;
        }

        // Blocks after the replaced ones
        let tail_start = self.offset_of(ordinal + removed);
        let tail_len = self.offset_of(self.index.len()) - tail_start;
        self.file.seek(SeekFrom::Start(tail_start))?;
        copy_exact(&self.file, tail_len, &mut out)?;

        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()?;
        Ok(())
    }
}

/// Open (or create) the data file and rebuild its index
fn load(path: &Path, block_size: usize) -> Result<(File, BlockIndex)> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?;

    let len = file.metadata()?.len();
    let block_len = block_size as u64;
    if len % block_len != 0 {
        return Err(EventDbError::corrupt_block(
            (len / block_len) as usize,
            format!(
                "trailing partial block of {} bytes (block size {})",
                len % block_len,
                block_size
            ),
        ));
    }
    let block_count = (len / block_len) as usize;

    let index = BlockIndex::rebuild(BufReader::new(&file), block_size, block_count)?;
    Ok((file, index))
}

/// Copy exactly `len` bytes from the current position of `file`
fn copy_exact<W: Write>(file: &File, len: u64, out: &mut W) -> io::Result<()> {
    let copied = io::copy(&mut file.take(len), out)?;
    if copied != len {
        return Err(io::Error::new(
            ErrorKind::UnexpectedEof,
            format!("data file ended after {} of {} bytes", copied, len),
        ));
    }
    Ok(())
}

fn write_at(file: &mut File, offset: u64, bytes: &[u8]) -> io::Result<()> {
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)
}
