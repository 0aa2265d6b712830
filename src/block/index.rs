//! Block Index
//!
//! Ordered descriptors of every block in the data file.
//!
//! ## Invariants
//! - Descriptor `i` describes physical block `i`
//! - Descriptors ascend by object id; adjacent whole blocks never overlap
//! - A spanned object occupies a run of consecutive spanned blocks, ordered
//!   by timestamp, and appears in no other block

use std::io::Read;

use crate::error::{EventDbError, Result};

use super::{Block, BlockDescriptor};

/// Where a new event should go
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Insert into the existing block at this ordinal
    Block(usize),

    /// Create a new block at this ordinal, shifting later blocks back
    NewBlock(usize),
}

/// In-memory index over all blocks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockIndex {
    descriptors: Vec<BlockDescriptor>,
}

impl BlockIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from descriptors in physical order
    ///
    /// Renumbers ordinals and spanned parts, then checks the ordering
    /// invariants.
    pub fn from_descriptors(descriptors: Vec<BlockDescriptor>) -> Result<Self> {
        let mut index = Self { descriptors };
        index.renumber();
        index.validate()?;
        Ok(index)
    }

    /// Rebuild the index by decoding `block_count` blocks from `reader`
    ///
    /// Any corrupt block aborts the rebuild; a partial index is never
    /// returned.
    pub fn rebuild<R: Read>(mut reader: R, block_size: usize, block_count: usize) -> Result<Self> {
        let mut descriptors = Vec::with_capacity(block_count);
        let mut buf = vec![0u8; block_size];

        for ordinal in 0..block_count {
            reader.read_exact(&mut buf)?;
            let block = Block::decode(&buf, ordinal)?;
            if block.is_empty() {
                return Err(EventDbError::corrupt_block(ordinal, "block holds no events"));
            }
            descriptors.push(BlockDescriptor::from_header(ordinal, block.header()));
        }

        Self::from_descriptors(descriptors)
    }

    /// Route an event for `object_id` at `timestamp`
    ///
    /// Inside a spanned run the part is picked by timestamp: the last part
    /// starting at or before `timestamp`, else the first. An object that
    /// falls between blocks joins the preceding whole block, else the
    /// following whole block, else gets a new block of its own.
    pub fn find_block_for(&self, object_id: u64, timestamp: i64) -> Placement {
        let descriptors = &self.descriptors;
        let i = descriptors.partition_point(|d| d.max_object_id() < object_id);

        if let Some(found) = descriptors.get(i) {
            if found.min_object_id() <= object_id {
                if !found.is_spanned() {
                    return Placement::Block(i);
                }

                let mut target = i;
                for (j, part) in descriptors.iter().enumerate().skip(i + 1) {
                    if !part.spans(object_id) {
                        break;
                    }
                    if part.min_timestamp() <= timestamp {
                        target = j;
                    }
                }
                return Placement::Block(target);
            }
        }

        // Gap between descriptors[i - 1] and descriptors[i]
        if i > 0 && !descriptors[i - 1].is_spanned() {
            Placement::Block(i - 1)
        } else if i < descriptors.len() && !descriptors[i].is_spanned() {
            Placement::Block(i)
        } else {
            Placement::NewBlock(i)
        }
    }

    /// Replace `removed` descriptors at `ordinal` with `replacements`
    ///
    /// One replacement for an in-place rewrite, several after a split, one
    /// with `removed == 0` for a new block.
    pub fn update(&mut self, ordinal: usize, removed: usize, replacements: Vec<BlockDescriptor>) {
        self.descriptors
            .splice(ordinal..ordinal + removed, replacements);
        self.renumber();
    }

    pub fn get(&self, ordinal: usize) -> Option<&BlockDescriptor> {
        self.descriptors.get(ordinal)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BlockDescriptor> {
        self.descriptors.iter()
    }

    pub fn as_slice(&self) -> &[BlockDescriptor] {
        &self.descriptors
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Reassign ordinals and spanned part numbers from physical order
    fn renumber(&mut self) {
        let mut previous: Option<BlockDescriptor> = None;
        for (ordinal, descriptor) in self.descriptors.iter_mut().enumerate() {
            let part = match previous {
                Some(prev) if descriptor.is_spanned() && prev.spans(descriptor.min_object_id()) => {
                    prev.part().unwrap_or(0) + 1
                }
                _ => 0,
            };
            descriptor.set_position(ordinal, part);
            previous = Some(*descriptor);
        }
    }

    /// Check ordering between every pair of adjacent descriptors
    fn validate(&self) -> Result<()> {
        for pair in self.descriptors.windows(2) {
            let (prev, cur) = (&pair[0], &pair[1]);
            let same_run = prev.is_spanned() && cur.spans(prev.min_object_id());

            if same_run {
                if cur.min_timestamp() < prev.max_timestamp() {
                    return Err(EventDbError::corrupt_block(
                        cur.ordinal(),
                        format!(
                            "spanned part starts at {} before the previous part ends at {}",
                            cur.min_timestamp(),
                            prev.max_timestamp()
                        ),
                    ));
                }
            } else if cur.min_object_id() <= prev.max_object_id() {
                return Err(EventDbError::corrupt_block(
                    cur.ordinal(),
                    format!(
                        "object range {}..={} overlaps or precedes block {} ({}..={})",
                        cur.min_object_id(),
                        cur.max_object_id(),
                        prev.ordinal(),
                        prev.min_object_id(),
                        prev.max_object_id()
                    ),
                ));
            }
        }
        Ok(())
    }
}
