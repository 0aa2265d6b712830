//! Block descriptors
//!
//! The in-memory summary of one physical block, used to route inserts.

use super::BlockHeader;

/// Which objects a block covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockExtent {
    /// Complete event sets for every object in the range
    Whole { min_object_id: u64, max_object_id: u64 },

    /// One slice of a single object's events; `part` counts from 0 within
    /// the run of consecutive blocks holding that object
    Spanned { object_id: u64, part: u32 },
}

/// Summary of one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockDescriptor {
    ordinal: usize,
    extent: BlockExtent,
    min_timestamp: i64,
    max_timestamp: i64,
}

impl BlockDescriptor {
    /// Derive a descriptor from a block header
    ///
    /// Spanned descriptors start as part 0; the index renumbers parts once
    /// the descriptor takes its place in a run.
    pub fn from_header(ordinal: usize, header: &BlockHeader) -> Self {
        let extent = if header.spanned {
            BlockExtent::Spanned {
                object_id: header.min_object_id,
                part: 0,
            }
        } else {
            BlockExtent::Whole {
                min_object_id: header.min_object_id,
                max_object_id: header.max_object_id,
            }
        };

        Self {
            ordinal,
            extent,
            min_timestamp: header.min_timestamp,
            max_timestamp: header.max_timestamp,
        }
    }

    /// Physical position of the block in the data file
    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn extent(&self) -> BlockExtent {
        self.extent
    }

    pub fn min_object_id(&self) -> u64 {
        match self.extent {
            BlockExtent::Whole { min_object_id, .. } => min_object_id,
            BlockExtent::Spanned { object_id, .. } => object_id,
        }
    }

    pub fn max_object_id(&self) -> u64 {
        match self.extent {
            BlockExtent::Whole { max_object_id, .. } => max_object_id,
            BlockExtent::Spanned { object_id, .. } => object_id,
        }
    }

    pub fn min_timestamp(&self) -> i64 {
        self.min_timestamp
    }

    pub fn max_timestamp(&self) -> i64 {
        self.max_timestamp
    }

    pub fn is_spanned(&self) -> bool {
        matches!(self.extent, BlockExtent::Spanned { .. })
    }

    /// True when this is a spanned slice of `object_id`
    pub fn spans(&self, object_id: u64) -> bool {
        matches!(self.extent, BlockExtent::Spanned { object_id: id, .. } if id == object_id)
    }

    /// Part index within a spanned run, `None` for whole blocks
    pub fn part(&self) -> Option<u32> {
        match self.extent {
            BlockExtent::Whole { .. } => None,
            BlockExtent::Spanned { part, .. } => Some(part),
        }
    }

    pub(crate) fn set_position(&mut self, ordinal: usize, part: u32) {
        self.ordinal = ordinal;
        if let BlockExtent::Spanned { part: p, .. } = &mut self.extent {
            *p = part;
        }
    }
}
