//! Block Module
//!
//! Fixed-size blocks of sorted events, and the in-memory index over them.
//!
//! ## Block Format
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header (52 bytes, little endian)                              │
//! │   Magic "EVBK" (4) | Version u16 (2) | Flags u16 (2)          │
//! │   EventCount u32 (4) | PayloadLen u32 (4)                     │
//! │   MinObjectId u64 (8) | MaxObjectId u64 (8)                   │
//! │   MinTimestamp i64 (8) | MaxTimestamp i64 (8) | CRC32 (4)     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload (PayloadLen bytes)                                    │
//! │   [ObjectId u64][Timestamp i64][ActionId u32][PropCount u16]  │
//! │   [PropertyId u32][Tag u8][Value] ... per property            │
//! │   ... repeated for each event, sorted by (object, timestamp)  │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Zero padding up to the block size                             │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Flags bit 0 marks a spanned block: one slice of a single object's events
//! that did not fit in one block. The CRC covers the header (minus the CRC
//! field itself) and the payload.

mod codec;
mod descriptor;
mod index;

pub use codec::{encoded_len, Block, BlockHeader};
pub use descriptor::{BlockDescriptor, BlockExtent};
pub use index::{BlockIndex, Placement};

// =============================================================================
// Shared Constants (used by codec, index, storage)
// =============================================================================

/// Magic bytes identifying an eventdb block
pub(crate) const MAGIC: &[u8; 4] = b"EVBK";

/// Current block format version
pub(crate) const VERSION: u16 = 1;

/// Header size: 4 + 2 + 2 + 4 + 4 + 8 + 8 + 8 + 8 + 4 = 52 bytes
pub const BLOCK_HEADER_SIZE: usize = 52;

/// Offset of the CRC field inside the header
pub(crate) const CRC_OFFSET: usize = 48;

/// Fixed part of an encoded event: ObjectId + Timestamp + ActionId + PropCount
pub const EVENT_FIXED_SIZE: usize = 22;

/// Smallest usable block: a header plus one event without data
pub const MIN_BLOCK_SIZE: usize = BLOCK_HEADER_SIZE + EVENT_FIXED_SIZE;

/// Flags bit marking a spanned block
pub(crate) const FLAG_SPANNED: u16 = 0x0001;

/// Property value tags
pub(crate) const TAG_STRING: u8 = 1;
pub(crate) const TAG_INT: u8 = 2;
pub(crate) const TAG_FLOAT: u8 = 3;
pub(crate) const TAG_BOOLEAN: u8 = 4;
