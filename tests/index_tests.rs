//! Tests for the block index
//!
//! These tests verify:
//! - Routing of events to whole blocks, spanned runs and gaps
//! - Splicing descriptors after splits renumbers ordinals and parts
//! - Ordering violations are reported as corrupt blocks
//! - Rebuilding the index from encoded blocks

use std::io::Cursor;

use eventdb::block::{Block, BlockDescriptor, BlockExtent, BlockIndex, Placement};
use eventdb::{Event, EventDbError};

// =============================================================================
// Helper Functions
// =============================================================================

const BLOCK_SIZE: usize = 256;

/// A block holding one event at each end of the given ranges
fn block(min_object: u64, max_object: u64, min_ts: i64, max_ts: i64, spanned: bool) -> Block {
    let events = vec![
        Event::new(min_ts, min_object, 1),
        Event::new(max_ts, max_object, 1),
    ];
    Block::new(events, spanned)
}

fn whole(min_object: u64, max_object: u64, min_ts: i64, max_ts: i64) -> BlockDescriptor {
    BlockDescriptor::from_header(0, block(min_object, max_object, min_ts, max_ts, false).header())
}

fn spanned(object_id: u64, min_ts: i64, max_ts: i64) -> BlockDescriptor {
    BlockDescriptor::from_header(0, block(object_id, object_id, min_ts, max_ts, true).header())
}

/// [1..3] [4..5] [6 p0] [6 p1] [6 p2] [7..9] [10 p0] [10 p1]
fn sample_index() -> BlockIndex {
    BlockIndex::from_descriptors(vec![
        whole(1, 3, 100, 200),
        whole(4, 5, 100, 200),
        spanned(6, 100, 200),
        spanned(6, 300, 400),
        spanned(6, 500, 600),
        whole(7, 9, 100, 200),
        spanned(10, 100, 200),
        spanned(10, 300, 400),
    ])
    .unwrap()
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_from_descriptors_assigns_ordinals_and_parts() {
    let index = sample_index();

    assert_eq!(index.len(), 8);
    for (i, d) in index.iter().enumerate() {
        assert_eq!(d.ordinal(), i);
    }

    let parts: Vec<Option<u32>> = index.iter().map(BlockDescriptor::part).collect();
    assert_eq!(
        parts,
        vec![None, None, Some(0), Some(1), Some(2), None, Some(0), Some(1)]
    );
    assert_eq!(
        index.get(3).unwrap().extent(),
        BlockExtent::Spanned { object_id: 6, part: 1 }
    );
    assert_eq!(
        index.get(5).unwrap().extent(),
        BlockExtent::Whole { min_object_id: 7, max_object_id: 9 }
    );
}

#[test]
fn test_from_descriptors_rejects_overlapping_whole_blocks() {
    let result = BlockIndex::from_descriptors(vec![whole(1, 5, 0, 10), whole(5, 8, 0, 10)]);
    assert!(matches!(result, Err(EventDbError::CorruptBlock { ordinal: 1, .. })));
}

#[test]
fn test_from_descriptors_rejects_descending_objects() {
    let result = BlockIndex::from_descriptors(vec![whole(5, 8, 0, 10), whole(1, 3, 0, 10)]);
    assert!(matches!(result, Err(EventDbError::CorruptBlock { ordinal: 1, .. })));
}

#[test]
fn test_from_descriptors_rejects_unordered_spanned_parts() {
    let result = BlockIndex::from_descriptors(vec![spanned(6, 300, 400), spanned(6, 100, 200)]);
    assert!(matches!(result, Err(EventDbError::CorruptBlock { ordinal: 1, .. })));
}

#[test]
fn test_spanned_parts_may_share_a_boundary_timestamp() {
    let index =
        BlockIndex::from_descriptors(vec![spanned(6, 100, 200), spanned(6, 200, 300)]).unwrap();
    assert_eq!(index.get(1).unwrap().part(), Some(1));
}

// =============================================================================
// Placement Tests
// =============================================================================

#[test]
fn test_empty_index_places_new_block_at_zero() {
    let index = BlockIndex::new();
    assert_eq!(index.find_block_for(42, 0), Placement::NewBlock(0));
}

#[test]
fn test_object_inside_whole_block() {
    let index = sample_index();

    assert_eq!(index.find_block_for(1, 0), Placement::Block(0));
    assert_eq!(index.find_block_for(2, 150), Placement::Block(0));
    assert_eq!(index.find_block_for(3, 999), Placement::Block(0));
    assert_eq!(index.find_block_for(5, 0), Placement::Block(1));
    assert_eq!(index.find_block_for(8, 0), Placement::Block(5));
}

#[test]
fn test_spanned_object_routed_by_timestamp() {
    let index = sample_index();

    // Before the first part starts: first part
    assert_eq!(index.find_block_for(6, 50), Placement::Block(2));
    assert_eq!(index.find_block_for(6, 150), Placement::Block(2));
    // Between parts: the part that started last
    assert_eq!(index.find_block_for(6, 250), Placement::Block(2));
    assert_eq!(index.find_block_for(6, 300), Placement::Block(3));
    assert_eq!(index.find_block_for(6, 450), Placement::Block(3));
    // After the last part: last part
    assert_eq!(index.find_block_for(6, 10_000), Placement::Block(4));

    assert_eq!(index.find_block_for(10, 350), Placement::Block(7));
}

#[test]
fn test_gap_prefers_previous_whole_block() {
    let index = BlockIndex::from_descriptors(vec![whole(1, 3, 0, 10), whole(7, 9, 0, 10)]).unwrap();
    assert_eq!(index.find_block_for(5, 0), Placement::Block(0));
}

#[test]
fn test_gap_after_spanned_run_uses_next_whole_block() {
    let index = sample_index();
    // No object between 6 and 7, so use a tighter index
    let index2 = BlockIndex::from_descriptors(vec![spanned(6, 0, 10), whole(9, 12, 0, 10)]).unwrap();

    assert_eq!(index2.find_block_for(7, 0), Placement::Block(1));
    // Before everything in the sample index: first block is whole
    assert_eq!(index.find_block_for(0, 0), Placement::Block(0));
}

#[test]
fn test_gap_between_spanned_runs_gets_new_block() {
    let index =
        BlockIndex::from_descriptors(vec![spanned(6, 0, 10), spanned(6, 20, 30), spanned(10, 0, 10)])
            .unwrap();

    assert_eq!(index.find_block_for(8, 0), Placement::NewBlock(2));
    assert_eq!(index.find_block_for(2, 0), Placement::NewBlock(0));
    assert_eq!(index.find_block_for(11, 0), Placement::NewBlock(3));
}

#[test]
fn test_object_after_last_whole_block_joins_it() {
    let index = BlockIndex::from_descriptors(vec![whole(1, 3, 0, 10)]).unwrap();
    assert_eq!(index.find_block_for(100, 0), Placement::Block(0));
}

// =============================================================================
// Update Tests
// =============================================================================

#[test]
fn test_update_splices_split_result_and_renumbers() {
    let mut index = sample_index();

    // Split [7..9] into [7] and [8..9]
    index.update(5, 1, vec![whole(7, 7, 100, 200), whole(8, 9, 100, 200)]);

    assert_eq!(index.len(), 9);
    assert_eq!(index.get(5).unwrap().max_object_id(), 7);
    assert_eq!(index.get(6).unwrap().min_object_id(), 8);
    for (i, d) in index.iter().enumerate() {
        assert_eq!(d.ordinal(), i);
    }
    assert_eq!(index.get(7).unwrap().part(), Some(0));
    assert_eq!(index.get(8).unwrap().part(), Some(1));
}

#[test]
fn test_update_extends_spanned_run() {
    let mut index = sample_index();

    // Part 1 of object 6 splits in two
    index.update(3, 1, vec![spanned(6, 300, 350), spanned(6, 350, 400)]);

    let parts: Vec<Option<u32>> = index.iter().map(BlockDescriptor::part).collect();
    assert_eq!(
        parts,
        vec![None, None, Some(0), Some(1), Some(2), Some(3), None, Some(0), Some(1)]
    );
}

#[test]
fn test_update_inserts_new_block() {
    let mut index = BlockIndex::from_descriptors(vec![spanned(6, 0, 10), spanned(10, 0, 10)]).unwrap();

    index.update(1, 0, vec![whole(8, 8, 5, 5)]);

    assert_eq!(index.len(), 3);
    assert_eq!(index.get(1).unwrap().min_object_id(), 8);
    assert_eq!(index.get(2).unwrap().ordinal(), 2);
    assert_eq!(index.find_block_for(8, 0), Placement::Block(1));
}

// =============================================================================
// Rebuild Tests
// =============================================================================

fn encode_all(blocks: &[Block]) -> Vec<u8> {
    let mut bytes = Vec::new();
    for (ordinal, block) in blocks.iter().enumerate() {
        bytes.extend(block.encode(ordinal, BLOCK_SIZE).unwrap());
    }
    bytes
}

#[test]
fn test_rebuild_from_encoded_blocks() {
    let blocks = vec![
        block(1, 3, 100, 200, false),
        block(6, 6, 100, 200, true),
        block(6, 6, 300, 400, true),
        block(7, 9, 100, 200, false),
    ];
    let bytes = encode_all(&blocks);

    let index = BlockIndex::rebuild(Cursor::new(bytes), BLOCK_SIZE, blocks.len()).unwrap();

    let expected = BlockIndex::from_descriptors(vec![
        whole(1, 3, 100, 200),
        spanned(6, 100, 200),
        spanned(6, 300, 400),
        whole(7, 9, 100, 200),
    ])
    .unwrap();
    assert_eq!(index, expected);
}

#[test]
fn test_rebuild_reports_corrupt_ordinal() {
    let blocks = vec![
        block(1, 3, 100, 200, false),
        block(4, 5, 100, 200, false),
        block(7, 9, 100, 200, false),
    ];
    let mut bytes = encode_all(&blocks);
    // Damage the payload of block 1
    bytes[BLOCK_SIZE + 60] ^= 0xFF;

    let result = BlockIndex::rebuild(Cursor::new(bytes), BLOCK_SIZE, blocks.len());
    assert!(matches!(result, Err(EventDbError::CorruptBlock { ordinal: 1, .. })));
}

#[test]
fn test_rebuild_rejects_empty_block() {
    let bytes = Block::new(Vec::new(), false).encode(0, BLOCK_SIZE).unwrap();

    let result = BlockIndex::rebuild(Cursor::new(bytes), BLOCK_SIZE, 1);
    assert!(matches!(result, Err(EventDbError::CorruptBlock { ordinal: 0, .. })));
}

#[test]
fn test_rebuild_short_input_is_io_error() {
    let bytes = encode_all(&[block(1, 3, 100, 200, false)]);

    let result = BlockIndex::rebuild(Cursor::new(bytes), BLOCK_SIZE, 2);
    assert!(matches!(result, Err(EventDbError::Io(_))));
}
