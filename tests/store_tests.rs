//! Tests for the block store
//!
//! These tests verify:
//! - Events land in the right block and come back in (object, timestamp) order
//! - Splits keep every event and the index ordering invariants
//! - Objects larger than a block become runs of spanned blocks
//! - Failed inserts leave the data file and the index untouched
//! - Reopening rebuilds an identical index
//! - Reloading picks up blocks written by another store on the same file
//! - With `sync_writes` every insert replaces the data file

use std::fs;
use std::path::PathBuf;

use eventdb::block::{BlockDescriptor, BlockExtent};
use eventdb::storage::{BlockStore, DATA_FILENAME};
use eventdb::{Event, EventDbError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

const BLOCK_SIZE: usize = 128;

fn data_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join(DATA_FILENAME)
}

fn open_store(temp_dir: &TempDir) -> BlockStore {
    BlockStore::open(&data_path(temp_dir), BLOCK_SIZE, false).unwrap()
}

/// Object ranges ascend, and spanned runs ascend by timestamp
fn assert_ordered(descriptors: &[BlockDescriptor]) {
    for pair in descriptors.windows(2) {
        let (prev, cur) = (&pair[0], &pair[1]);
        if prev.is_spanned() && cur.spans(prev.min_object_id()) {
            assert!(
                cur.min_timestamp() >= prev.max_timestamp(),
                "spanned parts out of order: {:?} then {:?}",
                prev,
                cur
            );
            assert_eq!(cur.part(), prev.part().map(|p| p + 1));
        } else {
            assert!(
                cur.min_object_id() > prev.max_object_id(),
                "object ranges overlap: {:?} then {:?}",
                prev,
                cur
            );
            assert_eq!(cur.part().unwrap_or(0), 0);
        }
    }
}

fn keys(events: &[Event]) -> Vec<(u64, i64)> {
    events.iter().map(Event::sort_key).collect()
}

// =============================================================================
// Basic Tests
// =============================================================================

#[test]
fn test_open_creates_empty_data_file() {
    let temp_dir = TempDir::new().unwrap();
    let store = open_store(&temp_dir);

    assert_eq!(store.block_count(), 0);
    assert_eq!(store.block_size(), BLOCK_SIZE);
    assert!(data_path(&temp_dir).exists());
    assert_eq!(fs::metadata(data_path(&temp_dir)).unwrap().len(), 0);
}

#[test]
fn test_first_event_creates_one_block() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    store.add_event(Event::new(1_000, 10, 1)).unwrap();

    assert_eq!(store.block_count(), 1);
    assert_eq!(
        fs::metadata(data_path(&temp_dir)).unwrap().len(),
        BLOCK_SIZE as u64
    );
    let d = store.index().get(0).unwrap();
    assert_eq!(d.extent(), BlockExtent::Whole { min_object_id: 10, max_object_id: 10 });
    assert_eq!(d.min_timestamp(), 1_000);
}

#[test]
fn test_events_fill_block_before_splitting() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    // 52 header + 3 * 22 = 118 bytes fits in 128
    for object_id in [3, 1, 2] {
        store.add_event(Event::new(0, object_id, 1)).unwrap();
    }
    assert_eq!(store.block_count(), 1);

    store.add_event(Event::new(0, 4, 1)).unwrap();
    assert_eq!(store.block_count(), 2);
    assert_eq!(keys(&store.events().unwrap()), vec![(1, 0), (2, 0), (3, 0), (4, 0)]);
    assert_ordered(store.index().as_slice());
}

#[test]
fn test_read_block_out_of_range() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);
    store.add_event(Event::new(0, 1, 1)).unwrap();

    let result = store.read_block(5);
    assert!(matches!(result, Err(EventDbError::BlockNotFound(5))));
}

// =============================================================================
// Split Tests
// =============================================================================

#[test]
fn test_split_keeps_objects_whole() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    for object_id in 1..=4 {
        store.add_event(Event::new(0, object_id, 1)).unwrap();
    }

    assert_eq!(store.block_count(), 2);
    for d in store.index().iter() {
        assert!(!d.is_spanned());
    }
    assert_eq!(store.index().get(0).unwrap().max_object_id(), 2);
    assert_eq!(store.index().get(1).unwrap().min_object_id(), 3);
}

#[test]
fn test_single_object_becomes_spanned_run() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    for i in 0..10 {
        store.add_event(Event::new(i * 1_000, 5, 1)).unwrap();
    }

    assert!(store.block_count() >= 4);
    for (i, d) in store.index().iter().enumerate() {
        assert_eq!(d.extent(), BlockExtent::Spanned { object_id: 5, part: i as u32 });
    }
    assert_ordered(store.index().as_slice());

    let expected: Vec<(u64, i64)> = (0..10).map(|i| (5, i * 1_000)).collect();
    assert_eq!(keys(&store.events().unwrap()), expected);
}

#[test]
fn test_spanned_run_accepts_out_of_order_timestamps() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    for i in 0..12 {
        store.add_event(Event::new(1_000 - i * 10, 5, 1)).unwrap();
    }
    for i in 0..6 {
        store.add_event(Event::new(905 + i * 20, 5, 2)).unwrap();
    }

    assert_ordered(store.index().as_slice());
    let events = store.events().unwrap();
    assert_eq!(events.len(), 18);
    assert!(events.windows(2).all(|w| w[0].sort_key() <= w[1].sort_key()));
}

#[test]
fn test_interleaved_objects_keep_every_event() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    let mut expected = Vec::new();
    for i in 0..60i64 {
        let object_id = ((i * 7) % 5) as u64 * 10;
        let event = Event::new(i, object_id, 1);
        expected.push(event.sort_key());
        store.add_event(event).unwrap();
        assert_ordered(store.index().as_slice());
    }
    expected.sort();

    assert_eq!(keys(&store.events().unwrap()), expected);
}

#[test]
fn test_new_object_between_spanned_runs_gets_own_block() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    for i in 0..4 {
        store.add_event(Event::new(i, 10, 1)).unwrap();
    }
    for i in 0..4 {
        store.add_event(Event::new(i, 30, 1)).unwrap();
    }
    assert!(store.index().iter().all(BlockDescriptor::is_spanned));
    let before = store.block_count();

    store.add_event(Event::new(0, 20, 1)).unwrap();

    assert_eq!(store.block_count(), before + 1);
    let whole: Vec<&BlockDescriptor> =
        store.index().iter().filter(|d| !d.is_spanned()).collect();
    assert_eq!(whole.len(), 1);
    assert_eq!(
        whole[0].extent(),
        BlockExtent::Whole { min_object_id: 20, max_object_id: 20 }
    );
    assert_ordered(store.index().as_slice());
}

// =============================================================================
// Failure Tests
// =============================================================================

#[test]
fn test_oversized_event_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);

    let long = "x".repeat(200);
    let result = store.add_event(Event::new(0, 9, 0).with_data(1, long.as_str()));

    assert!(matches!(result, Err(EventDbError::BlockOverflow { object_id: 9, .. })));
    assert_eq!(store.block_count(), 0);
    assert_eq!(fs::metadata(data_path(&temp_dir)).unwrap().len(), 0);
}

#[test]
fn test_failed_split_leaves_file_unchanged() {
    let temp_dir = TempDir::new().unwrap();
    let mut store = open_store(&temp_dir);
    store.add_event(Event::new(0, 1, 1)).unwrap();
    store.add_event(Event::new(0, 2, 1)).unwrap();

    let bytes_before = fs::read(data_path(&temp_dir)).unwrap();
    let index_before = store.index().clone();

    let long = "y".repeat(120);
    let result = store.add_event(Event::new(5, 2, 0).with_data(1, long.as_str()));

    assert!(matches!(result, Err(EventDbError::BlockOverflow { .. })));
    assert_eq!(fs::read(data_path(&temp_dir)).unwrap(), bytes_before);
    assert_eq!(store.index(), &index_before);
    assert!(!temp_dir.path().join("data.tmp").exists());
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_rebuilds_same_index() {
    let temp_dir = TempDir::new().unwrap();
    let (index, events) = {
        let mut store = open_store(&temp_dir);
        for i in 0..40i64 {
            let object_id = ((i * 3) % 7) as u64;
            store.add_event(Event::new(i * 100, object_id, 1)).unwrap();
        }
        store.sync().unwrap();
        (store.index().clone(), store.events().unwrap())
    };

    let mut store = open_store(&temp_dir);
    assert_eq!(store.index(), &index);
    assert_eq!(store.events().unwrap(), events);
}

#[test]
fn test_open_rejects_trailing_partial_block() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(data_path(&temp_dir), vec![0u8; 100]).unwrap();

    let result = BlockStore::open(&data_path(&temp_dir), BLOCK_SIZE, false);
    assert!(matches!(result, Err(EventDbError::CorruptBlock { ordinal: 0, .. })));
}

#[test]
fn test_open_rejects_corrupt_block() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&temp_dir);
        for object_id in 1..=6 {
            store.add_event(Event::new(0, object_id, 1)).unwrap();
        }
    }

    let mut bytes = fs::read(data_path(&temp_dir)).unwrap();
    bytes[BLOCK_SIZE + 60] ^= 0xFF;
    fs::write(data_path(&temp_dir), bytes).unwrap();

    let result = BlockStore::open(&data_path(&temp_dir), BLOCK_SIZE, false);
    assert!(matches!(result, Err(EventDbError::CorruptBlock { ordinal: 1, .. })));
}

#[test]
fn test_open_keeps_split_file_until_reload() {
    let temp_dir = TempDir::new().unwrap();
    let temp_path = temp_dir.path().join("data.tmp");
    fs::write(&temp_path, b"half written").unwrap();

    let mut store = open_store(&temp_dir);
    assert_eq!(store.block_count(), 0);
    assert!(temp_path.exists());

    store.reload().unwrap();
    assert!(!temp_path.exists());
    assert_eq!(store.block_count(), 0);
}

#[test]
fn test_reload_sees_other_writer() {
    let temp_dir = TempDir::new().unwrap();
    let mut writer = open_store(&temp_dir);
    let mut reader = open_store(&temp_dir);

    // Splits replace `data`, leaving `reader` on the old file
    for object_id in 1..=6 {
        writer.add_event(Event::new(0, object_id, 1)).unwrap();
    }
    assert_eq!(reader.block_count(), 0);

    reader.reload().unwrap();
    assert_eq!(reader.index(), writer.index());
    assert_eq!(reader.events().unwrap(), writer.events().unwrap());

    reader.add_event(Event::new(0, 7, 1)).unwrap();
    writer.reload().unwrap();
    assert_eq!(writer.events().unwrap().len(), 7);
    assert_eq!(writer.index(), reader.index());
}

#[test]
fn test_writes_after_split_reach_new_file() {
    let temp_dir = TempDir::new().unwrap();
    {
        let mut store = open_store(&temp_dir);
        for object_id in 1..=4 {
            store.add_event(Event::new(0, object_id, 1)).unwrap();
        }
        assert_eq!(store.block_count(), 2);

        // Fits in block 0, so it is written in place on the renamed file
        store.add_event(Event::new(10, 1, 1)).unwrap();
        assert_eq!(store.block_count(), 2);
    }

    let mut store = open_store(&temp_dir);
    let events = store.events().unwrap();
    assert_eq!(
        keys(&events),
        vec![(1, 0), (1, 10), (2, 0), (3, 0), (4, 0)]
    );
}

#[cfg(unix)]
#[test]
fn test_sync_writes_replace_data_file() {
    use std::os::unix::fs::MetadataExt;

    let inode = |temp_dir: &TempDir| fs::metadata(data_path(temp_dir)).unwrap().ino();

    let synced_dir = TempDir::new().unwrap();
    let mut synced = BlockStore::open(&data_path(&synced_dir), BLOCK_SIZE, true).unwrap();
    synced.add_event(Event::new(0, 1, 1)).unwrap();
    let before = inode(&synced_dir);
    synced.add_event(Event::new(1, 1, 1)).unwrap();
    assert_ne!(inode(&synced_dir), before);
    assert_eq!(synced.events().unwrap().len(), 2);
    assert!(!synced_dir.path().join("data.tmp").exists());

    let plain_dir = TempDir::new().unwrap();
    let mut plain = open_store(&plain_dir);
    plain.add_event(Event::new(0, 1, 1)).unwrap();
    let before = inode(&plain_dir);
    plain.add_event(Event::new(1, 1, 1)).unwrap();
    assert_eq!(inode(&plain_dir), before);
}

#[test]
fn test_open_rejects_tiny_block_size() {
    let temp_dir = TempDir::new().unwrap();

    let result = BlockStore::open(&data_path(&temp_dir), 16, false);
    assert!(matches!(result, Err(EventDbError::Config(_))));
}
