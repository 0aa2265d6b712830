//! Block splitting
//!
//! Divides an oversized block into blocks that each fit `block_size`.
//!
//! ## Pivot Policy
//! - Several object ids: cut at the object boundary nearest the median
//!   event, so every object stays whole on one side
//! - One object id: cut at the median event (events are sorted by
//!   timestamp), and both halves become spanned blocks
//!
//! Halves that still overflow are cut again. A single event that cannot fit
//! on its own is a `BlockOverflow`.

use crate::block::{encoded_len, Block, BLOCK_HEADER_SIZE};
use crate::error::{EventDbError, Result};
use crate::event::Event;

/// Split `block` into blocks that each fit `block_size`, in physical order
///
/// `ordinal` is the position of the block being split, for error context.
pub(crate) fn split_block(block: Block, ordinal: usize, block_size: usize) -> Result<Vec<Block>> {
    let spanned = block.is_spanned();
    let mut out = Vec::new();
    partition(block.into_events(), spanned, ordinal, block_size, &mut out)?;

    tracing::debug!(
        ordinal,
        blocks = out.len(),
        spanned = out.iter().filter(|b| b.is_spanned()).count(),
        "block split planned"
    );
    Ok(out)
}

fn partition(
    mut events: Vec<Event>,
    spanned: bool,
    ordinal: usize,
    block_size: usize,
    out: &mut Vec<Block>,
) -> Result<()> {
    let payload: usize = events.iter().map(encoded_len).sum();
    let single_object = match (events.first(), events.last()) {
        (Some(first), Some(last)) => first.object_id() == last.object_id(),
        _ => true,
    };

    if BLOCK_HEADER_SIZE + payload <= block_size {
        out.push(Block::new(events, spanned && single_object));
        return Ok(());
    }

    if events.len() == 1 {
        return Err(EventDbError::BlockOverflow {
            object_id: events[0].object_id(),
            ordinal,
            size: BLOCK_HEADER_SIZE + payload,
            block_size,
        });
    }

    let (mid, halves_spanned) = if single_object {
        (events.len() / 2, true)
    } else {
        (object_boundary_near(&events, events.len() / 2), false)
    };

    let right = events.split_off(mid);
    partition(events, halves_spanned, ordinal, block_size, out)?;
    partition(right, halves_spanned, ordinal, block_size, out)
}

/// Index of the object boundary closest to `target`
///
/// A boundary `i` means events `[..i]` and `[i..]` share no object id.
/// Requires at least two distinct object ids.
fn object_boundary_near(events: &[Event], target: usize) -> usize {
    (1..events.len())
        .filter(|&i| events[i - 1].object_id() != events[i].object_id())
        .min_by_key(|&i| i.abs_diff(target))
        .unwrap_or(target)
}
