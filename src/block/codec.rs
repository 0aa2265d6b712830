//! Block codec
//!
//! Encodes one block's header and events into exactly `block_size` bytes and
//! decodes them back, validating everything the index relies on.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut};

use crate::error::{EventDbError, Result};
use crate::event::{Event, PropertyValue};

use super::{
    BLOCK_HEADER_SIZE, CRC_OFFSET, EVENT_FIXED_SIZE, FLAG_SPANNED, MAGIC, TAG_BOOLEAN,
    TAG_FLOAT, TAG_INT, TAG_STRING, VERSION,
};

/// Block-local header, derived from the block's events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    pub spanned: bool,
    pub event_count: u32,
    pub payload_len: u32,
    pub min_object_id: u64,
    pub max_object_id: u64,
    pub min_timestamp: i64,
    pub max_timestamp: i64,
}

impl BlockHeader {
    fn describe(events: &[Event], spanned: bool) -> Self {
        let mut header = Self {
            spanned,
            event_count: events.len() as u32,
            payload_len: events.iter().map(encoded_len).sum::<usize>() as u32,
            min_object_id: 0,
            max_object_id: 0,
            min_timestamp: 0,
            max_timestamp: 0,
        };

        if let (Some(first), Some(last)) = (events.first(), events.last()) {
            header.min_object_id = first.object_id();
            header.max_object_id = last.object_id();
            header.min_timestamp = events.iter().map(Event::timestamp).min().unwrap_or(0);
            header.max_timestamp = events.iter().map(Event::timestamp).max().unwrap_or(0);
        }
        header
    }

    /// Total encoded size (header + payload), before padding
    pub fn encoded_size(&self) -> usize {
        BLOCK_HEADER_SIZE + self.payload_len as usize
    }
}

/// One decoded block: header plus events sorted by (object_id, timestamp)
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    header: BlockHeader,
    events: Vec<Event>,
}

impl Block {
    /// Build a block, sorting the events by (object_id, timestamp)
    ///
    /// The sort is stable, so events with equal keys keep their order.
    pub fn new(mut events: Vec<Event>, spanned: bool) -> Self {
        events.sort_by_key(Event::sort_key);
        let header = BlockHeader::describe(&events, spanned);
        Self { header, events }
    }

    pub fn header(&self) -> &BlockHeader {
        &self.header
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn into_events(self) -> Vec<Event> {
        self.events
    }

    pub fn is_spanned(&self) -> bool {
        self.header.spanned
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Insert an event after any existing events with the same key
    pub fn insert(&mut self, event: Event) {
        let key = event.sort_key();
        let pos = self.events.partition_point(|e| e.sort_key() <= key);
        self.events.insert(pos, event);
        self.header = BlockHeader::describe(&self.events, self.header.spanned);
    }

    /// True when the encoded block fits in `block_size` bytes
    pub fn fits(&self, block_size: usize) -> bool {
        self.header.encoded_size() <= block_size
    }

    /// Encode into exactly `block_size` bytes
    ///
    /// `ordinal` is only used for error context. Fails with `BlockOverflow`
    /// when the header and payload together exceed `block_size`.
    pub fn encode(&self, ordinal: usize, block_size: usize) -> Result<Vec<u8>> {
        let size = self.header.encoded_size();
        if size > block_size {
            return Err(EventDbError::BlockOverflow {
                object_id: self.header.min_object_id,
                ordinal,
                size,
                block_size,
            });
        }

        if let Some(event) = self.events.iter().find(|e| e.data_len() > u16::MAX as usize) {
            return Err(EventDbError::Config(format!(
                "event for object {} has {} properties, at most {} are supported",
                event.object_id(),
                event.data_len(),
                u16::MAX
            )));
        }

        let flags = if self.header.spanned { FLAG_SPANNED } else { 0 };

        let mut buf = Vec::with_capacity(block_size);
        buf.put_slice(MAGIC);
        buf.put_u16_le(VERSION);
        buf.put_u16_le(flags);
        buf.put_u32_le(self.header.event_count);
        buf.put_u32_le(self.header.payload_len);
        buf.put_u64_le(self.header.min_object_id);
        buf.put_u64_le(self.header.max_object_id);
        buf.put_i64_le(self.header.min_timestamp);
        buf.put_i64_le(self.header.max_timestamp);
        buf.put_u32_le(0); // CRC placeholder

        for event in &self.events {
            encode_event(&mut buf, event);
        }
        debug_assert_eq!(buf.len(), size);

        let crc = block_crc(&buf[..CRC_OFFSET], &buf[BLOCK_HEADER_SIZE..]);
        buf[CRC_OFFSET..BLOCK_HEADER_SIZE].copy_from_slice(&crc.to_le_bytes());

        buf.resize(block_size, 0);
        Ok(buf)
    }

    /// Decode a block, validating shape, checksum and ordering
    ///
    /// `ordinal` is only used for error context.
    pub fn decode(bytes: &[u8], ordinal: usize) -> Result<Self> {
        let corrupt = |reason: String| EventDbError::corrupt_block(ordinal, reason);

        if bytes.len() < BLOCK_HEADER_SIZE {
            return Err(corrupt(format!(
                "expected at least {} bytes, got {}",
                BLOCK_HEADER_SIZE,
                bytes.len()
            )));
        }
        if &bytes[0..4] != MAGIC {
            return Err(corrupt(format!(
                "invalid magic: expected EVBK, got {:?}",
                &bytes[0..4]
            )));
        }

        let mut cursor = &bytes[4..BLOCK_HEADER_SIZE];
        let version = cursor.get_u16_le();
        if version != VERSION {
            return Err(corrupt(format!("unsupported version: {}", version)));
        }
        let flags = cursor.get_u16_le();
        if flags & !FLAG_SPANNED != 0 {
            return Err(corrupt(format!("unknown flags: 0x{:04x}", flags)));
        }
        let header = BlockHeader {
            spanned: flags & FLAG_SPANNED != 0,
            event_count: cursor.get_u32_le(),
            payload_len: cursor.get_u32_le(),
            min_object_id: cursor.get_u64_le(),
            max_object_id: cursor.get_u64_le(),
            min_timestamp: cursor.get_i64_le(),
            max_timestamp: cursor.get_i64_le(),
        };
        let stored_crc = cursor.get_u32_le();

        let payload_end = header.encoded_size();
        if payload_end > bytes.len() {
            return Err(corrupt(format!(
                "payload of {} bytes does not fit in a block of {}",
                header.payload_len,
                bytes.len()
            )));
        }
        let payload = &bytes[BLOCK_HEADER_SIZE..payload_end];

        if block_crc(&bytes[..CRC_OFFSET], payload) != stored_crc {
            return Err(corrupt("checksum mismatch".to_string()));
        }

        let capacity = (header.event_count as usize).min(payload.len() / EVENT_FIXED_SIZE);
        let mut events = Vec::with_capacity(capacity);
        let mut cursor = payload;
        while cursor.has_remaining() {
            let event = decode_event(&mut cursor).map_err(corrupt)?;
            events.push(event);
        }

        if events.len() != header.event_count as usize {
            return Err(corrupt(format!(
                "header says {} events, payload holds {}",
                header.event_count,
                events.len()
            )));
        }
        if events.windows(2).any(|w| w[0].sort_key() > w[1].sort_key()) {
            return Err(corrupt("events are not sorted".to_string()));
        }
        if BlockHeader::describe(&events, header.spanned) != header {
            return Err(corrupt("header ranges do not match the events".to_string()));
        }
        if header.spanned && header.min_object_id != header.max_object_id {
            return Err(corrupt(format!(
                "spanned block holds objects {}..={}",
                header.min_object_id, header.max_object_id
            )));
        }

        Ok(Self { header, events })
    }
}

/// Encoded size of one event in the payload
pub fn encoded_len(event: &Event) -> usize {
    EVENT_FIXED_SIZE
        + event
            .data_iter()
            .map(|(_, value)| 4 + 1 + value_len(value))
            .sum::<usize>()
}

fn value_len(value: &PropertyValue) -> usize {
    match value {
        PropertyValue::String(s) => 4 + s.len(),
        PropertyValue::Int(_) | PropertyValue::Float(_) => 8,
        PropertyValue::Boolean(_) => 1,
    }
}

fn block_crc(header: &[u8], payload: &[u8]) -> u32 {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(header);
    hasher.update(payload);
    hasher.finalize()
}

fn encode_event(buf: &mut Vec<u8>, event: &Event) {
    buf.put_u64_le(event.object_id());
    buf.put_i64_le(event.timestamp());
    buf.put_u32_le(event.action_id());
    buf.put_u16_le(event.data_len() as u16);

    for (property_id, value) in event.data_iter() {
        buf.put_u32_le(property_id);
        match value {
            PropertyValue::String(s) => {
                buf.put_u8(TAG_STRING);
                buf.put_u32_le(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            PropertyValue::Int(v) => {
                buf.put_u8(TAG_INT);
                buf.put_i64_le(*v);
            }
            PropertyValue::Float(v) => {
                buf.put_u8(TAG_FLOAT);
                buf.put_u64_le(v.to_bits());
            }
            PropertyValue::Boolean(v) => {
                buf.put_u8(TAG_BOOLEAN);
                buf.put_u8(u8::from(*v));
            }
        }
    }
}

/// Fail unless `cursor` still holds `n` bytes (Buf getters panic otherwise)
fn need(cursor: &&[u8], n: usize, what: &str) -> std::result::Result<(), String> {
    if cursor.remaining() < n {
        return Err(format!(
            "truncated {}: expected {} bytes, got {}",
            what,
            n,
            cursor.remaining()
        ));
    }
    Ok(())
}

fn decode_event(cursor: &mut &[u8]) -> std::result::Result<Event, String> {
    need(cursor, EVENT_FIXED_SIZE, "event")?;
    let object_id = cursor.get_u64_le();
    let timestamp = cursor.get_i64_le();
    let action_id = cursor.get_u32_le();
    let property_count = cursor.get_u16_le();

    let mut data = BTreeMap::new();
    let mut last_id = None;
    for _ in 0..property_count {
        need(cursor, 5, "property")?;
        let property_id = cursor.get_u32_le();
        if last_id.is_some_and(|last| property_id <= last) {
            return Err(format!(
                "property {} out of order in event for object {}",
                property_id, object_id
            ));
        }
        last_id = Some(property_id);

        let value = match cursor.get_u8() {
            TAG_STRING => {
                need(cursor, 4, "string length")?;
                let len = cursor.get_u32_le() as usize;
                need(cursor, len, "string")?;
                let bytes = cursor[..len].to_vec();
                cursor.advance(len);
                let s = String::from_utf8(bytes)
                    .map_err(|e| format!("property {} is not UTF-8: {}", property_id, e))?;
                PropertyValue::String(s)
            }
            TAG_INT => {
                need(cursor, 8, "int")?;
                PropertyValue::Int(cursor.get_i64_le())
            }
            TAG_FLOAT => {
                need(cursor, 8, "float")?;
                PropertyValue::Float(f64::from_bits(cursor.get_u64_le()))
            }
            TAG_BOOLEAN => {
                need(cursor, 1, "boolean")?;
                match cursor.get_u8() {
                    0 => PropertyValue::Boolean(false),
                    1 => PropertyValue::Boolean(true),
                    other => return Err(format!("invalid boolean byte {}", other)),
                }
            }
            tag => return Err(format!("unknown value tag 0x{:02x}", tag)),
        };
        data.insert(property_id, value);
    }

    Ok(Event::from_parts(timestamp, object_id, action_id, data))
}
