//! Event value object
//!
//! An event is a timestamped record about one object, optionally tagged with
//! an action and a set of property values. Events are built by the caller and
//! handed to the object file by value.

use std::collections::BTreeMap;
use std::fmt;

/// Action id meaning "no action"
pub const NO_ACTION: u32 = 0;

/// A typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    String(String),
    Int(i64),
    Float(f64),
    Boolean(bool),
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::String(s) => write!(f, "{:?}", s),
            PropertyValue::Int(v) => write!(f, "{}", v),
            PropertyValue::Float(v) => write!(f, "{}", v),
            PropertyValue::Boolean(v) => write!(f, "{}", v),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Boolean(value)
    }
}

/// A single event
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// Microseconds since the Unix epoch
    timestamp: i64,
    object_id: u64,
    /// 0 when the event carries no action
    action_id: u32,
    /// Property id → value, kept ordered so encoding is deterministic
    data: BTreeMap<u32, PropertyValue>,
}

impl Event {
    /// Create an event without data
    pub fn new(timestamp: i64, object_id: u64, action_id: u32) -> Self {
        Self {
            timestamp,
            object_id,
            action_id,
            data: BTreeMap::new(),
        }
    }

    /// Attach a property value (replaces any previous value for the id)
    pub fn with_data(mut self, property_id: u32, value: impl Into<PropertyValue>) -> Self {
        self.data.insert(property_id, value.into());
        self
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn object_id(&self) -> u64 {
        self.object_id
    }

    pub fn action_id(&self) -> u32 {
        self.action_id
    }

    pub fn has_action(&self) -> bool {
        self.action_id != NO_ACTION
    }

    /// Look up one property value
    pub fn data(&self, property_id: u32) -> Option<&PropertyValue> {
        self.data.get(&property_id)
    }

    /// All property values in ascending property id order
    pub fn data_iter(&self) -> impl Iterator<Item = (u32, &PropertyValue)> {
        self.data.iter().map(|(id, value)| (*id, value))
    }

    pub fn data_len(&self) -> usize {
        self.data.len()
    }

    /// Sort key within a block: (object_id, timestamp)
    pub fn sort_key(&self) -> (u64, i64) {
        (self.object_id, self.timestamp)
    }

    pub(crate) fn from_parts(
        timestamp: i64,
        object_id: u64,
        action_id: u32,
        data: BTreeMap<u32, PropertyValue>,
    ) -> Self {
        Self {
            timestamp,
            object_id,
            action_id,
            data,
        }
    }
}
