//! Registry implementation
//!
//! Vec-backed table with a name → id lookup map.

use std::collections::HashMap;

use crate::error::{EventDbError, Result};

use super::Entry;

/// Append-only id ↔ name table
#[derive(Debug, Clone, Default)]
pub struct Registry {
    /// Entries in id order; entry `i` has id `i + 1`
    entries: Vec<Entry>,
    /// Name → id lookup
    by_name: HashMap<String, u32>,
    /// Set when entries were added since the last save
    dirty: bool,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from persisted entries
    ///
    /// Entries must carry ids 1..=n in order with unique, non-empty names.
    pub fn from_entries(entries: Vec<Entry>) -> Result<Self> {
        let mut by_name = HashMap::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            let expected = i as u32 + 1;
            if entry.id != expected {
                return Err(EventDbError::CorruptHeader(format!(
                    "registry id {} found where {} was expected",
                    entry.id, expected
                )));
            }
            if entry.name.is_empty() {
                return Err(EventDbError::CorruptHeader(format!(
                    "registry id {} has an empty name",
                    entry.id
                )));
            }
            if by_name.insert(entry.name.clone(), entry.id).is_some() {
                return Err(EventDbError::CorruptHeader(format!(
                    "registry name {:?} is registered twice",
                    entry.name
                )));
            }
        }

        Ok(Self {
            entries,
            by_name,
            dirty: false,
        })
    }

    /// Return the id for `name`, registering it if unknown
    pub fn lookup_or_create(&mut self, name: &str) -> Result<u32> {
        if let Some(&id) = self.by_name.get(name) {
            return Ok(id);
        }
        if name.is_empty() {
            return Err(EventDbError::Config(
                "registry names must not be empty".to_string(),
            ));
        }

        let id = u32::try_from(self.entries.len() + 1).map_err(|_| {
            EventDbError::Config("registry is full".to_string())
        })?;
        self.entries.push(Entry {
            id,
            name: name.to_string(),
        });
        self.by_name.insert(name.to_string(), id);
        self.dirty = true;

        Ok(id)
    }

    /// Find the id of an existing name
    pub fn lookup(&self, name: &str) -> Option<u32> {
        self.by_name.get(name).copied()
    }

    /// Resolve an id to its name
    pub fn resolve(&self, id: u32) -> Option<&str> {
        let index = (id as usize).checked_sub(1)?;
        self.entries.get(index).map(|e| e.name.as_str())
    }

    /// Number of registered names
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in id order
    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.iter()
    }

    /// True when names were added since the last save
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub(crate) fn mark_clean(&mut self) {
        self.dirty = false;
    }
}
