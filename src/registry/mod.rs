//! Registry Module
//!
//! Append-only id ↔ name tables for actions and properties.
//!
//! ## Responsibilities
//! - Assign 1-based, monotonically increasing ids to new names
//! - Resolve ids back to names when rendering events
//! - Track whether unsaved entries exist (so the header can be flushed)
//!
//! Ids are never reused or reassigned. Entries are persisted as part of the
//! object file header (see `crate::header`).

mod table;

pub use table::Registry;

use serde::{Deserialize, Serialize};

/// One registered name
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    /// 1-based id
    pub id: u32,
    pub name: String,
}

/// A registered action
pub type Action = Entry;

/// A registered property
pub type Property = Entry;
