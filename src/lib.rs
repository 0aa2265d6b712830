//! # eventdb
//!
//! A per-object-type event store with:
//! - Fixed-size blocks of events sorted by (object id, timestamp)
//! - Automatic block splitting, including objects that span several blocks
//! - An in-memory block index rebuilt from the data file at open
//! - A sentinel lock file for single-writer access across processes
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        ObjectFile                            │
//! │          (Closed → Open → Locked lifecycle, facade)          │
//! └──────┬───────────────────┬──────────────────────┬───────────┘
//!        │                   │                      │
//!        ▼                   ▼                      ▼
//!   ┌──────────┐      ┌─────────────┐        ┌─────────────┐
//!   │  Header  │      │ BlockStore  │        │  LockFile   │
//!   │(registry)│      │ (data file) │        │ (sentinel)  │
//!   └──────────┘      └──────┬──────┘        └─────────────┘
//!                            │
//!                 ┌──────────┴──────────┐
//!                 ▼                     ▼
//!          ┌─────────────┐       ┌─────────────┐
//!          │ BlockIndex  │       │ Block codec │
//!          │(descriptors)│       │  + split    │
//!          └─────────────┘       └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use eventdb::{Database, Event};
//!
//! # fn main() -> eventdb::Result<()> {
//! let db = Database::new("/tmp/db");
//! let mut users = db.object_file("users")?;
//! users.open()?;
//! users.lock()?;
//!
//! let sign_up = users.action_id("sign_up")?;
//! let name = users.property_id("first_name")?;
//! users.add_event(Event::new(1_325_376_000_000_000, 42, sign_up).with_data(name, "Ada"))?;
//!
//! users.unlock()?;
//! users.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod event;
pub mod registry;
pub mod header;
pub mod block;
pub mod storage;
pub mod lock;
pub mod object_file;
pub mod database;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{EventDbError, Result};
pub use config::{Config, DEFAULT_BLOCK_SIZE};
pub use event::{Event, PropertyValue, NO_ACTION};
pub use block::{BlockDescriptor, BlockExtent};
pub use object_file::{ObjectFile, State};
pub use database::Database;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of eventdb
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
