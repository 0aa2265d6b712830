//! Object File
//!
//! The event store of one object type: header, data file and lock sentinel.
//!
//! ## Lifecycle
//! ```text
//!   Closed ──open()──▶ Open ──lock()──▶ Locked
//!     ▲                 │  ◀─unlock()──   │
//!     └────close()──────┴─────close()─────┘
//! ```
//!
//! `add_event` and registering new action/property names require `Locked`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::block::{Block, BlockDescriptor};
use crate::config::{validate_block_size, Config, DEFAULT_BLOCK_SIZE};
use crate::database::Database;
use crate::error::{EventDbError, Result};
use crate::event::Event;
use crate::header::{Header, HEADER_FILENAME};
use crate::lock::{LockFile, LOCK_FILENAME};
use crate::registry::{Action, Property};
use crate::storage::{BlockStore, DATA_FILENAME};

/// Lifecycle state of an object file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Closed,
    Open,
    Locked,
}

/// Everything that only exists while the object file is open
struct Opened {
    header: Header,
    store: BlockStore,
    /// Present while Locked
    lock: Option<LockFile>,
}

impl Opened {
    /// Re-read the header and data file written by other owners
    ///
    /// Leaves both untouched on failure.
    fn refresh(&mut self, header_path: &Path) -> Result<()> {
        let header = Header::load(header_path)?.ok_or_else(|| {
            EventDbError::CorruptHeader(format!("{} is missing", header_path.display()))
        })?;
        if header.block_size() != self.store.block_size() {
            return Err(EventDbError::CorruptHeader(format!(
                "block size changed from {} to {} while open",
                self.store.block_size(),
                header.block_size()
            )));
        }

        self.store.reload()?;
        self.header = header;
        Ok(())
    }
}

/// Event store for one object type
pub struct ObjectFile {
    object_type: String,

    /// `<root>/<object_type>`
    path: PathBuf,

    /// Block size and write policy; `block_size` tracks the open header
    config: Config,

    /// `None` while Closed
    opened: Option<Opened>,
}

impl ObjectFile {
    /// Create a closed object file for `object_type` in `database`
    pub fn create(database: &Database, object_type: &str) -> Result<Self> {
        Self::with_config(database, object_type, Config::default())
    }

    /// Create a closed object file with explicit configuration
    pub fn with_config(database: &Database, object_type: &str, config: Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            object_type: object_type.to_string(),
            path: database.object_path(object_type)?,
            config,
            opened: None,
        })
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Change the block size used when the object file is first created
    ///
    /// Only allowed while Closed.
    pub fn set_block_size(&mut self, block_size: usize) -> Result<()> {
        if self.opened.is_some() {
            return Err(self.already_open());
        }
        validate_block_size(block_size)?;
        self.config.block_size = block_size;
        Ok(())
    }

    /// Open the object file
    ///
    /// On open:
    /// 1. Create the object type directory if needed
    /// 2. Load the header, or write a new one with the configured block size
    /// 3. Open the data file and rebuild the block index
    ///
    /// Any failure leaves the object file Closed.
    pub fn open(&mut self) -> Result<()> {
        let result = self.load();
        self.with_context(result)
    }

    fn load(&mut self) -> Result<()> {
        if self.opened.is_some() {
            return Err(self.already_open());
        }

        fs::create_dir_all(&self.path)?;

        let header_path = self.header_path();
        let header = match Header::load(&header_path)? {
            Some(header) => {
                if header.block_size() != self.config.block_size {
                    tracing::debug!(
                        object_type = %self.object_type,
                        configured = self.config.block_size,
                        stored = header.block_size(),
                        "using block size from existing header"
                    );
                }
                header
            }
            None => {
                let mut header = Header::new(self.config.block_size);
                header.save(&header_path)?;
                header
            }
        };

        let store = BlockStore::open(
            &self.path.join(DATA_FILENAME),
            header.block_size(),
            self.config.sync_writes,
        )?;

        self.config.block_size = header.block_size();
        tracing::info!(
            object_type = %self.object_type,
            blocks = store.block_count(),
            block_size = header.block_size(),
            actions = header.actions().count(),
            properties = header.properties().count(),
            "object file opened"
        );

        self.opened = Some(Opened {
            header,
            store,
            lock: None,
        });
        Ok(())
    }

    /// Take the writer lock
    ///
    /// Fails with `LockHeld` when this or any other owner already holds it.
    /// Once acquired, the header and data file are reloaded so writes by
    /// earlier lock holders are visible; if that fails the lock is released
    /// again and the object file stays Open.
    pub fn lock(&mut self) -> Result<()> {
        let result = self.acquire_lock();
        self.with_context(result)
    }

    fn acquire_lock(&mut self) -> Result<()> {
        let lock_path = self.lock_path();
        let header_path = self.header_path();
        let object_type = self.object_type.clone();
        let opened = self.opened_mut()?;

        if opened.lock.is_some() {
            return Err(EventDbError::LockHeld { path: lock_path });
        }
        let lock = LockFile::acquire(&lock_path, &object_type)?;

        if let Err(e) = opened.refresh(&header_path) {
            if let Err(release_err) = lock.release() {
                tracing::warn!(object_type = %object_type, error = %release_err, "failed to release lock after reload error");
            }
            return Err(e);
        }

        tracing::debug!(
            object_type = %object_type,
            blocks = opened.store.block_count(),
            "locked and reloaded"
        );
        opened.lock = Some(lock);
        Ok(())
    }

    /// Give up the writer lock
    ///
    /// Unsaved registry entries are written to the header first; if that
    /// fails the lock is kept. Fails with `NotLocked` unless Locked.
    pub fn unlock(&mut self) -> Result<()> {
        let result = self.release_lock();
        self.with_context(result)
    }

    fn release_lock(&mut self) -> Result<()> {
        let header_path = self.header_path();
        let opened = self.locked_mut()?;

        if opened.header.is_dirty() {
            opened.header.save(&header_path)?;
        }
        match opened.lock.take() {
            Some(lock) => lock.release(),
            None => Err(self.not_locked()),
        }
    }

    /// Close the object file
    ///
    /// Saves unsaved registry entries, syncs the data file, releases a held
    /// lock and resets the block size to the default. The object file is
    /// Closed afterwards even if one of those steps fails; the first error is
    /// returned.
    pub fn close(&mut self) -> Result<()> {
        let result = self.shut_down();
        self.with_context(result)
    }

    fn shut_down(&mut self) -> Result<()> {
        let header_path = self.header_path();
        let mut opened = self.opened.take().ok_or_else(|| self.not_open())?;

        let header_result = if opened.header.is_dirty() {
            opened.header.save(&header_path)
        } else {
            Ok(())
        };
        let sync_result = opened.store.sync();
        let lock_result = opened.lock.take().map_or(Ok(()), LockFile::release);

        self.config.block_size = DEFAULT_BLOCK_SIZE;
        tracing::info!(object_type = %self.object_type, "object file closed");

        header_result.and(sync_result).and(lock_result)
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Store one event
    ///
    /// Requires Locked. Unsaved registry entries are written to the header
    /// first, so stored events never refer to ids missing on disk.
    pub fn add_event(&mut self, event: Event) -> Result<()> {
        let result = self.store_event(event);
        self.with_context(result)
    }

    fn store_event(&mut self, event: Event) -> Result<()> {
        let header_path = self.header_path();
        let opened = self.locked_mut()?;

        if opened.header.is_dirty() {
            opened.header.save(&header_path)?;
        }
        if event.has_action() && opened.header.actions().resolve(event.action_id()).is_none() {
            tracing::debug!(
                object_id = event.object_id(),
                action_id = event.action_id(),
                "event refers to an unregistered action"
            );
        }

        opened.store.add_event(event)
    }

    /// Every stored event, in (object_id, timestamp) order
    pub fn events(&mut self) -> Result<Vec<Event>> {
        let result = self.opened_mut().and_then(|opened| opened.store.events());
        self.with_context(result)
    }

    /// Decode one block
    pub fn read_block(&mut self, ordinal: usize) -> Result<Block> {
        let result = self
            .opened_mut()
            .and_then(|opened| opened.store.read_block(ordinal));
        self.with_context(result)
    }

    // =========================================================================
    // Registries
    // =========================================================================

    /// Id of the action `name`, registering it if needed (requires Locked)
    pub fn action_id(&mut self, name: &str) -> Result<u32> {
        self.locked_mut()?.header.actions_mut().lookup_or_create(name)
    }

    /// Id of the property `name`, registering it if needed (requires Locked)
    pub fn property_id(&mut self, name: &str) -> Result<u32> {
        self.locked_mut()?.header.properties_mut().lookup_or_create(name)
    }

    pub fn find_action(&self, name: &str) -> Option<u32> {
        self.header()?.actions().lookup(name)
    }

    pub fn find_property(&self, name: &str) -> Option<u32> {
        self.header()?.properties().lookup(name)
    }

    pub fn action_name(&self, id: u32) -> Option<&str> {
        self.header()?.actions().resolve(id)
    }

    pub fn property_name(&self, id: u32) -> Option<&str> {
        self.header()?.properties().resolve(id)
    }

    /// Registered actions in id order (empty while Closed)
    pub fn actions(&self) -> &[Action] {
        match self.header() {
            Some(header) => header.actions().entries(),
            None => &[],
        }
    }

    /// Registered properties in id order (empty while Closed)
    pub fn properties(&self) -> &[Property] {
        match self.header() {
            Some(header) => header.properties().entries(),
            None => &[],
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn state(&self) -> State {
        match &self.opened {
            None => State::Closed,
            Some(Opened { lock: None, .. }) => State::Open,
            Some(Opened { lock: Some(_), .. }) => State::Locked,
        }
    }

    pub fn object_type(&self) -> &str {
        &self.object_type
    }

    /// Directory of this object type
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn block_size(&self) -> usize {
        self.config.block_size
    }

    pub fn block_count(&self) -> usize {
        self.opened.as_ref().map_or(0, |o| o.store.block_count())
    }

    pub fn action_count(&self) -> usize {
        self.actions().len()
    }

    pub fn property_count(&self) -> usize {
        self.properties().len()
    }

    /// Descriptors of every block in physical order (empty while Closed)
    pub fn descriptors(&self) -> &[BlockDescriptor] {
        match &self.opened {
            Some(opened) => opened.store.index().as_slice(),
            None => &[],
        }
    }

    pub fn descriptor(&self, ordinal: usize) -> Option<&BlockDescriptor> {
        self.descriptors().get(ordinal)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn header_path(&self) -> PathBuf {
        self.path.join(HEADER_FILENAME)
    }

    fn lock_path(&self) -> PathBuf {
        self.path.join(LOCK_FILENAME)
    }

    fn header(&self) -> Option<&Header> {
        self.opened.as_ref().map(|o| &o.header)
    }

    fn opened_mut(&mut self) -> Result<&mut Opened> {
        let not_open = self.not_open();
        self.opened.as_mut().ok_or(not_open)
    }

    fn locked_mut(&mut self) -> Result<&mut Opened> {
        let not_locked = self.not_locked();
        match self.opened.as_mut() {
            Some(opened) if opened.lock.is_some() => Ok(opened),
            _ => Err(not_locked),
        }
    }

    /// Name the object file in I/O errors
    fn with_context<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| e.in_object_file(&self.object_type, &self.path))
    }

    fn already_open(&self) -> EventDbError {
        EventDbError::AlreadyOpen {
            object_type: self.object_type.clone(),
        }
    }

    fn not_open(&self) -> EventDbError {
        EventDbError::NotOpen {
            object_type: self.object_type.clone(),
        }
    }

    fn not_locked(&self) -> EventDbError {
        EventDbError::NotLocked {
            object_type: self.object_type.clone(),
        }
    }
}

impl Drop for ObjectFile {
    fn drop(&mut self) {
        if self.opened.is_some() {
            if let Err(e) = self.close() {
                tracing::warn!(object_type = %self.object_type, error = %e, "close on drop failed");
            }
        }
    }
}
