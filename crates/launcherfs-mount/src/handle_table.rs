//! Thread-safe handle table for managing open file sessions.
//!
//! Backed by `DashMap` so concurrent FUSE workers can open, use, and release
//! different handles without a global lock.
//!
//! # Handle Lifecycle
//!
//! 1. **Insert**: Add a value under an auto-generated ID (returned to the kernel as `fh`)
//! 2. **Get/GetMut**: Access the value for read/write operations
//! 3. **Remove**: Remove and return the value on release

use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe handle table with auto-incrementing `u64` IDs.
///
/// IDs start at 1; 0 is reserved as the "no handle" value.
///
/// ```
/// use launcherfs_mount::HandleTable;
///
/// let table: HandleTable<String> = HandleTable::new();
///
/// let id1 = table.insert("file1".to_string());
/// let id2 = table.insert("file2".to_string());
///
/// assert_ne!(id1, id2);
/// assert_eq!(table.len(), 2);
///
/// let value = table.remove(id1);
/// assert_eq!(value, Some("file1".to_string()));
/// ```
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    next_id: AtomicU64,
}

impl<V> HandleTable<V> {
    /// Create an empty handle table.
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Insert a value under a freshly generated ID and return the ID.
    pub fn insert(&self, value: V) -> u64 {
        let mut value = Some(value);
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                // wrapped around
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id)
                && let Some(value) = value.take()
            {
                entry.insert(value);
                return id;
            }
        }
    }

    /// Get a reference to a value by ID.
    pub fn get(&self, id: u64) -> Option<Ref<'_, u64, V>> {
        self.handles.get(&id)
    }

    /// Get a mutable reference to a value by ID.
    pub fn get_mut(&self, id: u64) -> Option<RefMut<'_, u64, V>> {
        self.handles.get_mut(&id)
    }

    /// Remove a value by ID and return it.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    /// Check if an ID is in use.
    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    /// Number of live handles.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
