//! Thread-safe table of open file handles.
//!
//! Handles are allocated from a counter rather than derived from what they
//! point at, so two simultaneously open files can never share one. IDs start
//! at 1; 0 is never handed out.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use dashmap::mapref::one::{Ref, RefMut};
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrent map from auto-allocated `u64` handles to values.
///
/// ```
/// use odfs_core::HandleTable;
///
/// let table: HandleTable<&str> = HandleTable::new();
/// let a = table.insert_auto("a.txt");
/// let b = table.insert_auto("b.txt");
/// assert_ne!(a, b);
/// assert_eq!(table.remove(a), Some("a.txt"));
/// assert!(!table.contains(a));
/// ```
#[derive(Debug)]
pub struct HandleTable<V> {
    handles: DashMap<u64, V>,
    next_id: AtomicU64,
}

impl<V> HandleTable<V> {
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Inserts `value` under a fresh handle and returns the handle.
    ///
    /// After the counter wraps, IDs still held open are skipped.
    pub fn insert_auto(&self, value: V) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id) {
                entry.insert(value);
                return id;
            }
        }
    }

    pub fn get(&self, id: u64) -> Option<Ref<'_, u64, V>> {
        self.handles.get(&id)
    }

    pub fn get_mut(&self, id: u64) -> Option<RefMut<'_, u64, V>> {
        self.handles.get_mut(&id)
    }

    /// Removes a handle and returns its value.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}

impl<V> Default for HandleTable<V> {
    fn default() -> Self {
        Self::new()
    }
}
