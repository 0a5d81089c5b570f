//! Inode management for the FUSE filesystem.
//!
//! Maps FUSE inode numbers to absolute mount paths and back. Remote content
//! is fixed for the life of a mount, so inodes are never evicted and a path
//! keeps its inode until unmount.

use dashmap::DashMap;
use odfs_core::path;
use std::sync::atomic::{AtomicU64, Ordering};

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// Thread-safe bidirectional table between inodes and mount paths.
pub struct InodeTable {
    path_to_inode: DashMap<String, u64>,
    inode_to_path: DashMap<u64, String>,
    next_inode: AtomicU64,
}

impl InodeTable {
    /// Creates a table with the root directory pre-allocated.
    pub fn new() -> Self {
        let table = Self {
            path_to_inode: DashMap::new(),
            inode_to_path: DashMap::new(),
            next_inode: AtomicU64::new(ROOT_INODE + 1),
        };
        table.path_to_inode.insert(path::ROOT.to_string(), ROOT_INODE);
        table.inode_to_path.insert(ROOT_INODE, path::ROOT.to_string());
        table
    }

    /// Returns the inode for `path`, allocating one if the path is new.
    pub fn get_or_insert(&self, mount_path: &str) -> u64 {
        let mount_path = path::normalize(mount_path);
        if let Some(inode) = self.path_to_inode.get(&mount_path) {
            return *inode;
        }

        // Entry API so two racing lookups agree on one inode
        *self
            .path_to_inode
            .entry(mount_path.clone())
            .or_insert_with(|| {
                let inode = self.next_inode.fetch_add(1, Ordering::Relaxed);
                self.inode_to_path.insert(inode, mount_path);
                inode
            })
    }

    /// Absolute mount path of `inode`.
    pub fn path(&self, inode: u64) -> Option<String> {
        self.inode_to_path.get(&inode).map(|p| p.clone())
    }

    /// Inode of `path` without allocating.
    pub fn get_inode(&self, mount_path: &str) -> Option<u64> {
        self.path_to_inode
            .get(&path::normalize(mount_path))
            .map(|inode| *inode)
    }

    /// Path of the child `name` under directory inode `parent`.
    pub fn child_path(&self, parent: u64, name: &str) -> Option<String> {
        self.path(parent).map(|dir| path::join(&dir, name))
    }

    /// Inode of the parent directory of `inode`; the root is its own parent.
    pub fn parent_inode(&self, inode: u64) -> u64 {
        self.path(inode)
            .as_deref()
            .and_then(path::parent)
            .and_then(|parent| self.get_inode(parent))
            .unwrap_or(ROOT_INODE)
    }

    pub fn len(&self) -> usize {
        self.inode_to_path.len()
    }

    /// True if only the root inode is allocated.
    pub fn is_empty(&self) -> bool {
        self.inode_to_path.len() <= 1
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
