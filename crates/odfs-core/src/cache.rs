//! Cache entries and stat records.

use crate::remote::{FileAttributes, FileId};
use std::time::{SystemTime, UNIX_EPOCH};

/// Permission bits reported for directories (r-xr-xr-x).
pub const DIR_PERM: u16 = 0o555;

/// Permission bits reported for files (r--r--r--).
pub const FILE_PERM: u16 = 0o444;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// What is known about one path that exists.
///
/// Children and attributes start unset and are filled at most once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEntry {
    Directory {
        /// Child names in listing order, `None` until the directory is listed.
        children: Option<Vec<String>>,
    },
    File {
        file_id: FileId,
        attributes: Option<FileAttributes>,
    },
}

impl CacheEntry {
    pub fn unlisted_directory() -> Self {
        CacheEntry::Directory { children: None }
    }

    pub fn file(file_id: FileId) -> Self {
        CacheEntry::File {
            file_id,
            attributes: None,
        }
    }

    pub fn kind(&self) -> EntryKind {
        match self {
            CacheEntry::Directory { .. } => EntryKind::Directory,
            CacheEntry::File { .. } => EntryKind::File,
        }
    }
}

/// Cache slot for a path that has been observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Slot {
    /// Confirmed absent. Never queried again.
    Missing,
    Present(CacheEntry),
}

/// Existence of a path as far as the cache knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathState<'a> {
    /// Not observed yet; the parent has not been listed.
    Unknown,
    Missing,
    Present(&'a CacheEntry),
}

impl<'a> PathState<'a> {
    pub(crate) fn from_slot(slot: Option<&'a Slot>) -> Self {
        match slot {
            None => PathState::Unknown,
            Some(Slot::Missing) => PathState::Missing,
            Some(Slot::Present(entry)) => PathState::Present(entry),
        }
    }
}

/// Attributes reported for a path, independent of any frontend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRecord {
    pub kind: EntryKind,
    pub perm: u16,
    pub nlink: u32,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
}

impl StatRecord {
    /// Directories carry no remote metadata: epoch timestamps, root ownership.
    pub fn directory(child_count: usize) -> Self {
        let nlink = u32::try_from(child_count)
            .unwrap_or(u32::MAX)
            .saturating_add(2);
        Self {
            kind: EntryKind::Directory,
            perm: DIR_PERM,
            nlink,
            size: 0,
            uid: 0,
            gid: 0,
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
        }
    }

    pub fn file(attributes: &FileAttributes) -> Self {
        Self {
            kind: EntryKind::File,
            perm: FILE_PERM,
            nlink: 1,
            size: attributes.size,
            uid: 0,
            gid: 0,
            atime: attributes.last_accessed_time,
            mtime: attributes.last_modified_time,
            ctime: attributes.creation_time,
            crtime: attributes.creation_time,
        }
    }
}
