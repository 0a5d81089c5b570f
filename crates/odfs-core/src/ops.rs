//! Path-based filesystem operations over all containers.
//!
//! [`OdfsOperations`] is the context object a frontend holds. Every absolute
//! path is split into a container name (the first segment) and a
//! container-relative path handed to that container's [`PathCache`]. The
//! mount root itself is a virtual directory listing the containers.

use crate::cache::{EntryKind, StatRecord};
use crate::error::{OdfsError, OdfsResult};
use crate::namespace::RootNamespace;
use crate::path::{self, ROOT};
use crate::path_cache::PathCache;
use crate::remote::RemoteStore;
use bytes::Bytes;
use std::sync::Arc;
use tracing::trace;

/// Block size reported by `statfs`.
pub const STATFS_BLOCK_SIZE: u32 = 512;

/// Synthetic capacity reported by `statfs`. There is no real block accounting.
const STATFS_BLOCKS: u64 = 4096;
const STATFS_BLOCKS_FREE: u64 = 2048;
const STATFS_NAME_MAX: u32 = 255;

/// Filesystem statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FsStats {
    pub block_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_max: u32,
}

/// A directory listing entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
}

impl DirEntry {
    fn dir(name: &str) -> Self {
        Self {
            name: name.to_string(),
            kind: EntryKind::Directory,
        }
    }
}

/// Read-only filesystem over every container of one ODFS deployment.
pub struct OdfsOperations {
    namespace: RootNamespace,
}

impl OdfsOperations {
    pub fn new(remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            namespace: RootNamespace::new(remote),
        }
    }

    pub fn namespace(&self) -> &RootNamespace {
        &self.namespace
    }

    /// Container cache and container-relative path for a non-root path.
    fn resolve(&self, path: &str) -> OdfsResult<(Arc<PathCache>, String)> {
        let (container, relative) =
            path::split_container(path).ok_or_else(|| OdfsError::NotFound(path.to_string()))?;
        let cache = self.namespace.resolve(container)?;
        Ok((cache, relative))
    }

    /// Rejects write intent. Existence is not checked.
    pub fn access(&self, path: &str, mask: i32) -> OdfsResult<()> {
        trace!(path = path, mask = mask, "access");
        if mask & libc::W_OK != 0 {
            return Err(OdfsError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    pub fn getattr(&self, path: &str) -> OdfsResult<StatRecord> {
        trace!(path = path, "getattr");
        if is_root(path) {
            return Ok(StatRecord::directory(0));
        }
        let (cache, relative) = self.resolve(path)?;
        cache.get_attributes(&relative)
    }

    /// Names in `path`, starting with `"."` and `".."`.
    pub fn readdir(&self, path: &str) -> OdfsResult<Vec<String>> {
        Ok(self
            .readdir_entries(path)?
            .into_iter()
            .map(|entry| entry.name)
            .collect())
    }

    /// Entries in `path` with their kinds, starting with `"."` and `".."`.
    pub fn readdir_entries(&self, path: &str) -> OdfsResult<Vec<DirEntry>> {
        trace!(path = path, "readdir");
        let mut entries = vec![DirEntry::dir("."), DirEntry::dir("..")];

        if is_root(path) {
            let names = self.namespace.container_names()?;
            entries.extend(names.iter().map(|name| DirEntry::dir(name)));
            return Ok(entries);
        }

        let (cache, relative) = self.resolve(path)?;
        entries.extend(
            cache
                .list_directory_entries(&relative)?
                .into_iter()
                .map(|(name, kind)| DirEntry { name, kind }),
        );
        Ok(entries)
    }

    /// Opens a file for reading. Any write, create or truncate flag is refused.
    pub fn open(&self, path: &str, flags: i32) -> OdfsResult<u64> {
        trace!(path = path, flags = flags, "open");
        let write_flags = libc::O_TRUNC | libc::O_CREAT | libc::O_APPEND;
        if flags & libc::O_ACCMODE != libc::O_RDONLY || flags & write_flags != 0 {
            return Err(OdfsError::PermissionDenied(path.to_string()));
        }
        let (cache, relative) = self.resolve(path)?;
        cache.open_file(&relative)
    }

    pub fn read(&self, path: &str, length: u64, offset: u64, handle: u64) -> OdfsResult<Bytes> {
        trace!(path = path, length = length, offset = offset, handle = handle, "read");
        let (cache, _) = self.resolve(path)?;
        cache.download_slice(handle, offset, length)
    }

    pub fn release(&self, path: &str, handle: u64) -> OdfsResult<()> {
        trace!(path = path, handle = handle, "release");
        let (cache, _) = self.resolve(path)?;
        cache.close_file(handle)
    }

    pub fn statfs(&self, _path: &str) -> FsStats {
        FsStats {
            block_size: STATFS_BLOCK_SIZE,
            blocks: STATFS_BLOCKS,
            blocks_free: STATFS_BLOCKS_FREE,
            blocks_available: STATFS_BLOCKS_FREE,
            files: 0,
            files_free: 0,
            name_max: STATFS_NAME_MAX,
        }
    }
}

fn is_root(path: &str) -> bool {
    path::normalize(path) == ROOT
}
