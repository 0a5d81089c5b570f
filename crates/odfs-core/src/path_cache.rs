//! Per-container path cache and open file table.
//!
//! A [`PathCache`] learns about a container lazily. A path becomes known
//! when its parent directory is listed; a path the listing does not mention
//! is recorded as missing and never asked about again. Directory children
//! and file attributes are fetched at most once and kept for the life of
//! the process.
//!
//! # Locking
//!
//! All entry mutation happens under one mutex per container, held across
//! the remote listing or attribute fetch that fills an entry. Readers never
//! see a half-populated directory, and different containers do not block
//! each other. Range downloads run without the entry lock.

use crate::cache::{CacheEntry, EntryKind, PathState, Slot, StatRecord};
use crate::error::{OdfsError, OdfsResult};
use crate::handle_table::HandleTable;
use crate::path::{self, ROOT};
use crate::remote::{BlobId, ContainerId, FileAttributes, FileId, RemoteStore, StreamingKey};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, trace, warn};

type Entries = HashMap<String, Slot>;

/// State kept for one open handle.
#[derive(Debug, Clone)]
pub struct OpenFile {
    pub streaming_key: StreamingKey,
    pub blob_id: BlobId,
    /// Needed to mint a replacement key when the server rejects this one.
    pub file_id: FileId,
}

/// Lazily populated view of one container.
pub struct PathCache {
    container_id: ContainerId,
    remote: Arc<dyn RemoteStore>,
    entries: Mutex<Entries>,
    open_files: HandleTable<OpenFile>,
}

impl PathCache {
    pub fn new(container_id: ContainerId, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            container_id,
            remote,
            entries: Mutex::new(HashMap::new()),
            open_files: HandleTable::new(),
        }
    }

    pub fn container_id(&self) -> ContainerId {
        self.container_id
    }

    /// Runs `f` with the cached state of `path`, without touching the remote.
    pub fn with_state<R>(&self, path: &str, f: impl FnOnce(PathState<'_>) -> R) -> R {
        let path = path::normalize(path);
        let entries = self.entries.lock();
        f(PathState::from_slot(entries.get(&path)))
    }

    /// Number of currently open handles.
    pub fn open_count(&self) -> usize {
        self.open_files.len()
    }

    /// Lists `path` remotely unless its children are already known.
    ///
    /// Records every listed child and the name list on `path` itself,
    /// creating `path` as a directory if it was not known.
    pub fn populate(&self, path: &str) -> OdfsResult<()> {
        let path = path::normalize(path);
        let mut entries = self.entries.lock();
        self.populate_locked(&mut entries, &path)
    }

    /// Stat record for `path`, fetching the parent listing and file
    /// attributes as needed.
    pub fn get_attributes(&self, path: &str) -> OdfsResult<StatRecord> {
        let path = path::normalize(path);
        trace!(container = %self.container_id, path = %path, "get_attributes");

        let mut entries = self.entries.lock();
        self.resolve_locked(&mut entries, &path)?;

        match PathState::from_slot(entries.get(&path)) {
            PathState::Present(CacheEntry::Directory { .. }) => {
                self.populate_locked(&mut entries, &path)?;
                let count = child_names(&entries, &path).map_or(0, <[String]>::len);
                Ok(StatRecord::directory(count))
            }
            PathState::Present(CacheEntry::File { .. }) => {
                let (_, attributes) = self.file_attributes_locked(&mut entries, &path)?;
                Ok(StatRecord::file(&attributes))
            }
            PathState::Missing | PathState::Unknown => Err(OdfsError::NotFound(path)),
        }
    }

    /// Immediate child names of `path`: directories first, then files,
    /// each in listing order.
    pub fn list_directory_contents(&self, path: &str) -> OdfsResult<Vec<String>> {
        let path = path::normalize(path);
        let mut entries = self.entries.lock();
        self.children_locked(&mut entries, &path)
    }

    /// Like [`list_directory_contents`](Self::list_directory_contents), with
    /// the kind of every child.
    pub fn list_directory_entries(&self, path: &str) -> OdfsResult<Vec<(String, EntryKind)>> {
        let path = path::normalize(path);
        let mut entries = self.entries.lock();
        let names = self.children_locked(&mut entries, &path)?;
        Ok(names
            .into_iter()
            .filter_map(|name| {
                let child = path::join(&path, &name);
                match entries.get(&child) {
                    Some(Slot::Present(entry)) => Some((name, entry.kind())),
                    _ => None,
                }
            })
            .collect())
    }

    /// Opens the file at `path` for reading and returns a fresh handle.
    pub fn open_file(&self, path: &str) -> OdfsResult<u64> {
        let path = path::normalize(path);

        let (file_id, attributes) = {
            let mut entries = self.entries.lock();
            self.resolve_locked(&mut entries, &path)?;
            if !matches!(entries.get(&path), Some(Slot::Present(CacheEntry::File { .. }))) {
                return Err(OdfsError::NotFound(path));
            }
            self.file_attributes_locked(&mut entries, &path)?
        };

        let streaming_key = self.remote.create_streaming_key(file_id)?;
        let handle = self.open_files.insert_auto(OpenFile {
            streaming_key,
            blob_id: attributes.blob_id,
            file_id,
        });
        debug!(container = %self.container_id, path = %path, handle = handle, "Opened file");
        Ok(handle)
    }

    /// Reads `length` bytes at `offset` from an open handle.
    ///
    /// The server drops a user's earlier streaming keys whenever a new one is
    /// minted, so a key rejected mid-session is replaced once and the read
    /// retried.
    pub fn download_slice(&self, handle: u64, offset: u64, length: u64) -> OdfsResult<Bytes> {
        let open = self
            .open_files
            .get(handle)
            .map(|open| open.clone())
            .ok_or(OdfsError::InvalidHandle(handle))?;

        match self
            .remote
            .download_range(open.blob_id, &open.streaming_key, offset, length)
        {
            Err(OdfsError::RemoteAuth(reason)) => {
                warn!(handle = handle, reason = %reason, "Streaming key rejected, minting a new one");
                let fresh = self.remote.create_streaming_key(open.file_id)?;
                match self.open_files.get_mut(handle) {
                    Some(mut entry) => entry.streaming_key = fresh.clone(),
                    None => return Err(OdfsError::InvalidHandle(handle)),
                }
                self.remote.download_range(open.blob_id, &fresh, offset, length)
            }
            other => other,
        }
    }

    /// Forgets an open handle.
    pub fn close_file(&self, handle: u64) -> OdfsResult<()> {
        if self.open_files.remove(handle).is_none() {
            return Err(OdfsError::InvalidHandle(handle));
        }
        debug!(container = %self.container_id, handle = handle, "Closed file");
        Ok(())
    }

    /// Makes sure `path` is known as present or missing, listing its parent
    /// if needed.
    fn resolve_locked(&self, entries: &mut Entries, path: &str) -> OdfsResult<()> {
        if entries.contains_key(path) {
            return Ok(());
        }
        if path == ROOT {
            entries.insert(ROOT.to_string(), Slot::Present(CacheEntry::unlisted_directory()));
            return Ok(());
        }
        if under_missing_or_file(entries, path) {
            entries.insert(path.to_string(), Slot::Missing);
            return Ok(());
        }

        let parent = path::parent(path).unwrap_or(ROOT);
        match PathState::from_slot(entries.get(parent)) {
            // Children of missing paths and of files cannot exist.
            PathState::Missing
            | PathState::Present(CacheEntry::File { .. } | CacheEntry::Directory { children: Some(_) }) => {}
            PathState::Unknown | PathState::Present(CacheEntry::Directory { children: None }) => {
                self.populate_locked(entries, parent)?;
            }
        }

        entries.entry(path.to_string()).or_insert(Slot::Missing);
        Ok(())
    }

    fn populate_locked(&self, entries: &mut Entries, path: &str) -> OdfsResult<()> {
        if child_names(entries, path).is_some() {
            return Ok(());
        }

        debug!(container = %self.container_id, path = path, "Listing directory");
        let listing = self.remote.list_directory(self.container_id, path)?;

        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(listing.dirs.len() + listing.files.len());

        for dir in listing.dirs {
            if dir.is_empty() || !seen.insert(dir.clone()) {
                continue;
            }
            let child = path::join(path, &dir);
            if !matches!(entries.get(&child), Some(Slot::Present(_))) {
                entries.insert(child, Slot::Present(CacheEntry::unlisted_directory()));
            }
            names.push(dir);
        }

        for file in listing.files {
            let name = file.name().to_string();
            if name.is_empty() || !seen.insert(name.clone()) {
                continue;
            }
            let child = path::join(path, &name);
            let known = matches!(
                entries.get(&child),
                Some(Slot::Present(CacheEntry::File { file_id, .. })) if *file_id == file.id
            );
            if !known {
                entries.insert(child, Slot::Present(CacheEntry::file(file.id)));
            }
            names.push(name);
        }

        trace!(container = %self.container_id, path = path, children = names.len(), "Directory populated");
        entries.insert(
            path.to_string(),
            Slot::Present(CacheEntry::Directory {
                children: Some(names),
            }),
        );
        Ok(())
    }

    fn children_locked(&self, entries: &mut Entries, path: &str) -> OdfsResult<Vec<String>> {
        if !entries.contains_key(path) && under_missing_or_file(entries, path) {
            entries.insert(path.to_string(), Slot::Missing);
            return Err(OdfsError::NotFound(path.to_string()));
        }
        match PathState::from_slot(entries.get(path)) {
            PathState::Missing => return Err(OdfsError::NotFound(path.to_string())),
            PathState::Present(CacheEntry::File { .. }) => {
                return Err(OdfsError::NotADirectory(path.to_string()));
            }
            PathState::Unknown | PathState::Present(CacheEntry::Directory { .. }) => {}
        }
        self.populate_locked(entries, path)?;
        Ok(child_names(entries, path).map(<[String]>::to_vec).unwrap_or_default())
    }

    /// Attributes of the file at `path`, fetched once and memoized.
    fn file_attributes_locked(
        &self,
        entries: &mut Entries,
        path: &str,
    ) -> OdfsResult<(FileId, FileAttributes)> {
        let Some(Slot::Present(CacheEntry::File {
            file_id,
            attributes,
        })) = entries.get_mut(path)
        else {
            return Err(OdfsError::NotFound(path.to_string()));
        };

        if let Some(cached) = attributes {
            return Ok((*file_id, cached.clone()));
        }
        let fetched = self.remote.get_file_attributes(*file_id)?;
        *attributes = Some(fetched.clone());
        Ok((*file_id, fetched))
    }
}

/// True if some cached ancestor of `path` is missing or a file, so
/// `path` cannot exist.
fn under_missing_or_file(entries: &Entries, path: &str) -> bool {
    let mut current = path;
    while let Some(ancestor) = path::parent(current) {
        if matches!(
            entries.get(ancestor),
            Some(Slot::Missing | Slot::Present(CacheEntry::File { .. }))
        ) {
            return true;
        }
        current = ancestor;
    }
    false
}

fn child_names<'a>(entries: &'a Entries, path: &str) -> Option<&'a [String]> {
    match entries.get(path) {
        Some(Slot::Present(CacheEntry::Directory {
            children: Some(names),
        })) => Some(names),
        _ => None,
    }
}
