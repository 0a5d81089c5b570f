//! Shared test utilities: an in-memory remote store that records every call.

#![allow(dead_code)]

use bytes::Bytes;
use odfs_core::path;
use odfs_core::{
    BlobId, ContainerId, ContainerInfo, DirectoryListing, FileAttributes, FileEntry, FileId,
    OdfsError, OdfsResult, RemoteStore, StreamingKey,
};
use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, UNIX_EPOCH};

/// Offset added to a file id to form its blob id.
pub const BLOB_OFFSET: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListContainers,
    ListDirectory(ContainerId, String),
    GetFileAttributes(FileId),
    CreateStreamingKey(FileId),
    DownloadRange {
        blob: BlobId,
        offset: u64,
        length: u64,
    },
}

/// In-memory remote store.
///
/// Like the real server, only the most recently minted streaming key is
/// accepted.
#[derive(Default)]
pub struct MockRemote {
    containers: Vec<ContainerInfo>,
    listings: HashMap<(ContainerId, String), DirectoryListing>,
    attributes: HashMap<FileId, FileAttributes>,
    blobs: HashMap<BlobId, Vec<u8>>,
    calls: Mutex<Vec<Call>>,
    next_key: AtomicU64,
    current_key: Mutex<Option<String>>,
    unavailable: AtomicBool,
}

impl MockRemote {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_container(mut self, id: u64, name: &str) -> Self {
        self.containers.push(ContainerInfo {
            id: ContainerId(id),
            name: name.to_string(),
        });
        self
    }

    /// Adds a subdirectory `name` to the listing of `parent`.
    pub fn with_dir(mut self, container: u64, dir_path: &str) -> Self {
        let parent = path::parent(dir_path).unwrap_or("/").to_string();
        let name = path::file_name(dir_path).to_string();
        self.listings
            .entry((ContainerId(container), parent))
            .or_default()
            .dirs
            .push(name);
        self.listings
            .entry((ContainerId(container), dir_path.to_string()))
            .or_default();
        self
    }

    /// Adds a file to the listing of its parent directory.
    pub fn with_file(mut self, container: u64, file_path: &str, id: u64, content: &[u8]) -> Self {
        let parent = path::parent(file_path).unwrap_or("/").to_string();
        self.listings
            .entry((ContainerId(container), parent))
            .or_default()
            .files
            .push(FileEntry {
                file_path: file_path.to_string(),
                id: FileId(id),
            });
        let blob_id = BlobId(id + BLOB_OFFSET);
        self.attributes.insert(
            FileId(id),
            FileAttributes {
                blob_id,
                size: content.len() as u64,
                creation_time: UNIX_EPOCH + Duration::from_secs(1_000),
                last_modified_time: UNIX_EPOCH + Duration::from_secs(2_000),
                last_accessed_time: UNIX_EPOCH + Duration::from_secs(3_000),
            },
        );
        self.blobs.insert(blob_id, content.to_vec());
        self
    }

    /// Replaces a listing verbatim.
    pub fn with_listing(mut self, container: u64, dir_path: &str, listing: DirectoryListing) -> Self {
        self.listings
            .insert((ContainerId(container), dir_path.to_string()), listing);
        self
    }

    /// Makes every call fail with `RemoteUnavailable` until cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, predicate: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| predicate(c)).count()
    }

    pub fn listings_of(&self, dir_path: &str) -> usize {
        self.count(|c| matches!(c, Call::ListDirectory(_, p) if p == dir_path))
    }

    pub fn total_listings(&self) -> usize {
        self.count(|c| matches!(c, Call::ListDirectory(..)))
    }

    pub fn container_listings(&self) -> usize {
        self.count(|c| matches!(c, Call::ListContainers))
    }

    pub fn attribute_fetches(&self) -> usize {
        self.count(|c| matches!(c, Call::GetFileAttributes(_)))
    }

    pub fn keys_minted(&self) -> usize {
        self.count(|c| matches!(c, Call::CreateStreamingKey(_)))
    }

    pub fn downloads(&self) -> Vec<(u64, u64)> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::DownloadRange { offset, length, .. } => Some((offset, length)),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) -> OdfsResult<()> {
        self.calls.lock().unwrap().push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(OdfsError::RemoteUnavailable("mock offline".into()));
        }
        Ok(())
    }
}

impl RemoteStore for MockRemote {
    fn list_containers(&self) -> OdfsResult<Vec<ContainerInfo>> {
        self.record(Call::ListContainers)?;
        Ok(self.containers.clone())
    }

    fn list_directory(&self, container: ContainerId, path: &str) -> OdfsResult<DirectoryListing> {
        self.record(Call::ListDirectory(container, path.to_string()))?;
        Ok(self
            .listings
            .get(&(container, path.to_string()))
            .cloned()
            .unwrap_or_default())
    }

    fn get_file_attributes(&self, file: FileId) -> OdfsResult<FileAttributes> {
        self.record(Call::GetFileAttributes(file))?;
        self.attributes
            .get(&file)
            .cloned()
            .ok_or_else(|| OdfsError::NotFound(format!("file {file}")))
    }

    fn create_streaming_key(&self, file: FileId) -> OdfsResult<StreamingKey> {
        self.record(Call::CreateStreamingKey(file))?;
        let key = format!("key-{}", self.next_key.fetch_add(1, Ordering::SeqCst));
        *self.current_key.lock().unwrap() = Some(key.clone());
        Ok(StreamingKey::new(key))
    }

    fn download_range(
        &self,
        blob: BlobId,
        key: &StreamingKey,
        offset: u64,
        length: u64,
    ) -> OdfsResult<Bytes> {
        self.record(Call::DownloadRange {
            blob,
            offset,
            length,
        })?;
        if self.current_key.lock().unwrap().as_deref() != Some(key.as_str()) {
            return Err(OdfsError::RemoteAuth("403 Forbidden".into()));
        }
        let data = self
            .blobs
            .get(&blob)
            .ok_or_else(|| OdfsError::NotFound(format!("blob {blob}")))?;
        let start = (offset as usize).min(data.len());
        let end = (offset.saturating_add(length) as usize).min(data.len());
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }
}

/// 120 bytes of recognizable content.
pub fn readme_content() -> Vec<u8> {
    (0..120u8).collect()
}

/// Container `Data` (id 1) holding `/docs/readme.txt` (120 bytes) and
/// `/notes.txt`; container `Other` (id 2) is empty.
pub fn fixture() -> MockRemote {
    MockRemote::new()
        .with_container(1, "Data")
        .with_container(2, "Other")
        .with_dir(1, "/docs")
        .with_file(1, "/docs/readme.txt", 11, &readme_content())
        .with_file(1, "/notes.txt", 10, b"remember the milk")
}
