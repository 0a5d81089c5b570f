//! Remote store client.
//!
//! [`RemoteStore`] is the seam between the path cache and the ODFS HTTP API.
//! Wire records are decoded into fixed-field types here, and both timestamp
//! encodings the API uses are normalized to [`SystemTime`] before anything
//! reaches the cache.

mod auth;
mod http;
mod retry;

pub use auth::{AccessToken, request_access_token};
pub use http::HttpRemoteStore;
pub use retry::RetryingStore;

use crate::error::{OdfsError, OdfsResult};
use bytes::Bytes;
use chrono::{DateTime, NaiveDateTime};
use serde::Deserialize;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

macro_rules! remote_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

remote_id!(
    /// Remote identifier of a container.
    ContainerId
);
remote_id!(
    /// Remote identifier of a file record.
    FileId
);
remote_id!(
    /// Remote identifier of the blob holding a file's bytes.
    BlobId
);

/// A container as listed by `GET /containers`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ContainerInfo {
    pub id: ContainerId,
    pub name: String,
}

/// One file in a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// Absolute path of the file within its container.
    pub file_path: String,
    pub id: FileId,
}

impl FileEntry {
    /// Final component of `file_path`.
    pub fn name(&self) -> &str {
        crate::path::file_name(&self.file_path)
    }
}

/// Immediate children of one directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DirectoryListing {
    #[serde(default)]
    pub dirs: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileEntry>,
}

/// Capability authorizing ranged reads of one file's blob.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct StreamingKey(String);

impl StreamingKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for StreamingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("StreamingKey([REDACTED])")
    }
}

/// Metadata of one file, with timestamps normalized.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "FileMetaResponse")]
pub struct FileAttributes {
    pub blob_id: BlobId,
    pub size: u64,
    pub creation_time: SystemTime,
    pub last_modified_time: SystemTime,
    pub last_accessed_time: SystemTime,
}

/// Body of `GET /files/{id}/meta-file-manager`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileMetaResponse {
    blob_id: BlobId,
    size: u64,
    creation_time: String,
    last_modified_time: String,
    #[serde(default)]
    last_accessed_time: i64,
}

impl TryFrom<FileMetaResponse> for FileAttributes {
    type Error = OdfsError;

    fn try_from(meta: FileMetaResponse) -> Result<Self, Self::Error> {
        Ok(Self {
            blob_id: meta.blob_id,
            size: meta.size,
            creation_time: parse_iso_timestamp(&meta.creation_time)?,
            last_modified_time: parse_iso_timestamp(&meta.last_modified_time)?,
            last_accessed_time: epoch_millis_to_system_time(meta.last_accessed_time),
        })
    }
}

/// Parses an ISO-8601 timestamp. Values without an offset are taken as UTC.
pub fn parse_iso_timestamp(value: &str) -> OdfsResult<SystemTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(SystemTime::from(dt));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| SystemTime::from(naive.and_utc()))
        .map_err(|e| OdfsError::InvalidResponse(format!("bad timestamp {value:?}: {e}")))
}

/// Converts epoch milliseconds (possibly negative) to a `SystemTime`.
pub fn epoch_millis_to_system_time(millis: i64) -> SystemTime {
    let magnitude = Duration::from_millis(millis.unsigned_abs());
    if millis >= 0 {
        UNIX_EPOCH + magnitude
    } else {
        UNIX_EPOCH - magnitude
    }
}

/// Operations the path cache needs from the remote store.
///
/// Implementations block the calling thread until the remote answers.
pub trait RemoteStore: Send + Sync {
    fn list_containers(&self) -> OdfsResult<Vec<ContainerInfo>>;

    /// Lists a container-relative directory.
    fn list_directory(&self, container: ContainerId, path: &str) -> OdfsResult<DirectoryListing>;

    fn get_file_attributes(&self, file: FileId) -> OdfsResult<FileAttributes>;

    /// Mints a streaming key for `file`.
    fn create_streaming_key(&self, file: FileId) -> OdfsResult<StreamingKey>;

    /// Fetches `length` bytes of `blob` starting at `offset`.
    ///
    /// Returns fewer bytes only at end of blob.
    fn download_range(
        &self,
        blob: BlobId,
        key: &StreamingKey,
        offset: u64,
        length: u64,
    ) -> OdfsResult<Bytes>;
}

/// Inclusive `Range` header value for a read, `None` when there is nothing to read.
pub fn range_header(offset: u64, length: u64) -> Option<String> {
    if length == 0 {
        return None;
    }
    let end = offset.saturating_add(length - 1);
    Some(format!("bytes={offset}-{end}"))
}
