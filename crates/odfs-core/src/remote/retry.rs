//! Bounded retry for idempotent remote reads.

use super::{
    BlobId, ContainerId, ContainerInfo, DirectoryListing, FileAttributes, FileId, RemoteStore,
    StreamingKey,
};
use crate::error::OdfsResult;
use bytes::Bytes;
use std::time::Duration;
use tracing::warn;

/// Wraps a [`RemoteStore`] and retries transient failures of idempotent reads.
///
/// Only [`OdfsError::RemoteUnavailable`](crate::OdfsError::RemoteUnavailable)
/// is retried. Minting a streaming key invalidates the previous one on the
/// server, so `create_streaming_key` goes through exactly once.
pub struct RetryingStore<S> {
    inner: S,
    max_retries: u32,
    backoff: Duration,
}

impl<S: RemoteStore> RetryingStore<S> {
    /// `backoff` is multiplied by the attempt number before each retry.
    pub fn new(inner: S, max_retries: u32, backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            backoff,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn retry<T>(&self, operation: &str, mut call: impl FnMut(&S) -> OdfsResult<T>) -> OdfsResult<T> {
        let mut attempt = 0;
        loop {
            match call(&self.inner) {
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!(
                        operation = operation,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        error = %e,
                        "Remote call failed, retrying"
                    );
                    std::thread::sleep(self.backoff * attempt);
                }
                other => return other,
            }
        }
    }
}

impl<S: RemoteStore> RemoteStore for RetryingStore<S> {
    fn list_containers(&self) -> OdfsResult<Vec<ContainerInfo>> {
        self.retry("list_containers", |s| s.list_containers())
    }

    fn list_directory(&self, container: ContainerId, path: &str) -> OdfsResult<DirectoryListing> {
        self.retry("list_directory", |s| s.list_directory(container, path))
    }

    fn get_file_attributes(&self, file: FileId) -> OdfsResult<FileAttributes> {
        self.retry("get_file_attributes", |s| s.get_file_attributes(file))
    }

    fn create_streaming_key(&self, file: FileId) -> OdfsResult<StreamingKey> {
        self.inner.create_streaming_key(file)
    }

    fn download_range(
        &self,
        blob: BlobId,
        key: &StreamingKey,
        offset: u64,
        length: u64,
    ) -> OdfsResult<Bytes> {
        self.retry("download_range", |s| s.download_range(blob, key, offset, length))
    }
}
