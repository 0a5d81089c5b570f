//! Read-only filesystem core for OpenDistributedFileStorage (ODFS).
//!
//! ODFS stores files in named containers behind an HTTP API. This crate
//! turns that API into path-based filesystem operations:
//!
//! - [`remote`]: the [`RemoteStore`] trait, its HTTP implementation and a
//!   retrying decorator
//! - [`path_cache`]: a lazily populated, never evicted view of one container
//!   plus its open file handles
//! - [`namespace`]: container names at the mount root
//! - [`ops`]: [`OdfsOperations`], the `access`/`getattr`/`readdir`/`open`/
//!   `read`/`release`/`statfs` contract a frontend calls into
//!
//! ```no_run
//! use odfs_core::{HttpRemoteStore, OdfsConfig, OdfsOperations, RetryingStore};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), odfs_core::OdfsError> {
//! let config = OdfsConfig::load(Path::new("odfs.yaml"))?;
//! let http = HttpRemoteStore::connect(&config)?;
//! let remote = RetryingStore::new(http, config.max_retries, config.retry_backoff);
//! let fs = OdfsOperations::new(Arc::new(remote));
//!
//! for name in fs.readdir("/")? {
//!     println!("{name}");
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod bridge;
pub mod cache;
pub mod config;
pub mod error;
pub mod handle_table;
pub mod namespace;
pub mod ops;
pub mod path;
pub mod path_cache;
pub mod remote;

pub use cache::{CacheEntry, EntryKind, PathState, StatRecord};
pub use config::OdfsConfig;
pub use error::{OdfsError, OdfsResult};
pub use handle_table::HandleTable;
pub use namespace::RootNamespace;
pub use ops::{DirEntry, FsStats, OdfsOperations};
pub use path_cache::{OpenFile, PathCache};
pub use remote::{
    BlobId, ContainerId, ContainerInfo, DirectoryListing, FileAttributes, FileEntry, FileId,
    HttpRemoteStore, RemoteStore, RetryingStore, StreamingKey,
};
