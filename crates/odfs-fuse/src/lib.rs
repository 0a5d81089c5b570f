//! Read-only FUSE mount for OpenDistributedFileStorage.
//!
//! Exposes every container of an ODFS deployment as a top-level directory
//! of a read-only filesystem. Metadata and content come from
//! [`odfs_core::OdfsOperations`]; this crate adds the inode bookkeeping and
//! the fuser session around it.
//!
//! # Usage
//!
//! ```ignore
//! use odfs_fuse::{MountConfig, OdfsFs, mount_until_signal};
//!
//! let fs = OdfsFs::new(ops, MountConfig::default());
//! mount_until_signal(fs, Path::new("/mnt/odfs"))?;
//! ```

pub mod config;
pub mod filesystem;
pub mod inode;
pub mod mount;

pub use config::MountConfig;
pub use filesystem::OdfsFs;
pub use inode::{InodeTable, ROOT_INODE};
pub use mount::{MountError, mount, mount_until_signal};
