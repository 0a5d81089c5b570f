//! FUSE filesystem implementation over [`OdfsOperations`].
//!
//! fuser addresses everything by inode while the operations layer is
//! path-based. The [`InodeTable`] bridges the two; every callback resolves
//! its inode to a mount path, calls the matching operation and maps errors
//! through [`OdfsError::to_errno`].
//!
//! The mount is read-only. Mutating callbacks are left to fuser's defaults,
//! which reply `ENOSYS`, and the mount itself carries the `ro` option.

use crate::config::MountConfig;
use crate::inode::{InodeTable, ROOT_INODE};
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory,
    ReplyEmpty, ReplyEntry, ReplyOpen, ReplyStatfs, Request,
};
use libc::c_int;
use odfs_core::ops::STATFS_BLOCK_SIZE;
use odfs_core::{EntryKind, OdfsError, OdfsOperations, StatRecord};
use std::ffi::OsStr;
use tracing::{debug, info, trace, warn};

/// FUSE filesystem for an ODFS deployment.
pub struct OdfsFs {
    ops: OdfsOperations,
    inodes: InodeTable,
    config: MountConfig,
}

impl OdfsFs {
    pub fn new(ops: OdfsOperations, config: MountConfig) -> Self {
        Self {
            ops,
            inodes: InodeTable::new(),
            config,
        }
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    fn path_of(&self, ino: u64) -> Result<String, c_int> {
        self.inodes.path(ino).ok_or(libc::ENOENT)
    }

    /// Attributes of `ino`.
    fn attr(&self, ino: u64) -> Result<FileAttr, c_int> {
        let path = self.path_of(ino)?;
        let stat = self.ops.getattr(&path).map_err(|e| errno("getattr", &path, &e))?;
        Ok(file_attr(ino, &stat))
    }

    /// Resolves `name` under `parent`, allocating an inode on success.
    fn lookup_child(&self, parent: u64, name: &str) -> Result<FileAttr, c_int> {
        let path = self.inodes.child_path(parent, name).ok_or(libc::ENOENT)?;
        let stat = self.ops.getattr(&path).map_err(|e| errno("lookup", &path, &e))?;
        let ino = self.inodes.get_or_insert(&path);
        Ok(file_attr(ino, &stat))
    }

    /// Entries of directory `ino` with their inodes, `.` and `..` first.
    fn dir_entries(&self, ino: u64) -> Result<Vec<(u64, FileType, String)>, c_int> {
        let path = self.path_of(ino)?;
        let entries = self
            .ops
            .readdir_entries(&path)
            .map_err(|e| errno("readdir", &path, &e))?;

        Ok(entries
            .into_iter()
            .map(|entry| {
                let entry_ino = match entry.name.as_str() {
                    "." => ino,
                    ".." => self.inodes.parent_inode(ino),
                    name => self.inodes.get_or_insert(&odfs_core::path::join(&path, name)),
                };
                (entry_ino, file_type(entry.kind), entry.name)
            })
            .collect())
    }
}

/// Maps an operation error to an errno, logging remote failures.
fn errno(op: &str, path: &str, err: &OdfsError) -> c_int {
    match err {
        OdfsError::NotFound(_)
        | OdfsError::NotADirectory(_)
        | OdfsError::PermissionDenied(_)
        | OdfsError::InvalidHandle(_) => {
            debug!(op = op, path = path, error = %err, "Operation refused");
        }
        _ => warn!(op = op, path = path, error = %err, "Operation failed"),
    }
    err.to_errno()
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
    }
}

/// Converts a stat record into fuser attributes.
pub fn file_attr(ino: u64, stat: &StatRecord) -> FileAttr {
    FileAttr {
        ino,
        size: stat.size,
        blocks: stat.size.div_ceil(u64::from(STATFS_BLOCK_SIZE)),
        atime: stat.atime,
        mtime: stat.mtime,
        ctime: stat.ctime,
        crtime: stat.crtime,
        kind: file_type(stat.kind),
        perm: stat.perm,
        nlink: stat.nlink,
        uid: stat.uid,
        gid: stat.gid,
        rdev: 0,
        blksize: STATFS_BLOCK_SIZE,
        flags: 0,
    }
}

impl Filesystem for OdfsFs {
    fn init(&mut self, _req: &Request<'_>, config: &mut KernelConfig) -> Result<(), c_int> {
        info!("FUSE filesystem initialized");
        config.add_capabilities(fuser::consts::FUSE_ASYNC_READ).ok();

        // Listing the containers early surfaces credential problems in the
        // log; a failure here is retried on first access.
        if let Err(e) = self.ops.namespace().ensure_containers() {
            warn!(error = %e, "Could not list containers at startup");
        }
        Ok(())
    }

    fn destroy(&mut self) {
        info!("FUSE filesystem destroyed");
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(name) = name.to_str() else {
            reply.error(libc::EINVAL);
            return;
        };
        trace!(parent = parent, name = name, "lookup");

        match self.lookup_child(parent, name) {
            Ok(attr) => reply.entry(&self.config.attr_ttl, &attr, 0),
            Err(e) => reply.error(e),
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        trace!(inode = ino, "getattr");
        match self.attr(ino) {
            Ok(attr) => reply.attr(&self.config.attr_ttl, &attr),
            Err(e) => reply.error(e),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags = flags, "open");
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.ops.open(&path, flags) {
            // Content is immutable while mounted
            Ok(fh) => reply.opened(fh, fuser::consts::FOPEN_KEEP_CACHE),
            Err(e) => reply.error(errno("open", &path, &e)),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh = fh, offset = offset, size = size, "read");
        let Ok(offset) = u64::try_from(offset) else {
            reply.error(libc::EINVAL);
            return;
        };
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.ops.read(&path, u64::from(size), offset, fh) {
            Ok(data) => reply.data(&data),
            Err(e) => reply.error(errno("read", &path, &e)),
        }
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(inode = ino, fh = fh, "release");
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        match self.ops.release(&path, fh) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno("release", &path, &e)),
        }
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");
        match self.attr(ino) {
            Ok(attr) if attr.kind == FileType::Directory => reply.opened(0, 0),
            Ok(_) => reply.error(libc::ENOTDIR),
            Err(e) => reply.error(e),
        }
    }

    /// Offsets handed to the kernel are entry indexes plus one.
    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        trace!(inode = ino, offset = offset, "readdir");
        let entries = match self.dir_entries(ino) {
            Ok(entries) => entries,
            Err(e) => {
                reply.error(e);
                return;
            }
        };

        let skip = usize::try_from(offset).unwrap_or(0);
        for (index, (entry_ino, kind, name)) in entries.into_iter().enumerate().skip(skip) {
            let next = i64::try_from(index + 1).unwrap_or(i64::MAX);
            if reply.add(entry_ino, next, kind, &name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn access(&mut self, _req: &Request<'_>, ino: u64, mask: i32, reply: ReplyEmpty) {
        trace!(inode = ino, mask = mask, "access");
        let path = match self.path_of(ino) {
            Ok(path) => path,
            Err(e) => {
                reply.error(e);
                return;
            }
        };
        match self.ops.access(&path, mask) {
            Ok(()) => reply.ok(),
            Err(e) => reply.error(errno("access", &path, &e)),
        }
    }

    fn statfs(&mut self, _req: &Request<'_>, ino: u64, reply: ReplyStatfs) {
        let path = self.inodes.path(ino).unwrap_or_else(|| "/".to_string());
        let stats = self.ops.statfs(&path);
        reply.statfs(
            stats.blocks,
            stats.blocks_free,
            stats.blocks_available,
            stats.files,
            stats.files_free,
            stats.block_size,
            stats.name_max,
            stats.block_size,
        );
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, _nlookup: u64) {
        // Inodes live until unmount
        if ino != ROOT_INODE {
            trace!(inode = ino, "forget");
        }
    }
}
